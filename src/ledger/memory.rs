//! In-memory store
//!
//! Implements both storage traits behind a single async mutex. One lock
//! makes every operation trivially atomic, which is exactly what the
//! trait contracts demand; throughput is irrelevant at test scale. The
//! PostgreSQL store is the production twin.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use crate::core_types::{DisputeId, EntryId, EscrowId, OrderRef, OwnerId, PLATFORM_OWNER_ID, WalletId};
use crate::escrow::models::{Dispute, DisputeResolution, DisputeStatus, Escrow};
use crate::escrow::state::EscrowState;
use crate::fraud::FraudAudit;
use crate::ledger::error::LedgerError;
use crate::ledger::models::{
    Applied, EntryStatus, LedgerEntry, TransferPlan, Wallet, WalletSnapshot, WalletStatus,
    WindowStats,
};
use crate::ledger::store::{EscrowStore, LedgerStore};
use crate::money::Currency;

/// Outflow history kept per wallet; anything older than the widest
/// supported screening window is pruned on insert.
const OUTFLOW_RETENTION_DAYS: i64 = 31;

#[derive(Default)]
struct Inner {
    wallets: FxHashMap<WalletId, Wallet>,
    owner_index: FxHashMap<(OwnerId, Currency), WalletId>,
    entries: FxHashMap<EntryId, LedgerEntry>,
    entries_by_key: FxHashMap<String, EntryId>,
    outflows: FxHashMap<WalletId, VecDeque<(DateTime<Utc>, u64)>>,
    audits: Vec<FraudAudit>,
    escrows: FxHashMap<EscrowId, Escrow>,
    escrows_by_order: FxHashMap<OrderRef, EscrowId>,
    disputes: FxHashMap<DisputeId, Dispute>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Core of `apply`, callable while the lock is already held so
    /// escrow operations can run a plan and a state change atomically.
    fn apply_locked(inner: &mut Inner, plan: &TransferPlan) -> Result<Applied, LedgerError> {
        plan.validate()?;

        // Idempotency lookup comes first: a committed primary key means
        // this plan already ran.
        if let Some(entry_id) = inner.entries_by_key.get(plan.primary_key()) {
            let entry = inner
                .entries
                .get(entry_id)
                .cloned()
                .ok_or_else(|| LedgerError::Internal("entry index out of sync".to_string()))?;
            if !plan.primary().payload_matches(&entry) {
                return Err(LedgerError::IdempotencyConflict);
            }
            let mut entries = vec![entry];
            for movement in &plan.movements[1..] {
                if let Some(id) = inner.entries_by_key.get(&movement.key) {
                    if let Some(e) = inner.entries.get(id) {
                        entries.push(e.clone());
                    }
                }
            }
            return Ok(Applied {
                entries,
                replayed: true,
                wallets: Vec::new(),
            });
        }
        // A secondary key committed under some other lineage would
        // collide on insert; reject up front.
        for movement in &plan.movements[1..] {
            if inner.entries_by_key.contains_key(&movement.key) {
                return Err(LedgerError::IdempotencyConflict);
            }
        }

        // Stage all balance mutations on wallet copies; nothing in the
        // store changes until every movement has succeeded.
        let mut staged: FxHashMap<WalletId, Wallet> = FxHashMap::default();
        for id in plan.wallet_ids() {
            let wallet = inner
                .wallets
                .get(&id)
                .cloned()
                .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))?;
            staged.insert(id, wallet);
        }
        plan.apply_to(&mut staged)?;

        let now = Utc::now();
        let mut entries = Vec::with_capacity(plan.movements.len());
        for movement in &plan.movements {
            let entry = LedgerEntry {
                id: EntryId::new(),
                idempotency_key: movement.key.clone(),
                entry_type: movement.entry_type,
                from_wallet_id: movement.from,
                to_wallet_id: movement.to,
                amount: movement.amount,
                currency: movement.currency,
                fee: movement.fee,
                status: EntryStatus::Completed,
                converted_amount: movement.converted_amount,
                exchange_rate: movement.exchange_rate,
                reversal_of: None,
                created_at: now,
            };
            inner.entries_by_key.insert(movement.key.clone(), entry.id);
            inner.entries.insert(entry.id, entry.clone());

            if movement.entry_type.counts_as_outflow() {
                if let Some(from) = movement.from {
                    let window = inner.outflows.entry(from).or_default();
                    window.push_back((now, movement.amount));
                    let cutoff = now - Duration::days(OUTFLOW_RETENTION_DAYS);
                    while window.front().is_some_and(|(t, _)| *t < cutoff) {
                        window.pop_front();
                    }
                }
            }
            entries.push(entry);
        }

        let mut snapshots = Vec::with_capacity(staged.len());
        for (id, mut wallet) in staged {
            wallet.updated_at = now;
            snapshots.push(WalletSnapshot::of(&wallet));
            inner.wallets.insert(id, wallet);
        }
        snapshots.sort_by_key(|s| s.wallet_id);

        Ok(Applied {
            entries,
            replayed: false,
            wallets: snapshots,
        })
    }

    /// Stored entries for each plan key, used when a settle replays
    fn entries_for_plan(inner: &Inner, plan: &TransferPlan) -> Vec<LedgerEntry> {
        let mut entries = Vec::new();
        for movement in &plan.movements {
            if let Some(id) = inner.entries_by_key.get(&movement.key) {
                if let Some(e) = inner.entries.get(id) {
                    entries.push(e.clone());
                }
            }
        }
        entries
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_wallet(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Wallet, LedgerError> {
        let mut inner = self.inner.lock().await;
        if inner.owner_index.contains_key(&(owner_id, currency)) {
            return Err(LedgerError::AlreadyExists);
        }
        let wallet = Wallet::new(owner_id, currency);
        inner.owner_index.insert((owner_id, currency), wallet.id);
        inner.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let inner = self.inner.lock().await;
        inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))
    }

    async fn find_wallet(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Option<Wallet>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .owner_index
            .get(&(owner_id, currency))
            .and_then(|id| inner.wallets.get(id))
            .cloned())
    }

    async fn set_wallet_status(
        &self,
        wallet_id: WalletId,
        status: WalletStatus,
    ) -> Result<Wallet, LedgerError> {
        let mut inner = self.inner.lock().await;
        let wallet = inner
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))?;
        wallet.status = status;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn platform_wallet(&self, currency: Currency) -> Result<Wallet, LedgerError> {
        let mut inner = self.inner.lock().await;
        if let Some(wallet) = inner
            .owner_index
            .get(&(PLATFORM_OWNER_ID, currency))
            .and_then(|id| inner.wallets.get(id))
        {
            return Ok(wallet.clone());
        }
        let wallet = Wallet::new(PLATFORM_OWNER_ID, currency);
        inner
            .owner_index
            .insert((PLATFORM_OWNER_ID, currency), wallet.id);
        inner.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn apply(&self, plan: TransferPlan) -> Result<Applied, LedgerError> {
        let mut inner = self.inner.lock().await;
        Self::apply_locked(&mut inner, &plan)
    }

    async fn get_entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries_by_key
            .get(key)
            .and_then(|id| inner.entries.get(id))
            .cloned())
    }

    async fn outflow_stats(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<WindowStats, LedgerError> {
        let inner = self.inner.lock().await;
        let mut stats = WindowStats::default();
        if let Some(window) = inner.outflows.get(&wallet_id) {
            // Entries are pushed in time order; scan only the tail
            for (at, amount) in window.iter().rev() {
                if *at < since {
                    break;
                }
                stats.count += 1;
                stats.total = stats.total.saturating_add(*amount);
            }
        }
        Ok(stats)
    }

    async fn record_fraud_audit(&self, audit: &FraudAudit) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().await;
        inner.audits.push(audit.clone());
        Ok(())
    }

    async fn list_fraud_audits(
        &self,
        wallet_id: WalletId,
        limit: usize,
    ) -> Result<Vec<FraudAudit>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audits
            .iter()
            .rev()
            .filter(|a| a.wallet_id == wallet_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EscrowStore for MemoryStore {
    async fn create_escrow(
        &self,
        escrow: &Escrow,
        plan: TransferPlan,
    ) -> Result<Applied, LedgerError> {
        let mut inner = self.inner.lock().await;
        if inner.escrows_by_order.contains_key(&escrow.order_id) {
            return Err(LedgerError::AlreadyExists);
        }
        let applied = Self::apply_locked(&mut inner, &plan)?;
        if applied.replayed {
            // The hold key was spent on some other order; nothing was
            // held for this one.
            return Err(LedgerError::IdempotencyConflict);
        }
        inner.escrows_by_order.insert(escrow.order_id, escrow.id);
        inner.escrows.insert(escrow.id, escrow.clone());
        Ok(applied)
    }

    async fn get_escrow(&self, escrow_id: EscrowId) -> Result<Escrow, LedgerError> {
        let inner = self.inner.lock().await;
        inner
            .escrows
            .get(&escrow_id)
            .cloned()
            .ok_or_else(|| LedgerError::EscrowNotFound(escrow_id.to_string()))
    }

    async fn find_escrow_by_order(
        &self,
        order_id: OrderRef,
    ) -> Result<Option<Escrow>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .escrows_by_order
            .get(&order_id)
            .and_then(|id| inner.escrows.get(id))
            .cloned())
    }

    async fn find_due_escrows(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Escrow>, LedgerError> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Escrow> = inner
            .escrows
            .values()
            .filter(|e| e.state == EscrowState::Pending && e.auto_release_deadline <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.auto_release_deadline);
        due.truncate(limit);
        Ok(due)
    }

    async fn settle_escrow(
        &self,
        escrow_id: EscrowId,
        expected: EscrowState,
        new: EscrowState,
        plan: TransferPlan,
        resolution: Option<DisputeResolution>,
    ) -> Result<Applied, LedgerError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .escrows
            .get(&escrow_id)
            .ok_or_else(|| LedgerError::EscrowNotFound(escrow_id.to_string()))?
            .state;

        if state == new {
            return Ok(Applied {
                entries: Self::entries_for_plan(&inner, &plan),
                replayed: true,
                wallets: Vec::new(),
            });
        }
        if state != expected {
            return Err(LedgerError::InvalidStateTransition(format!(
                "escrow {} is {}, cannot move to {}",
                escrow_id, state, new
            )));
        }
        // Validate the resolution before committing anything
        if let Some(res) = &resolution {
            let dispute = inner
                .disputes
                .get(&res.dispute_id)
                .ok_or_else(|| LedgerError::DisputeNotFound(res.dispute_id.to_string()))?;
            if dispute.escrow_id != escrow_id {
                return Err(LedgerError::InvalidStateTransition(
                    "dispute belongs to a different escrow".to_string(),
                ));
            }
            if dispute.status != DisputeStatus::Open {
                return Err(LedgerError::InvalidStateTransition(
                    "dispute already resolved".to_string(),
                ));
            }
        }

        let applied = Self::apply_locked(&mut inner, &plan)?;

        let now = Utc::now();
        let escrow = inner
            .escrows
            .get_mut(&escrow_id)
            .ok_or_else(|| LedgerError::Internal("escrow vanished mid-settle".to_string()))?;
        escrow.state = new;
        escrow.updated_at = now;
        if new == EscrowState::Released {
            escrow.released_at = Some(now);
        }
        if let Some(res) = resolution {
            let dispute = inner
                .disputes
                .get_mut(&res.dispute_id)
                .ok_or_else(|| LedgerError::Internal("dispute vanished mid-settle".to_string()))?;
            dispute.status = DisputeStatus::Resolved;
            dispute.outcome = Some(res.outcome);
            dispute.resolver = Some(res.resolver);
            dispute.resolved_at = Some(now);
        }
        Ok(applied)
    }

    async fn open_dispute(&self, dispute: &Dispute) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().await;
        let escrow = inner
            .escrows
            .get_mut(&dispute.escrow_id)
            .ok_or_else(|| LedgerError::EscrowNotFound(dispute.escrow_id.to_string()))?;
        if escrow.state != EscrowState::Pending {
            return Err(LedgerError::InvalidStateTransition(format!(
                "escrow {} is {}, disputes only open from pending",
                escrow.id, escrow.state
            )));
        }
        escrow.state = EscrowState::Disputed;
        escrow.updated_at = Utc::now();
        inner.disputes.insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn get_dispute(&self, dispute_id: DisputeId) -> Result<Dispute, LedgerError> {
        let inner = self.inner.lock().await;
        inner
            .disputes
            .get(&dispute_id)
            .cloned()
            .ok_or_else(|| LedgerError::DisputeNotFound(dispute_id.to_string()))
    }

    async fn find_open_dispute(
        &self,
        escrow_id: EscrowId,
    ) -> Result<Option<Dispute>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .disputes
            .values()
            .find(|d| d.escrow_id == escrow_id && d.status == DisputeStatus::Open)
            .cloned())
    }
}
