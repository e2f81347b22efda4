//! Transfer orchestration
//!
//! One pipeline for every direct movement: structural validation,
//! replay lookup, limits, fraud screen, fee computation, then the
//! atomic ledger commit. The store owns atomicity; this layer owns
//! ordering. A blocked or rejected request reaches the store for reads
//! only, so it can never leave an entry behind.
//!
//! `ConcurrentModification` is the one error retried here, a bounded
//! number of times with exponential backoff and jitter. Everything
//! else surfaces to the caller unchanged.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::core_types::WalletId;
use crate::fee::{self, FeeTable, Role};
use crate::fraud::{FraudScreen, Verdict};
use crate::ledger::error::LedgerError;
use crate::ledger::models::{
    Applied, EntryType, LedgerEntry, Movement, TransferPlan, WalletSnapshot,
};
use crate::ledger::store::LedgerStore;
use crate::money::Currency;
use crate::rates::RateTable;
use crate::transfer::events::EventSink;
use crate::transfer::limits::LimitsConfig;

/// Bounded local retry for `ConcurrentModification` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub idempotency_key: String,
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    /// Minor units of `currency`, the sender wallet's currency
    pub amount: u64,
    pub currency: Currency,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub idempotency_key: String,
    pub wallet_id: WalletId,
    pub amount: u64,
    pub currency: Currency,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub idempotency_key: String,
    pub wallet_id: WalletId,
    pub amount: u64,
    pub currency: Currency,
    pub role: Role,
}

/// What the caller gets back from any pipeline operation.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Primary entry first, then fee and conversion legs
    pub entries: Vec<LedgerEntry>,
    pub verdict: Verdict,
    pub replayed: bool,
    pub wallets: Vec<WalletSnapshot>,
}

impl TransferOutcome {
    pub fn primary(&self) -> &LedgerEntry {
        // Constructors reject empty entry lists
        &self.entries[0]
    }
}

pub struct TransferService {
    store: Arc<dyn LedgerStore>,
    fees: FeeTable,
    rates: Arc<RateTable>,
    screen: FraudScreen,
    limits: LimitsConfig,
    events: Arc<EventSink>,
    retry: RetryPolicy,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        fees: FeeTable,
        rates: Arc<RateTable>,
        screen: FraudScreen,
        limits: LimitsConfig,
        events: Arc<EventSink>,
    ) -> Self {
        Self {
            store,
            fees,
            rates,
            screen,
            limits,
            events,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn events(&self) -> &Arc<EventSink> {
        &self.events
    }

    /// Wallet-to-wallet transfer. Cross-currency when the receiver
    /// wallet settles in a different currency: the gross amount lands
    /// on the platform wallet in the source currency and the converted
    /// net leaves the platform wallet in the target currency, so each
    /// currency conserves independently.
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferOutcome, LedgerError> {
        if req.from_wallet_id == req.to_wallet_id {
            return Err(LedgerError::InvalidAmount(
                "transfer to the same wallet".to_string(),
            ));
        }
        if req.amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be positive".to_string()));
        }

        let probe = Movement::new(
            req.idempotency_key.clone(),
            EntryType::Transfer,
            Some(req.from_wallet_id),
            Some(req.to_wallet_id),
            req.amount,
            req.currency,
        );
        if let Some(outcome) = self.check_replay(&probe).await? {
            return Ok(outcome);
        }

        let from = self.store.get_wallet(req.from_wallet_id).await?;
        let to = self.store.get_wallet(req.to_wallet_id).await?;
        if from.currency != req.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: from.currency.to_string(),
                actual: req.currency.to_string(),
            });
        }

        self.limits
            .check(self.store.as_ref(), from.id, req.role, req.amount)
            .await?;

        let verdict = self
            .screen
            .screen(self.store.as_ref(), from.id, req.role, req.amount)
            .await?;
        if verdict.is_blocked() {
            warn!(
                wallet_id = %from.id,
                amount = req.amount,
                "transfer blocked: {}",
                verdict.reason()
            );
            return Err(LedgerError::FraudBlocked(verdict.reason()));
        }

        let fee = fee::compute(req.amount, req.currency, req.role, &self.fees, &self.rates)?;

        let mut movements = Vec::with_capacity(3);
        if to.currency == req.currency {
            movements.push(
                Movement::new(
                    req.idempotency_key.clone(),
                    EntryType::Transfer,
                    Some(from.id),
                    Some(to.id),
                    req.amount,
                    req.currency,
                )
                .with_fee(fee),
            );
        } else {
            // The cross-currency replay probe above only matches the
            // primary leg; the fx leg rides on a derived key.
            let (converted, rate) = self.rates.convert(fee.net_amount, req.currency, to.currency)?;
            let platform_dst = self.store.platform_wallet(to.currency).await?;
            let platform_src = self.store.platform_wallet(req.currency).await?;
            movements.push(
                Movement::new(
                    req.idempotency_key.clone(),
                    EntryType::Transfer,
                    Some(from.id),
                    Some(platform_src.id),
                    req.amount,
                    req.currency,
                )
                .with_fee(fee)
                .with_conversion(converted, rate),
            );
            movements.push(
                Movement::new(
                    format!("{}:fx", req.idempotency_key),
                    EntryType::Transfer,
                    Some(platform_dst.id),
                    Some(to.id),
                    converted,
                    to.currency,
                )
                .with_conversion(converted, rate),
            );
        }
        if fee.total_fee > 0 {
            let platform = self.store.platform_wallet(req.currency).await?;
            movements.push(Movement::new(
                format!("{}:fee", req.idempotency_key),
                EntryType::Fee,
                Some(from.id),
                Some(platform.id),
                fee.total_fee,
                req.currency,
            ));
        }

        let applied = self.apply_with_retry(TransferPlan::new(movements)).await?;
        self.events.publish(&applied);
        info!(
            key = %req.idempotency_key,
            from = %from.id,
            to = %to.id,
            amount = req.amount,
            fee = fee.total_fee,
            "transfer committed"
        );
        Self::outcome(applied, verdict)
    }

    /// Credit external funds into a wallet. Inbound, so neither limits
    /// nor the fraud screen apply.
    pub async fn deposit(&self, req: DepositRequest) -> Result<TransferOutcome, LedgerError> {
        let probe = Movement::new(
            req.idempotency_key.clone(),
            EntryType::Deposit,
            None,
            Some(req.wallet_id),
            req.amount,
            req.currency,
        );
        if let Some(outcome) = self.check_replay(&probe).await? {
            return Ok(outcome);
        }

        let wallet = self.store.get_wallet(req.wallet_id).await?;
        if wallet.currency != req.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: wallet.currency.to_string(),
                actual: req.currency.to_string(),
            });
        }

        let applied = self.apply_with_retry(TransferPlan::single(probe)).await?;
        self.events.publish(&applied);
        info!(
            key = %req.idempotency_key,
            wallet_id = %wallet.id,
            amount = req.amount,
            "deposit committed"
        );
        Self::outcome(applied, Verdict::allow())
    }

    /// Debit a wallet for an external payout. The full amount leaves
    /// the wallet; the fee leg keeps the platform's cut, and the entry's
    /// net amount is what gets paid out.
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<TransferOutcome, LedgerError> {
        if req.amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be positive".to_string()));
        }
        let probe = Movement::new(
            req.idempotency_key.clone(),
            EntryType::Withdrawal,
            Some(req.wallet_id),
            None,
            req.amount,
            req.currency,
        );
        if let Some(outcome) = self.check_replay(&probe).await? {
            return Ok(outcome);
        }

        let wallet = self.store.get_wallet(req.wallet_id).await?;
        if wallet.currency != req.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: wallet.currency.to_string(),
                actual: req.currency.to_string(),
            });
        }

        self.limits
            .check(self.store.as_ref(), wallet.id, req.role, req.amount)
            .await?;
        let verdict = self
            .screen
            .screen(self.store.as_ref(), wallet.id, req.role, req.amount)
            .await?;
        if verdict.is_blocked() {
            warn!(
                wallet_id = %wallet.id,
                amount = req.amount,
                "withdrawal blocked: {}",
                verdict.reason()
            );
            return Err(LedgerError::FraudBlocked(verdict.reason()));
        }

        let fee = fee::compute(req.amount, req.currency, req.role, &self.fees, &self.rates)?;
        let mut movements = vec![probe.with_fee(fee)];
        if fee.total_fee > 0 {
            let platform = self.store.platform_wallet(req.currency).await?;
            movements.push(Movement::new(
                format!("{}:fee", req.idempotency_key),
                EntryType::Fee,
                Some(wallet.id),
                Some(platform.id),
                fee.total_fee,
                req.currency,
            ));
        }

        let applied = self.apply_with_retry(TransferPlan::new(movements)).await?;
        self.events.publish(&applied);
        info!(
            key = %req.idempotency_key,
            wallet_id = %wallet.id,
            amount = req.amount,
            fee = fee.total_fee,
            "withdrawal committed"
        );
        Self::outcome(applied, verdict)
    }

    /// Apply a plan, retrying only `ConcurrentModification` and only up
    /// to the policy's attempt budget.
    pub async fn apply_with_retry(&self, plan: TransferPlan) -> Result<Applied, LedgerError> {
        let mut attempt = 1u32;
        loop {
            match self.store.apply(plan.clone()).await {
                Ok(applied) => return Ok(applied),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let backoff = self
                        .retry
                        .backoff_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    let jitter = rand::thread_rng().gen_range(0..=self.retry.backoff_ms.max(1) / 2);
                    debug!(attempt, backoff_ms = backoff + jitter, "retrying contended plan");
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replay lookup against the primary key. Same payload returns the
    /// stored outcome; a different payload under the same key is a
    /// conflict. Runs before screening so a client retry can never be
    /// re-blocked or double-audited.
    async fn check_replay(
        &self,
        probe: &Movement,
    ) -> Result<Option<TransferOutcome>, LedgerError> {
        let Some(stored) = self.store.get_entry_by_key(&probe.key).await? else {
            return Ok(None);
        };
        if !probe.payload_matches(&stored) {
            return Err(LedgerError::IdempotencyConflict);
        }
        debug!(key = %probe.key, "replaying stored entry");
        let mut entries = vec![stored];
        for suffix in ["fx", "fee"] {
            let key = format!("{}:{}", probe.key, suffix);
            if let Some(entry) = self.store.get_entry_by_key(&key).await? {
                entries.push(entry);
            }
        }
        Ok(Some(TransferOutcome {
            entries,
            verdict: Verdict::allow(),
            replayed: true,
            wallets: Vec::new(),
        }))
    }

    fn outcome(applied: Applied, verdict: Verdict) -> Result<TransferOutcome, LedgerError> {
        if applied.entries.is_empty() {
            return Err(LedgerError::Internal(
                "committed plan returned no entries".to_string(),
            ));
        }
        Ok(TransferOutcome {
            entries: applied.entries,
            verdict,
            replayed: applied.replayed,
            wallets: applied.wallets,
        })
    }
}
