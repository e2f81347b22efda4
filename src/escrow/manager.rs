//! Escrow lifecycle orchestration.
//!
//! The manager owns the plan keys for every escrow movement, derived
//! from the escrow id (`escrow:{id}:hold`, `escrow:{id}:release`, ...),
//! so each lifecycle step is a fixed idempotency lineage and a repeated
//! call replays the stored entries instead of moving funds twice.
//! State transitions and their payout plans commit atomically through
//! [`EscrowStore::settle_escrow`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core_types::{DisputeId, EscrowId, OrderRef, OwnerId, WalletId};
use crate::escrow::models::{
    Dispute, DisputeOutcome, DisputeResolution, DisputeStatus, DisputeType, Escrow,
};
use crate::escrow::state::EscrowState;
use crate::fee::{self, FeeBreakdown, DEFAULT_ESCROW_COMMISSION_PPM};
use crate::ledger::models::{Applied, EntryType, LedgerEntry, Movement, TransferPlan};
use crate::ledger::{EscrowStore, LedgerError, LedgerStore};
use crate::money::Currency;
use crate::transfer::{EventSink, RetryPolicy};

/// Default auto-release delay in days
pub const DEFAULT_AUTO_RELEASE_DAYS: i64 = 3;

/// Plan actions whose entries make up a RELEASED escrow's history
const RELEASED_ACTIONS: &[&str] = &[
    "release",
    "release:fee",
    "resolve:release",
    "resolve:release:fee",
    "resolve:partial:release",
    "resolve:partial:fee",
    "resolve:partial:refund",
];

/// Plan actions whose entries make up a REFUNDED escrow's history
const REFUNDED_ACTIONS: &[&str] = &["refund", "resolve:refund", "resolve:partial:refund"];

fn plan_key(escrow_id: EscrowId, action: &str) -> String {
    format!("escrow:{}:{}", escrow_id, action)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowPolicy {
    /// Commission rate in 10^6 precision, charged at release
    pub commission_ppm: u64,
    /// Days a PENDING escrow waits before the sweeper releases it
    pub auto_release_days: i64,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            commission_ppm: DEFAULT_ESCROW_COMMISSION_PPM,
            auto_release_days: DEFAULT_AUTO_RELEASE_DAYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiateEscrowRequest {
    pub order_id: OrderRef,
    pub payer_wallet_id: WalletId,
    pub receiver_wallet_id: WalletId,
    /// Minor units of `currency`, held in full until settlement
    pub amount: u64,
    pub currency: Currency,
    /// Overrides the policy commission rate when set
    pub commission_ppm: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OpenDisputeRequest {
    pub escrow_id: EscrowId,
    pub raised_by: OwnerId,
    pub dispute_type: DisputeType,
    pub description: String,
    /// For partial resolutions: how much should return to the payer
    pub requested_amount: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolveDisputeRequest {
    pub dispute_id: DisputeId,
    pub outcome: DisputeOutcome,
    pub resolver: String,
}

/// Result of an escrow lifecycle step
#[derive(Debug, Clone)]
pub struct EscrowOutcome {
    pub escrow: Escrow,
    pub entries: Vec<LedgerEntry>,
    /// True when this call replayed an earlier settlement
    pub replayed: bool,
}

/// Orchestrates the escrow lifecycle over the ledger and escrow stores.
pub struct EscrowManager {
    ledger: Arc<dyn LedgerStore>,
    escrows: Arc<dyn EscrowStore>,
    policy: EscrowPolicy,
    events: Arc<EventSink>,
    retry: RetryPolicy,
}

impl EscrowManager {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        escrows: Arc<dyn EscrowStore>,
        policy: EscrowPolicy,
        events: Arc<EventSink>,
    ) -> Self {
        Self {
            ledger,
            escrows,
            policy,
            events,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &EscrowPolicy {
        &self.policy
    }

    /// Open an escrow: hold the full amount in the payer wallet and
    /// record a PENDING escrow in one transaction. Idempotent by order
    /// reference; the same order with a different payload is a
    /// conflict.
    pub async fn initiate(&self, req: InitiateEscrowRequest) -> Result<EscrowOutcome, LedgerError> {
        if req.amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "escrow amount must be positive".to_string(),
            ));
        }
        if req.payer_wallet_id == req.receiver_wallet_id {
            return Err(LedgerError::InvalidAmount(
                "escrow between the same wallet".to_string(),
            ));
        }
        let commission_ppm = req.commission_ppm.unwrap_or(self.policy.commission_ppm);
        // validates the rate and that the commission fits the amount
        fee::commission_split(req.amount, commission_ppm)?;

        if let Some(existing) = self.escrows.find_escrow_by_order(req.order_id).await? {
            return self.replay_initiate(existing, &req).await;
        }

        let payer = self.ledger.get_wallet(req.payer_wallet_id).await?;
        if payer.currency != req.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: payer.currency.to_string(),
                actual: req.currency.to_string(),
            });
        }
        let receiver = self.ledger.get_wallet(req.receiver_wallet_id).await?;
        if receiver.currency != req.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: receiver.currency.to_string(),
                actual: req.currency.to_string(),
            });
        }

        let deadline = chrono::Utc::now() + chrono::Duration::days(self.policy.auto_release_days);
        let escrow = Escrow::new(
            req.order_id,
            req.payer_wallet_id,
            req.receiver_wallet_id,
            req.amount,
            req.currency,
            commission_ppm,
            deadline,
        );
        let plan = TransferPlan::single(Movement::new(
            plan_key(escrow.id, "hold"),
            EntryType::EscrowHold,
            Some(req.payer_wallet_id),
            Some(req.payer_wallet_id),
            req.amount,
            req.currency,
        ));

        let mut attempt = 1u32;
        let applied = loop {
            match self.escrows.create_escrow(&escrow, plan.clone()).await {
                Ok(applied) => break applied,
                Err(LedgerError::AlreadyExists) => {
                    // lost the insert race; the winner's record decides
                    // whether this call is a replay
                    return match self.escrows.find_escrow_by_order(req.order_id).await? {
                        Some(existing) => self.replay_initiate(existing, &req).await,
                        None => Err(LedgerError::ConcurrentModification),
                    };
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    self.backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        self.events.publish(&applied);
        info!(
            escrow_id = %escrow.id,
            order_id = %escrow.order_id,
            amount = escrow.amount,
            currency = %escrow.currency,
            deadline = %escrow.auto_release_deadline,
            "escrow opened"
        );
        Ok(EscrowOutcome {
            escrow,
            entries: applied.entries,
            replayed: false,
        })
    }

    /// Pay the held amount out to the receiver, carving the commission
    /// out at the stored rate. Idempotent by escrow id: releasing a
    /// RELEASED escrow returns the stored entries without moving funds.
    pub async fn release(&self, escrow_id: EscrowId) -> Result<EscrowOutcome, LedgerError> {
        let escrow = self.escrows.get_escrow(escrow_id).await?;
        match escrow.state {
            EscrowState::Pending => {}
            EscrowState::Released => {
                let entries = self.gather(escrow_id, RELEASED_ACTIONS).await?;
                debug!(escrow_id = %escrow_id, "replaying escrow release");
                return Ok(EscrowOutcome {
                    escrow,
                    entries,
                    replayed: true,
                });
            }
            state => {
                return Err(LedgerError::InvalidStateTransition(format!(
                    "escrow {} is {}, cannot release",
                    escrow_id, state
                )));
            }
        }

        let movements = self
            .release_movements(&escrow, escrow.amount, "release", "release:fee")
            .await?;
        let applied = self
            .settle_with_retry(
                escrow_id,
                EscrowState::Pending,
                EscrowState::Released,
                TransferPlan::new(movements),
                None,
            )
            .await?;
        self.finish(escrow_id, applied).await
    }

    /// Return the held amount to the payer. PENDING escrows refund
    /// directly; DISPUTED escrows refund only through `admin`, which
    /// resolves the open dispute with a REFUND outcome in the same
    /// transaction.
    pub async fn refund(
        &self,
        escrow_id: EscrowId,
        admin: Option<&str>,
    ) -> Result<EscrowOutcome, LedgerError> {
        let escrow = self.escrows.get_escrow(escrow_id).await?;
        let (expected, resolution) = match escrow.state {
            EscrowState::Pending => (EscrowState::Pending, None),
            EscrowState::Refunded => {
                let entries = self.gather(escrow_id, REFUNDED_ACTIONS).await?;
                debug!(escrow_id = %escrow_id, "replaying escrow refund");
                return Ok(EscrowOutcome {
                    escrow,
                    entries,
                    replayed: true,
                });
            }
            EscrowState::Disputed => {
                let Some(resolver) = admin else {
                    return Err(LedgerError::InvalidStateTransition(format!(
                        "escrow {} is disputed, refund requires an administrative resolution",
                        escrow_id
                    )));
                };
                let dispute = self.escrows.find_open_dispute(escrow_id).await?.ok_or_else(|| {
                    LedgerError::DisputeNotFound(format!("no open dispute for escrow {}", escrow_id))
                })?;
                let resolution = DisputeResolution {
                    dispute_id: dispute.id,
                    outcome: DisputeOutcome::Refund,
                    resolver: resolver.to_string(),
                };
                (EscrowState::Disputed, Some(resolution))
            }
            EscrowState::Released => {
                return Err(LedgerError::InvalidStateTransition(format!(
                    "escrow {} is released, cannot refund",
                    escrow_id
                )));
            }
        };

        let plan = TransferPlan::single(refund_movement(&escrow, escrow.amount, "refund"));
        let applied = self
            .settle_with_retry(escrow_id, expected, EscrowState::Refunded, plan, resolution)
            .await?;
        self.finish(escrow_id, applied).await
    }

    /// Open a dispute on a PENDING escrow, which freezes it out of the
    /// auto-release sweep. No funds move until resolution.
    pub async fn open_dispute(&self, req: OpenDisputeRequest) -> Result<Dispute, LedgerError> {
        let escrow = self.escrows.get_escrow(req.escrow_id).await?;
        if let Some(requested) = req.requested_amount {
            if requested == 0 {
                return Err(LedgerError::InvalidAmount(
                    "requested amount must be positive".to_string(),
                ));
            }
            if requested > escrow.amount {
                return Err(LedgerError::InvalidAmount(format!(
                    "requested amount {} exceeds escrowed {}",
                    requested, escrow.amount
                )));
            }
        }
        let dispute = Dispute::new(
            req.escrow_id,
            req.raised_by,
            req.dispute_type,
            req.description,
            req.requested_amount,
        );
        self.escrows.open_dispute(&dispute).await?;
        info!(
            dispute_id = %dispute.id,
            escrow_id = %req.escrow_id,
            dispute_type = %dispute.dispute_type,
            "dispute opened"
        );
        Ok(dispute)
    }

    /// Settle a disputed escrow per an administrative decision. RELEASE
    /// and REFUND settle the full amount; PARTIAL returns the dispute's
    /// requested amount to the payer and releases the remainder, with
    /// commission charged on the released share only. Resolving an
    /// already-resolved dispute with the same outcome is a replay.
    pub async fn resolve_dispute(
        &self,
        req: ResolveDisputeRequest,
    ) -> Result<EscrowOutcome, LedgerError> {
        let dispute = self.escrows.get_dispute(req.dispute_id).await?;
        let escrow = self.escrows.get_escrow(dispute.escrow_id).await?;

        if dispute.status == DisputeStatus::Resolved {
            if dispute.outcome != Some(req.outcome) {
                return Err(LedgerError::InvalidStateTransition(format!(
                    "dispute {} already resolved as {}",
                    req.dispute_id,
                    dispute.outcome.map(|o| o.as_str()).unwrap_or("unknown")
                )));
            }
            let actions: &[&str] = match req.outcome {
                DisputeOutcome::Release => &["resolve:release", "resolve:release:fee"],
                DisputeOutcome::Refund => &["resolve:refund"],
                DisputeOutcome::Partial => &[
                    "resolve:partial:release",
                    "resolve:partial:fee",
                    "resolve:partial:refund",
                ],
            };
            let entries = self.gather(escrow.id, actions).await?;
            debug!(dispute_id = %req.dispute_id, "replaying dispute resolution");
            return Ok(EscrowOutcome {
                escrow,
                entries,
                replayed: true,
            });
        }
        if escrow.state != EscrowState::Disputed {
            return Err(LedgerError::InvalidStateTransition(format!(
                "escrow {} is {}, dispute resolution requires a disputed escrow",
                escrow.id, escrow.state
            )));
        }

        let (new_state, movements) = match req.outcome {
            DisputeOutcome::Release => (
                EscrowState::Released,
                self.release_movements(&escrow, escrow.amount, "resolve:release", "resolve:release:fee")
                    .await?,
            ),
            DisputeOutcome::Refund => (
                EscrowState::Refunded,
                vec![refund_movement(&escrow, escrow.amount, "resolve:refund")],
            ),
            DisputeOutcome::Partial => {
                let Some(requested) = dispute.requested_amount else {
                    return Err(LedgerError::InvalidStateTransition(format!(
                        "dispute {} has no requested amount, cannot split",
                        dispute.id
                    )));
                };
                let refund_share = requested.min(escrow.amount);
                let release_share = escrow.amount - refund_share;
                let mut movements = if release_share > 0 {
                    self.release_movements(
                        &escrow,
                        release_share,
                        "resolve:partial:release",
                        "resolve:partial:fee",
                    )
                    .await?
                } else {
                    Vec::new()
                };
                movements.push(refund_movement(&escrow, refund_share, "resolve:partial:refund"));
                let new_state = if release_share > 0 {
                    EscrowState::Released
                } else {
                    EscrowState::Refunded
                };
                (new_state, movements)
            }
        };

        let resolution = DisputeResolution {
            dispute_id: dispute.id,
            outcome: req.outcome,
            resolver: req.resolver.clone(),
        };
        let applied = self
            .settle_with_retry(
                escrow.id,
                EscrowState::Disputed,
                new_state,
                TransferPlan::new(movements),
                Some(resolution),
            )
            .await?;
        info!(
            dispute_id = %req.dispute_id,
            escrow_id = %escrow.id,
            outcome = %req.outcome,
            resolver = %req.resolver,
            "dispute resolved"
        );
        self.finish(escrow.id, applied).await
    }

    pub async fn get_escrow(&self, escrow_id: EscrowId) -> Result<Escrow, LedgerError> {
        self.escrows.get_escrow(escrow_id).await
    }

    pub async fn get_dispute(&self, dispute_id: DisputeId) -> Result<Dispute, LedgerError> {
        self.escrows.get_dispute(dispute_id).await
    }

    /// PENDING escrows past their auto-release deadline, oldest first.
    pub async fn due_escrows(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Vec<Escrow>, LedgerError> {
        self.escrows.find_due_escrows(now, limit).await
    }

    /// Release legs for `share` of the escrow: the payout movement
    /// spends the held share and credits the net to the receiver, and
    /// the commission (when non-zero) lands on the platform wallet as
    /// its own leg.
    async fn release_movements(
        &self,
        escrow: &Escrow,
        share: u64,
        action: &str,
        fee_action: &str,
    ) -> Result<Vec<Movement>, LedgerError> {
        let (net, commission) = fee::commission_split(share, escrow.commission_ppm)?;
        let mut movements = vec![Movement::new(
            plan_key(escrow.id, action),
            EntryType::EscrowRelease,
            Some(escrow.payer_wallet_id),
            Some(escrow.receiver_wallet_id),
            share,
            escrow.currency,
        )
        .with_fee(FeeBreakdown {
            percentage_fee: commission,
            fixed_fee: 0,
            total_fee: commission,
            net_amount: net,
        })];
        if commission > 0 {
            let platform = self.ledger.platform_wallet(escrow.currency).await?;
            movements.push(Movement::new(
                plan_key(escrow.id, fee_action),
                EntryType::Commission,
                Some(escrow.payer_wallet_id),
                Some(platform.id),
                commission,
                escrow.currency,
            ));
        }
        Ok(movements)
    }

    /// Replay of `initiate` for an order that already has an escrow.
    async fn replay_initiate(
        &self,
        existing: Escrow,
        req: &InitiateEscrowRequest,
    ) -> Result<EscrowOutcome, LedgerError> {
        let same = existing.payer_wallet_id == req.payer_wallet_id
            && existing.receiver_wallet_id == req.receiver_wallet_id
            && existing.amount == req.amount
            && existing.currency == req.currency;
        if !same {
            return Err(LedgerError::IdempotencyConflict);
        }
        debug!(escrow_id = %existing.id, order_id = %existing.order_id, "replaying escrow initiation");
        let entries = self.gather(existing.id, &["hold"]).await?;
        Ok(EscrowOutcome {
            escrow: existing,
            entries,
            replayed: true,
        })
    }

    async fn settle_with_retry(
        &self,
        escrow_id: EscrowId,
        expected: EscrowState,
        new: EscrowState,
        plan: TransferPlan,
        resolution: Option<DisputeResolution>,
    ) -> Result<Applied, LedgerError> {
        let mut attempt = 1u32;
        loop {
            match self
                .escrows
                .settle_escrow(escrow_id, expected, new, plan.clone(), resolution.clone())
                .await
            {
                Ok(applied) => return Ok(applied),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    self.backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let backoff = self
            .retry
            .backoff_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = rand::thread_rng().gen_range(0..=self.retry.backoff_ms.max(1) / 2);
        debug!(attempt, backoff_ms = backoff + jitter, "retrying contended settlement");
        tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
    }

    /// Publish the settlement and return the escrow in its post-commit
    /// state.
    async fn finish(
        &self,
        escrow_id: EscrowId,
        applied: Applied,
    ) -> Result<EscrowOutcome, LedgerError> {
        self.events.publish(&applied);
        let escrow = self.escrows.get_escrow(escrow_id).await?;
        if !applied.replayed {
            info!(escrow_id = %escrow_id, state = %escrow.state, "escrow settled");
        }
        Ok(EscrowOutcome {
            escrow,
            entries: applied.entries,
            replayed: applied.replayed,
        })
    }

    /// Stored entries for the given plan actions, skipping the ones
    /// that never ran.
    async fn gather(
        &self,
        escrow_id: EscrowId,
        actions: &[&str],
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = Vec::with_capacity(actions.len());
        for action in actions {
            if let Some(entry) = self
                .ledger
                .get_entry_by_key(&plan_key(escrow_id, action))
                .await?
            {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn refund_movement(escrow: &Escrow, share: u64, action: &str) -> Movement {
    Movement::new(
        plan_key(escrow.id, action),
        EntryType::EscrowRefund,
        Some(escrow.payer_wallet_id),
        Some(escrow.payer_wallet_id),
        share,
        escrow.currency,
    )
}
