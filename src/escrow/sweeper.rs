//! Auto-release sweeper.
//!
//! Scans for PENDING escrows past their auto-release deadline and
//! releases each one through the manager, so funds never sit held
//! forever when neither side acts. Items settle independently; a
//! failing or hanging release is reported and the batch moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core_types::{EscrowId, OrderRef};
use crate::escrow::manager::EscrowManager;
use crate::ledger::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// Seconds between scans
    pub scan_interval_secs: u64,
    /// Due escrows picked up per pass
    pub batch_size: usize,
    /// Per-item settlement deadline before the pass moves on
    pub item_timeout_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            batch_size: 100,
            item_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    /// Held funds paid out in this pass
    Released,
    /// Already settled by a concurrent release
    Replayed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepItem {
    pub escrow_id: EscrowId,
    pub order_id: OrderRef,
    pub status: SweepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<SweepItem>,
}

pub struct Sweeper {
    manager: Arc<EscrowManager>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(manager: Arc<EscrowManager>, config: SweeperConfig) -> Self {
        Self { manager, config }
    }

    /// One pass over due escrows. Every item is attempted even when an
    /// earlier one fails; the report carries the per-item outcomes.
    pub async fn sweep_once(&self) -> Result<SweepReport, LedgerError> {
        let due = self
            .manager
            .due_escrows(Utc::now(), self.config.batch_size)
            .await?;
        let mut report = SweepReport::default();
        let timeout = Duration::from_secs(self.config.item_timeout_secs.max(1));

        for escrow in due {
            report.processed += 1;
            let item = match tokio::time::timeout(timeout, self.manager.release(escrow.id)).await {
                Ok(Ok(outcome)) => {
                    report.succeeded += 1;
                    SweepItem {
                        escrow_id: escrow.id,
                        order_id: escrow.order_id,
                        status: if outcome.replayed {
                            SweepStatus::Replayed
                        } else {
                            SweepStatus::Released
                        },
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(escrow_id = %escrow.id, error = %e, "auto-release failed");
                    SweepItem {
                        escrow_id: escrow.id,
                        order_id: escrow.order_id,
                        status: SweepStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        escrow_id = %escrow.id,
                        timeout_secs = self.config.item_timeout_secs,
                        "auto-release timed out"
                    );
                    SweepItem {
                        escrow_id: escrow.id,
                        order_id: escrow.order_id,
                        status: SweepStatus::Failed,
                        error: Some(format!(
                            "timed out after {}s",
                            self.config.item_timeout_secs
                        )),
                    }
                }
            };
            report.items.push(item);
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "auto-release sweep finished"
            );
        }
        Ok(report)
    }

    /// Periodic sweep loop; runs until the owning task is aborted.
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.scan_interval_secs.max(1));
        info!(
            interval_secs = interval.as_secs(),
            batch_size = self.config.batch_size,
            "auto-release sweeper started"
        );
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = self.sweep_once().await {
                warn!(error = %e, "auto-release sweep errored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::manager::{EscrowPolicy, InitiateEscrowRequest, OpenDisputeRequest};
    use crate::escrow::models::DisputeType;
    use crate::escrow::state::EscrowState;
    use crate::ledger::memory::MemoryStore;
    use crate::ledger::models::{EntryType, Movement, TransferPlan, Wallet};
    use crate::ledger::LedgerStore;
    use crate::money::Currency;
    use crate::transfer::EventSink;

    fn manager(store: &Arc<MemoryStore>, auto_release_days: i64) -> Arc<EscrowManager> {
        Arc::new(EscrowManager::new(
            store.clone(),
            store.clone(),
            EscrowPolicy {
                commission_ppm: 100_000,
                auto_release_days,
            },
            Arc::new(EventSink::new(64)),
        ))
    }

    async fn funded(store: &Arc<MemoryStore>, owner: u64, amount: u64) -> Wallet {
        let wallet = store.create_wallet(owner, Currency::Gnf).await.unwrap();
        let plan = TransferPlan::single(Movement::new(
            format!("seed-{}", wallet.id),
            EntryType::Deposit,
            None,
            Some(wallet.id),
            amount,
            Currency::Gnf,
        ));
        store.apply(plan).await.unwrap();
        wallet
    }

    async fn escrow_via(
        manager: &EscrowManager,
        payer: &Wallet,
        receiver: &Wallet,
        amount: u64,
    ) -> crate::escrow::models::Escrow {
        manager
            .initiate(InitiateEscrowRequest {
                order_id: OrderRef::new_v4(),
                payer_wallet_id: payer.id,
                receiver_wallet_id: receiver.id,
                amount,
                currency: Currency::Gnf,
                commission_ppm: None,
            })
            .await
            .unwrap()
            .escrow
    }

    #[tokio::test]
    async fn test_sweep_releases_matured_pending_only() {
        let store = Arc::new(MemoryStore::new());
        let matured = manager(&store, 0);
        let fresh = manager(&store, 3);
        let payer = funded(&store, 1, 30_000).await;
        let receiver = store.create_wallet(2, Currency::Gnf).await.unwrap();

        // A: pending, deadline in the future
        let a = escrow_via(&fresh, &payer, &receiver, 1_000).await;
        // B: pending, matured
        let b = escrow_via(&matured, &payer, &receiver, 2_000).await;
        // C: matured but disputed
        let c = escrow_via(&matured, &payer, &receiver, 3_000).await;
        matured
            .open_dispute(OpenDisputeRequest {
                escrow_id: c.id,
                raised_by: 1,
                dispute_type: DisputeType::NotReceived,
                description: "hold it".to_string(),
                requested_amount: None,
            })
            .await
            .unwrap();

        let sweeper = Sweeper::new(matured.clone(), SweeperConfig::default());
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.items[0].escrow_id, b.id);
        assert_eq!(report.items[0].status, SweepStatus::Released);

        assert_eq!(
            matured.get_escrow(a.id).await.unwrap().state,
            EscrowState::Pending
        );
        assert_eq!(
            matured.get_escrow(b.id).await.unwrap().state,
            EscrowState::Released
        );
        assert_eq!(
            matured.get_escrow(c.id).await.unwrap().state,
            EscrowState::Disputed
        );
        // B paid out net of the 10% commission
        let w = store.get_wallet(receiver.id).await.unwrap();
        assert_eq!(w.balance.avail(), 1_800);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_due_reports_empty() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, 3);
        let sweeper = Sweeper::new(m, SweeperConfig::default());

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.processed, 0);
        assert!(report.items.is_empty());
    }

    #[tokio::test]
    async fn test_second_sweep_finds_nothing() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, 0);
        let payer = funded(&store, 1, 10_000).await;
        let receiver = store.create_wallet(2, Currency::Gnf).await.unwrap();
        escrow_via(&m, &payer, &receiver, 8_000).await;

        let sweeper = Sweeper::new(m, SweeperConfig::default());
        let first = sweeper.sweep_once().await.unwrap();
        assert_eq!(first.succeeded, 1);

        let second = sweeper.sweep_once().await.unwrap();
        assert_eq!(second.processed, 0);
    }
}
