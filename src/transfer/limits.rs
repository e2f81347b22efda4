//! Per-wallet outflow limits
//!
//! Optional daily and monthly caps on committed outgoing volume,
//! selected by role. Checked before the fraud screen so an over-limit
//! request is rejected without leaving audit rows behind. Windows are
//! rolling (24 hours and 30 days), derived from committed entries the
//! same way the fraud counters are.

use chrono::{Duration, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core_types::WalletId;
use crate::fee::Role;
use crate::ledger::error::LedgerError;
use crate::ledger::store::LedgerStore;

const DAY_SECS: i64 = 86_400;
const MONTH_SECS: i64 = 30 * 86_400;

/// Caps in minor units; `None` means uncapped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransferLimits {
    #[serde(default)]
    pub daily_cap: Option<u64>,
    #[serde(default)]
    pub monthly_cap: Option<u64>,
}

impl TransferLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn is_unlimited(&self) -> bool {
        self.daily_cap.is_none() && self.monthly_cap.is_none()
    }
}

/// Role -> limits mapping with a fallback default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub default: TransferLimits,
    #[serde(default)]
    pub roles: FxHashMap<Role, TransferLimits>,
}

impl LimitsConfig {
    pub fn for_role(&self, role: Role) -> TransferLimits {
        self.roles.get(&role).copied().unwrap_or(self.default)
    }

    /// Reject the candidate outflow if committing it would push the
    /// wallet past a cap. Reads committed volume only; a rejected or
    /// blocked request leaves the windows untouched.
    pub async fn check(
        &self,
        store: &dyn LedgerStore,
        wallet_id: WalletId,
        role: Role,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let limits = self.for_role(role);
        if limits.is_unlimited() {
            return Ok(());
        }
        let now = Utc::now();
        if let Some(cap) = limits.daily_cap {
            let stats = store
                .outflow_stats(wallet_id, now - Duration::seconds(DAY_SECS))
                .await?;
            if stats.total.saturating_add(amount) > cap {
                return Err(LedgerError::LimitExceeded(format!(
                    "daily outflow {} + {} exceeds cap {}",
                    stats.total, amount, cap
                )));
            }
        }
        if let Some(cap) = limits.monthly_cap {
            let stats = store
                .outflow_stats(wallet_id, now - Duration::seconds(MONTH_SECS))
                .await?;
            if stats.total.saturating_add(amount) > cap {
                return Err(LedgerError::LimitExceeded(format!(
                    "monthly outflow {} + {} exceeds cap {}",
                    stats.total, amount, cap
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryStore;
    use crate::ledger::models::{EntryType, Movement, TransferPlan};
    use crate::money::Currency;

    async fn wallet_with_outflow(store: &MemoryStore, funded: u64, spent: u64) -> WalletId {
        let wallet = store.create_wallet(7_001, Currency::Gnf).await.unwrap();
        let sink = store.create_wallet(7_002, Currency::Gnf).await.unwrap();
        store
            .apply(TransferPlan::single(Movement::new(
                format!("lim-seed-{}", wallet.id),
                EntryType::Deposit,
                None,
                Some(wallet.id),
                funded,
                Currency::Gnf,
            )))
            .await
            .unwrap();
        if spent > 0 {
            store
                .apply(TransferPlan::single(Movement::new(
                    format!("lim-spend-{}", wallet.id),
                    EntryType::Transfer,
                    Some(wallet.id),
                    Some(sink.id),
                    spent,
                    Currency::Gnf,
                )))
                .await
                .unwrap();
        }
        wallet.id
    }

    #[tokio::test]
    async fn test_unlimited_never_rejects() {
        let store = MemoryStore::new();
        let wallet = wallet_with_outflow(&store, 1_000_000, 900_000).await;
        let limits = LimitsConfig::default();
        limits
            .check(&store, wallet, Role::Customer, u64::MAX / 2)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_daily_cap_counts_committed_outflow() {
        let store = MemoryStore::new();
        let wallet = wallet_with_outflow(&store, 100_000, 60_000).await;
        let limits = LimitsConfig {
            default: TransferLimits {
                daily_cap: Some(80_000),
                monthly_cap: None,
            },
            roles: FxHashMap::default(),
        };

        // 60_000 already committed: 20_000 more fits exactly
        limits
            .check(&store, wallet, Role::Customer, 20_000)
            .await
            .unwrap();
        let err = limits
            .check(&store, wallet, Role::Customer, 20_001)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_role_override_wins() {
        let store = MemoryStore::new();
        let wallet = wallet_with_outflow(&store, 100_000, 50_000).await;
        let mut roles = FxHashMap::default();
        roles.insert(
            Role::Vendor,
            TransferLimits {
                daily_cap: Some(1_000_000),
                monthly_cap: None,
            },
        );
        let limits = LimitsConfig {
            default: TransferLimits {
                daily_cap: Some(60_000),
                monthly_cap: None,
            },
            roles,
        };

        assert!(limits
            .check(&store, wallet, Role::Customer, 20_000)
            .await
            .is_err());
        limits
            .check(&store, wallet, Role::Vendor, 20_000)
            .await
            .unwrap();
    }
}
