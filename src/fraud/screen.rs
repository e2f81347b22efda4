//! Velocity and amount screening
//!
//! Runs before any balance mutation. Window counters are derived from
//! committed ledger entries, never from provisional state, so a blocked
//! or failed transfer can never poison the counters.
//!
//! Rule set:
//! - single movement above `max_single_amount`: HIGH, flag
//! - daily outflow count above `daily.max_count`: MEDIUM, flag
//! - daily outflow total above `daily.max_total`: CRITICAL, block
//! - burst count above `burst.max_count`: HIGH flag, or CRITICAL block
//!   when the rule is configured blocking
//!
//! The decision is BLOCK exactly when a CRITICAL rule tripped.

use chrono::{Duration, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core_types::WalletId;
use crate::fee::Role;
use crate::fraud::types::{FraudAudit, FraudDecision, FraudRule, RuleHit, Severity, Verdict};
use crate::ledger::error::LedgerError;
use crate::ledger::models::WindowStats;
use crate::ledger::store::LedgerStore;

/// Rolling daily window rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyWindowRule {
    pub window_secs: u64,
    /// Outflow count above this flags MEDIUM
    pub max_count: u64,
    /// Outflow sum above this blocks CRITICAL
    pub max_total: u64,
}

impl Default for DailyWindowRule {
    fn default() -> Self {
        Self {
            window_secs: 86_400,
            max_count: 10,
            max_total: 5_000_000,
        }
    }
}

/// Short-window burst rule guarding rapid-fire repeats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstRule {
    pub enabled: bool,
    pub window_secs: u64,
    pub max_count: u64,
    /// When true a tripped burst is CRITICAL and blocks; otherwise it
    /// flags HIGH
    pub block: bool,
}

impl Default for BurstRule {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 300,
            max_count: 5,
            block: false,
        }
    }
}

/// Optional per-role replacements for the base thresholds. A role
/// absent from the map, or a field left unset, falls back to the
/// top-level rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleThresholds {
    #[serde(default)]
    pub max_single_amount: Option<u64>,
    #[serde(default)]
    pub daily: Option<DailyWindowRule>,
    #[serde(default)]
    pub burst: Option<BurstRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    pub enabled: bool,
    /// Per-movement amount ceiling, in minor units of the movement's
    /// currency
    pub max_single_amount: u64,
    #[serde(default)]
    pub daily: DailyWindowRule,
    #[serde(default)]
    pub burst: BurstRule,
    #[serde(default)]
    pub roles: FxHashMap<Role, RoleThresholds>,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_single_amount: 2_000_000,
            daily: DailyWindowRule::default(),
            burst: BurstRule::default(),
            roles: FxHashMap::default(),
        }
    }
}

impl FraudConfig {
    fn resolved(&self, role: Role) -> (u64, &DailyWindowRule, &BurstRule) {
        match self.roles.get(&role) {
            Some(t) => (
                t.max_single_amount.unwrap_or(self.max_single_amount),
                t.daily.as_ref().unwrap_or(&self.daily),
                t.burst.as_ref().unwrap_or(&self.burst),
            ),
            None => (self.max_single_amount, &self.daily, &self.burst),
        }
    }
}

/// Stateless screen over a rule configuration. All window state lives
/// in the ledger.
#[derive(Debug, Clone, Default)]
pub struct FraudScreen {
    config: FraudConfig,
}

impl FraudScreen {
    pub fn new(config: FraudConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Pure rule evaluation against window stats observed BEFORE the
    /// candidate movement. The candidate is counted prospectively: the
    /// question is whether committing it would break a rule.
    pub fn evaluate(
        &self,
        role: Role,
        amount: u64,
        daily: WindowStats,
        burst: WindowStats,
    ) -> Verdict {
        if !self.config.enabled {
            return Verdict::allow();
        }
        let (max_single, daily_rule, burst_rule) = self.config.resolved(role);
        let mut hits = Vec::new();

        if amount > max_single {
            hits.push(RuleHit {
                rule: FraudRule::SingleAmount,
                severity: Severity::High,
                observed_count: 1,
                observed_total: amount,
                window_secs: 0,
                note: format!("single movement {} above ceiling {}", amount, max_single),
            });
        }

        let daily_count = daily.count.saturating_add(1);
        let daily_total = daily.total.saturating_add(amount);
        if daily_count > daily_rule.max_count {
            hits.push(RuleHit {
                rule: FraudRule::DailyCount,
                severity: Severity::Medium,
                observed_count: daily_count,
                observed_total: daily_total,
                window_secs: daily_rule.window_secs,
                note: format!(
                    "{} outflows in {}s, limit {}",
                    daily_count, daily_rule.window_secs, daily_rule.max_count
                ),
            });
        }
        if daily_total > daily_rule.max_total {
            hits.push(RuleHit {
                rule: FraudRule::DailyTotal,
                severity: Severity::Critical,
                observed_count: daily_count,
                observed_total: daily_total,
                window_secs: daily_rule.window_secs,
                note: format!(
                    "outflow total {} in {}s above ceiling {}",
                    daily_total, daily_rule.window_secs, daily_rule.max_total
                ),
            });
        }

        if burst_rule.enabled {
            let burst_count = burst.count.saturating_add(1);
            if burst_count > burst_rule.max_count {
                let severity = if burst_rule.block {
                    Severity::Critical
                } else {
                    Severity::High
                };
                hits.push(RuleHit {
                    rule: FraudRule::Burst,
                    severity,
                    observed_count: burst_count,
                    observed_total: burst.total.saturating_add(amount),
                    window_secs: burst_rule.window_secs,
                    note: format!(
                        "{} outflows in {}s, limit {}",
                        burst_count, burst_rule.window_secs, burst_rule.max_count
                    ),
                });
            }
        }

        let decision = if hits.iter().any(|h| h.severity == Severity::Critical) {
            FraudDecision::Block
        } else if hits.is_empty() {
            FraudDecision::Allow
        } else {
            FraudDecision::Flag
        };
        Verdict { decision, hits }
    }

    /// Fetch window stats from the ledger, evaluate, and leave an audit
    /// trail for every non-ALLOW verdict. Audit write failures are
    /// logged and swallowed; screening must never take a transfer down
    /// with it.
    pub async fn screen(
        &self,
        store: &dyn LedgerStore,
        wallet_id: WalletId,
        role: Role,
        amount: u64,
    ) -> Result<Verdict, LedgerError> {
        if !self.config.enabled {
            return Ok(Verdict::allow());
        }
        let (_, daily_rule, burst_rule) = self.config.resolved(role);
        let now = Utc::now();
        let daily = store
            .outflow_stats(wallet_id, now - Duration::seconds(daily_rule.window_secs as i64))
            .await?;
        let burst = if burst_rule.enabled {
            store
                .outflow_stats(wallet_id, now - Duration::seconds(burst_rule.window_secs as i64))
                .await?
        } else {
            WindowStats::default()
        };

        let verdict = self.evaluate(role, amount, daily, burst);
        if verdict.decision != FraudDecision::Allow {
            for hit in &verdict.hits {
                let audit = FraudAudit::new(wallet_id, verdict.decision, hit);
                if let Err(err) = store.record_fraud_audit(&audit).await {
                    warn!("fraud audit write failed for wallet {}: {}", wallet_id, err);
                }
            }
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> FraudScreen {
        FraudScreen::new(FraudConfig::default())
    }

    fn stats(count: u64, total: u64) -> WindowStats {
        WindowStats { count, total }
    }

    #[test]
    fn test_allows_under_thresholds() {
        let v = screen().evaluate(Role::Customer, 100_000, stats(3, 400_000), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Allow);
        assert!(v.hits.is_empty());
    }

    #[test]
    fn test_single_amount_flags_high() {
        let v = screen().evaluate(Role::Customer, 2_000_001, stats(0, 0), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Flag);
        assert_eq!(v.hits.len(), 1);
        assert_eq!(v.hits[0].rule, FraudRule::SingleAmount);
        assert_eq!(v.hits[0].severity, Severity::High);
    }

    #[test]
    fn test_amount_at_ceiling_allowed() {
        let v = screen().evaluate(Role::Customer, 2_000_000, stats(0, 0), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Allow);
    }

    #[test]
    fn test_daily_count_flags_medium() {
        // 10 committed outflows, the candidate would be the 11th
        let v = screen().evaluate(Role::Customer, 1_000, stats(10, 50_000), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Flag);
        assert_eq!(v.hits[0].rule, FraudRule::DailyCount);
        assert_eq!(v.hits[0].severity, Severity::Medium);
        assert_eq!(v.hits[0].observed_count, 11);
    }

    #[test]
    fn test_daily_total_blocks() {
        let v = screen().evaluate(Role::Customer, 2_000, stats(4, 4_999_000), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Block);
        assert_eq!(v.hits[0].rule, FraudRule::DailyTotal);
        assert_eq!(v.hits[0].severity, Severity::Critical);
        assert_eq!(v.hits[0].observed_total, 5_001_000);
    }

    #[test]
    fn test_block_takes_precedence_over_flags() {
        // Count and total both tripped plus an oversized single amount
        let v = screen().evaluate(Role::Customer, 3_000_000, stats(12, 4_000_000), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Block);
        assert_eq!(v.hits.len(), 3);
        assert_eq!(v.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_burst_flag_mode() {
        let config = FraudConfig {
            burst: BurstRule {
                enabled: true,
                window_secs: 10,
                max_count: 1,
                block: false,
            },
            ..FraudConfig::default()
        };
        let s = FraudScreen::new(config);

        // First movement in the window: allowed
        let v = s.evaluate(Role::Customer, 1_000, stats(0, 0), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Allow);

        // Second movement inside 10s: flagged
        let v = s.evaluate(Role::Customer, 1_000, stats(1, 1_000), stats(1, 1_000));
        assert_eq!(v.decision, FraudDecision::Flag);
        assert_eq!(v.hits[0].rule, FraudRule::Burst);
        assert_eq!(v.hits[0].severity, Severity::High);
    }

    #[test]
    fn test_burst_block_mode() {
        let config = FraudConfig {
            burst: BurstRule {
                enabled: true,
                window_secs: 10,
                max_count: 1,
                block: true,
            },
            ..FraudConfig::default()
        };
        let s = FraudScreen::new(config);
        let v = s.evaluate(Role::Customer, 1_000, stats(1, 1_000), stats(1, 1_000));
        assert_eq!(v.decision, FraudDecision::Block);
        assert_eq!(v.hits[0].severity, Severity::Critical);
    }

    #[test]
    fn test_role_override_raises_ceiling() {
        let mut config = FraudConfig::default();
        config.roles.insert(
            Role::Vendor,
            RoleThresholds {
                max_single_amount: Some(10_000_000),
                ..RoleThresholds::default()
            },
        );
        let s = FraudScreen::new(config);

        // Over the customer ceiling but under the vendor override
        let v = s.evaluate(Role::Vendor, 5_000_000, stats(0, 0), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Allow);
        let v = s.evaluate(Role::Customer, 5_000_000, stats(0, 0), stats(0, 0));
        assert_eq!(v.decision, FraudDecision::Flag);
    }

    #[test]
    fn test_disabled_screen_allows_everything() {
        let config = FraudConfig {
            enabled: false,
            ..FraudConfig::default()
        };
        let s = FraudScreen::new(config);
        let v = s.evaluate(
            Role::Customer,
            u64::MAX,
            stats(1_000, u64::MAX),
            stats(1_000, u64::MAX),
        );
        assert_eq!(v.decision, FraudDecision::Allow);
    }
}
