//! Fraud Screen
//!
//! Pre-mutation velocity and amount screening for outgoing movements.
//! Every window counter is derived from committed ledger entries, so
//! screening and balance state can never disagree. Non-ALLOW verdicts
//! leave per-rule audit rows behind for manual review.

pub mod screen;
pub mod types;

// Re-exports for convenience
pub use screen::{BurstRule, DailyWindowRule, FraudConfig, FraudScreen, RoleThresholds};
pub use types::{FraudAudit, FraudDecision, FraudRule, RuleHit, Severity, Verdict};
