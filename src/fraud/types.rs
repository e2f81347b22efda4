//! Fraud screening types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AuditId, WalletId};

/// Severity of a tripped rule. Only CRITICAL blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum Severity {
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Severity {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Severity::Medium),
            2 => Some(Severity::High),
            3 => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Screening decision for one candidate movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum FraudDecision {
    /// Proceed normally
    Allow = 1,
    /// Proceed, but leave an audit trail for manual review
    Flag = 2,
    /// Reject before any balance is touched
    Block = 3,
}

impl FraudDecision {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(FraudDecision::Allow),
            2 => Some(FraudDecision::Flag),
            3 => Some(FraudDecision::Block),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudDecision::Allow => "allow",
            FraudDecision::Flag => "flag",
            FraudDecision::Block => "block",
        }
    }
}

impl fmt::Display for FraudDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which screening rule tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum FraudRule {
    /// Single movement above the per-transaction ceiling
    SingleAmount = 1,
    /// Too many outflows inside the daily window
    DailyCount = 2,
    /// Outflow sum inside the daily window above the ceiling
    DailyTotal = 3,
    /// Too many outflows inside the burst window
    Burst = 4,
}

impl FraudRule {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(FraudRule::SingleAmount),
            2 => Some(FraudRule::DailyCount),
            3 => Some(FraudRule::DailyTotal),
            4 => Some(FraudRule::Burst),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudRule::SingleAmount => "single_amount",
            FraudRule::DailyCount => "daily_count",
            FraudRule::DailyTotal => "daily_total",
            FraudRule::Burst => "burst",
        }
    }
}

impl fmt::Display for FraudRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tripped rule with the window state it observed
#[derive(Debug, Clone)]
pub struct RuleHit {
    pub rule: FraudRule,
    pub severity: Severity,
    /// Outflow count in the window including the candidate
    pub observed_count: u64,
    /// Outflow sum in the window including the candidate
    pub observed_total: u64,
    pub window_secs: u64,
    pub note: String,
}

/// Screening outcome: the decision plus every rule that tripped
#[derive(Debug, Clone)]
pub struct Verdict {
    pub decision: FraudDecision,
    pub hits: Vec<RuleHit>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            decision: FraudDecision::Allow,
            hits: Vec::new(),
        }
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.decision == FraudDecision::Block
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.hits.iter().map(|h| h.severity).max()
    }

    /// Short reason string for errors and logs
    pub fn reason(&self) -> String {
        self.hits
            .iter()
            .map(|h| h.rule.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Persisted screening record. Written whenever the decision is not
/// ALLOW, one row per tripped rule.
#[derive(Debug, Clone)]
pub struct FraudAudit {
    pub id: AuditId,
    pub wallet_id: WalletId,
    pub decision: FraudDecision,
    pub severity: Severity,
    pub rule: FraudRule,
    pub observed_count: u64,
    pub observed_total: u64,
    pub window_secs: u64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl FraudAudit {
    pub fn new(wallet_id: WalletId, decision: FraudDecision, hit: &RuleHit) -> Self {
        Self {
            id: AuditId::new(),
            wallet_id,
            decision,
            severity: hit.severity,
            rule: hit.rule,
            observed_count: hit.observed_count,
            observed_total: hit.observed_total,
            window_secs: hit.window_secs,
            note: hit.note.clone(),
            created_at: Utc::now(),
        }
    }
}
