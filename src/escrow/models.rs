//! Escrow and dispute records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{DisputeId, EscrowId, OrderRef, OwnerId, WalletId};
use crate::escrow::state::EscrowState;
use crate::money::Currency;

/// Escrow record. One per order; the held amount sits in the payer
/// wallet's escrow sub-balance until a terminal transition pays it out.
#[derive(Debug, Clone)]
pub struct Escrow {
    pub id: EscrowId,
    pub order_id: OrderRef,
    pub payer_wallet_id: WalletId,
    pub receiver_wallet_id: WalletId,
    /// Gross held amount in minor units
    pub amount: u64,
    pub currency: Currency,
    /// Commission rate in 10^6 precision, charged at release
    pub commission_ppm: u64,
    pub state: EscrowState,
    pub created_at: DateTime<Utc>,
    pub auto_release_deadline: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    pub fn new(
        order_id: OrderRef,
        payer_wallet_id: WalletId,
        receiver_wallet_id: WalletId,
        amount: u64,
        currency: Currency,
        commission_ppm: u64,
        auto_release_deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EscrowId::new(),
            order_id,
            payer_wallet_id,
            receiver_wallet_id,
            amount,
            currency,
            commission_ppm,
            state: EscrowState::Pending,
            created_at: now,
            auto_release_deadline,
            released_at: None,
            updated_at: now,
        }
    }
}

impl fmt::Display for Escrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Escrow[{}] order={} amount={} {} state={}",
            self.id, self.order_id, self.amount, self.currency, self.state
        )
    }
}

/// Why a dispute was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum DisputeType {
    NotReceived = 1,
    NotAsDescribed = 2,
    Unauthorized = 3,
    Other = 4,
}

impl DisputeType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DisputeType::NotReceived),
            2 => Some(DisputeType::NotAsDescribed),
            3 => Some(DisputeType::Unauthorized),
            4 => Some(DisputeType::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeType::NotReceived => "not_received",
            DisputeType::NotAsDescribed => "not_as_described",
            DisputeType::Unauthorized => "unauthorized",
            DisputeType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_received" => Some(DisputeType::NotReceived),
            "not_as_described" => Some(DisputeType::NotAsDescribed),
            "unauthorized" => Some(DisputeType::Unauthorized),
            "other" => Some(DisputeType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DisputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum DisputeStatus {
    Open = 1,
    Resolved = 2,
}

impl DisputeStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DisputeStatus::Open),
            2 => Some(DisputeStatus::Resolved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Administrative resolution outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum DisputeOutcome {
    /// Full release to receiver (commission applies)
    Release = 1,
    /// Full refund to payer
    Refund = 2,
    /// Split per the dispute's requested_amount
    Partial = 3,
}

impl DisputeOutcome {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DisputeOutcome::Release),
            2 => Some(DisputeOutcome::Refund),
            3 => Some(DisputeOutcome::Partial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeOutcome::Release => "release",
            DisputeOutcome::Refund => "refund",
            DisputeOutcome::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "release" => Some(DisputeOutcome::Release),
            "refund" => Some(DisputeOutcome::Refund),
            "partial" => Some(DisputeOutcome::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for DisputeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dispute resolution applied together with the escrow settlement, in
/// the same transaction as the payout plan.
#[derive(Debug, Clone)]
pub struct DisputeResolution {
    pub dispute_id: DisputeId,
    pub outcome: DisputeOutcome,
    pub resolver: String,
}

/// Dispute record. Created only while the escrow is PENDING; opening it
/// moves the escrow to DISPUTED. Resolution records who decided and how.
#[derive(Debug, Clone)]
pub struct Dispute {
    pub id: DisputeId,
    pub escrow_id: EscrowId,
    pub raised_by: OwnerId,
    pub dispute_type: DisputeType,
    pub description: String,
    /// Partial-refund request: how much the raiser wants returned to
    /// the payer. Must not exceed the escrow amount.
    pub requested_amount: Option<u64>,
    pub status: DisputeStatus,
    pub outcome: Option<DisputeOutcome>,
    /// Administrative identity that resolved the dispute (free-form,
    /// authentication lives outside the engine)
    pub resolver: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(
        escrow_id: EscrowId,
        raised_by: OwnerId,
        dispute_type: DisputeType,
        description: String,
        requested_amount: Option<u64>,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            escrow_id,
            raised_by,
            dispute_type,
            description,
            requested_amount,
            status: DisputeStatus::Open,
            outcome: None,
            resolver: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}
