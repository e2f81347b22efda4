//! Ledger data model
//!
//! Wallets and immutable ledger entries, plus the transfer plan the
//! stores execute atomically. Escrow and dispute records live in the
//! escrow module; the stores persist those too.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::balance::WalletBalance;
use crate::core_types::{EntryId, OwnerId, WalletId};
use crate::fee::FeeBreakdown;
use crate::ledger::error::LedgerError;
use crate::money::Currency;

/// Wallet status. Frozen is an administrative stop: a frozen wallet can
/// neither send nor receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum WalletStatus {
    Active = 1,
    Frozen = 2,
}

impl WalletStatus {
    /// Numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WalletStatus::Active),
            2 => Some(WalletStatus::Frozen),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "active",
            WalletStatus::Frozen => "frozen",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for WalletStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        WalletStatus::from_id(value).ok_or(())
    }
}

/// One wallet: (owner, currency) is unique, balances only move through
/// the store's transactional operations.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: OwnerId,
    pub currency: Currency,
    pub balance: WalletBalance,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: OwnerId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            owner_id,
            currency,
            balance: WalletBalance::default(),
            status: WalletStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }
}

/// Ledger entry type.
///
/// Escrow types change which sub-balance a movement touches; fee and
/// commission legs are credit-only because their debit side is already
/// carried by the main movement's gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum EntryType {
    Transfer = 1,
    Deposit = 2,
    Withdrawal = 3,
    Fee = 4,
    Commission = 5,
    EscrowHold = 6,
    EscrowRelease = 7,
    EscrowRefund = 8,
}

impl EntryType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EntryType::Transfer),
            2 => Some(EntryType::Deposit),
            3 => Some(EntryType::Withdrawal),
            4 => Some(EntryType::Fee),
            5 => Some(EntryType::Commission),
            6 => Some(EntryType::EscrowHold),
            7 => Some(EntryType::EscrowRelease),
            8 => Some(EntryType::EscrowRefund),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Transfer => "transfer",
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::Fee => "fee",
            EntryType::Commission => "commission",
            EntryType::EscrowHold => "escrow_hold",
            EntryType::EscrowRelease => "escrow_release",
            EntryType::EscrowRefund => "escrow_refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transfer" => Some(EntryType::Transfer),
            "deposit" => Some(EntryType::Deposit),
            "withdrawal" => Some(EntryType::Withdrawal),
            "fee" => Some(EntryType::Fee),
            "commission" => Some(EntryType::Commission),
            "escrow_hold" => Some(EntryType::EscrowHold),
            "escrow_release" => Some(EntryType::EscrowRelease),
            "escrow_refund" => Some(EntryType::EscrowRefund),
            _ => None,
        }
    }

    /// Movements counted by velocity windows and transfer limits:
    /// money leaving the owner's control by their own request.
    #[inline]
    pub fn counts_as_outflow(&self) -> bool {
        matches!(
            self,
            EntryType::Transfer | EntryType::Withdrawal | EntryType::EscrowHold
        )
    }

    /// Credit-only legs riding on a main movement
    #[inline]
    pub fn is_fee_leg(&self) -> bool {
        matches!(self, EntryType::Fee | EntryType::Commission)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for EntryType {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        EntryType::from_id(value).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum EntryStatus {
    Completed = 1,
    Reversed = 2,
}

impl EntryStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EntryStatus::Completed),
            2 => Some(EntryStatus::Reversed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Completed => "completed",
            EntryStatus::Reversed => "reversed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable transaction record. Exactly one exists per idempotency
/// key; a reversal is a separate entry pointing back via `reversal_of`,
/// never an in-place edit.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub idempotency_key: String,
    pub entry_type: EntryType,
    pub from_wallet_id: Option<WalletId>,
    pub to_wallet_id: Option<WalletId>,
    /// Gross amount of this movement in minor units
    pub amount: u64,
    pub currency: Currency,
    pub fee: FeeBreakdown,
    pub status: EntryStatus,
    /// For cross-currency transfers: what the counterpart leg delivered
    pub converted_amount: Option<u64>,
    /// Rate used for `converted_amount`, persisted for audit
    pub exchange_rate: Option<Decimal>,
    pub reversal_of: Option<EntryId>,
    pub created_at: DateTime<Utc>,
}

/// One balance movement inside a transfer plan.
///
/// `amount` is the gross amount this movement takes from its source;
/// the receiving side is credited `fee.net_amount` (equal to `amount`
/// when no fee applies). Fee/commission legs are credit-only.
#[derive(Debug, Clone)]
pub struct Movement {
    /// Idempotency key of the resulting entry (derived from the plan
    /// key for secondary legs)
    pub key: String,
    pub entry_type: EntryType,
    pub from: Option<WalletId>,
    pub to: Option<WalletId>,
    pub amount: u64,
    pub currency: Currency,
    pub fee: FeeBreakdown,
    pub converted_amount: Option<u64>,
    pub exchange_rate: Option<Decimal>,
}

impl Movement {
    pub fn new(
        key: impl Into<String>,
        entry_type: EntryType,
        from: Option<WalletId>,
        to: Option<WalletId>,
        amount: u64,
        currency: Currency,
    ) -> Self {
        Self {
            key: key.into(),
            entry_type,
            from,
            to,
            amount,
            currency,
            fee: FeeBreakdown::free(amount),
            converted_amount: None,
            exchange_rate: None,
        }
    }

    pub fn with_fee(mut self, fee: FeeBreakdown) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_conversion(mut self, converted_amount: u64, rate: Decimal) -> Self {
        self.converted_amount = Some(converted_amount);
        self.exchange_rate = Some(rate);
        self
    }

    /// Structural validation independent of wallet state
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must be positive".into()));
        }
        if self.amount > i64::MAX as u64 {
            return Err(LedgerError::InvalidAmount(
                "amount exceeds storable maximum".into(),
            ));
        }
        if self.fee.net_amount > self.amount {
            return Err(LedgerError::InvalidAmount(
                "net amount exceeds gross amount".into(),
            ));
        }
        let ok = match self.entry_type {
            EntryType::Deposit => self.from.is_none() && self.to.is_some(),
            EntryType::Withdrawal => self.from.is_some() && self.to.is_none(),
            EntryType::EscrowHold | EntryType::EscrowRefund => {
                // Both sides are the payer wallet: the money changes
                // sub-balance, not owner
                self.from.is_some() && self.from == self.to
            }
            _ => self.from.is_some() && self.to.is_some(),
        };
        if !ok {
            return Err(LedgerError::InvalidAmount(format!(
                "movement endpoints invalid for {}",
                self.entry_type
            )));
        }
        if self.key.is_empty() {
            return Err(LedgerError::InvalidAmount("empty idempotency key".into()));
        }
        Ok(())
    }

    /// Replay check: does a stored entry describe this same request?
    pub fn payload_matches(&self, entry: &LedgerEntry) -> bool {
        entry.entry_type == self.entry_type
            && entry.from_wallet_id == self.from
            && entry.to_wallet_id == self.to
            && entry.amount == self.amount
            && entry.currency == self.currency
    }

    /// Mutate pre-loaded wallet copies according to this movement's
    /// type. Both stores run plans through here so balance semantics
    /// cannot drift between backends.
    pub(crate) fn apply_to(
        &self,
        wallets: &mut FxHashMap<WalletId, Wallet>,
    ) -> Result<(), LedgerError> {
        if let Some(id) = self.from {
            check_wallet(wallet_ref(wallets, id)?, self.currency)?;
        }
        if let Some(id) = self.to {
            check_wallet(wallet_ref(wallets, id)?, self.currency)?;
        }
        match self.entry_type {
            EntryType::Deposit => {
                wallet_mut(wallets, self.to)?
                    .balance
                    .credit(self.fee.net_amount)
                    .map_err(balance_err)?;
            }
            EntryType::Withdrawal => {
                wallet_mut(wallets, self.from)?
                    .balance
                    .debit(self.amount)
                    .map_err(balance_err)?;
            }
            EntryType::Transfer => {
                wallet_mut(wallets, self.from)?
                    .balance
                    .debit(self.amount)
                    .map_err(balance_err)?;
                wallet_mut(wallets, self.to)?
                    .balance
                    .credit(self.fee.net_amount)
                    .map_err(balance_err)?;
            }
            // Credit-only legs: the debit side is already inside the
            // main movement's gross amount
            EntryType::Fee | EntryType::Commission => {
                wallet_mut(wallets, self.to)?
                    .balance
                    .credit(self.amount)
                    .map_err(balance_err)?;
            }
            EntryType::EscrowHold => {
                wallet_mut(wallets, self.from)?
                    .balance
                    .hold(self.amount)
                    .map_err(balance_err)?;
            }
            EntryType::EscrowRelease => {
                wallet_mut(wallets, self.from)?
                    .balance
                    .spend_held(self.amount)
                    .map_err(balance_err)?;
                wallet_mut(wallets, self.to)?
                    .balance
                    .credit(self.fee.net_amount)
                    .map_err(balance_err)?;
            }
            EntryType::EscrowRefund => {
                wallet_mut(wallets, self.from)?
                    .balance
                    .refund_held(self.amount)
                    .map_err(balance_err)?;
            }
        }
        Ok(())
    }
}

fn balance_err(msg: &'static str) -> LedgerError {
    if msg.starts_with("Insufficient") {
        LedgerError::InsufficientFunds
    } else {
        LedgerError::Internal(msg.to_string())
    }
}

fn check_wallet(wallet: &Wallet, currency: Currency) -> Result<(), LedgerError> {
    if !wallet.is_active() {
        return Err(LedgerError::WalletFrozen);
    }
    if wallet.currency != currency {
        return Err(LedgerError::CurrencyMismatch {
            expected: wallet.currency.to_string(),
            actual: currency.to_string(),
        });
    }
    Ok(())
}

fn wallet_ref(
    wallets: &FxHashMap<WalletId, Wallet>,
    id: WalletId,
) -> Result<&Wallet, LedgerError> {
    wallets
        .get(&id)
        .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))
}

fn wallet_mut<'a>(
    wallets: &'a mut FxHashMap<WalletId, Wallet>,
    id: Option<WalletId>,
) -> Result<&'a mut Wallet, LedgerError> {
    let id = id.ok_or_else(|| LedgerError::Internal("movement endpoint missing".to_string()))?;
    wallets
        .get_mut(&id)
        .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))
}

/// An atomic set of movements sharing one idempotency lineage: either
/// every movement commits, or none does. The first movement is the
/// primary; its key is the caller's idempotency key and is the one
/// consulted for replay.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub movements: Vec<Movement>,
}

impl TransferPlan {
    pub fn single(movement: Movement) -> Self {
        Self {
            movements: vec![movement],
        }
    }

    pub fn new(movements: Vec<Movement>) -> Self {
        Self { movements }
    }

    pub fn primary(&self) -> &Movement {
        &self.movements[0]
    }

    pub fn primary_key(&self) -> &str {
        &self.movements[0].key
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.movements.is_empty() {
            return Err(LedgerError::InvalidAmount("empty transfer plan".into()));
        }
        for m in &self.movements {
            m.validate()?;
        }
        for (i, m) in self.movements.iter().enumerate() {
            if self.movements[..i].iter().any(|other| other.key == m.key) {
                return Err(LedgerError::InvalidAmount(format!(
                    "duplicate movement key {}",
                    m.key
                )));
            }
        }
        Ok(())
    }

    /// Distinct wallets this plan touches, sorted. Stores lock rows in
    /// this order so two overlapping plans cannot deadlock.
    pub fn wallet_ids(&self) -> Vec<WalletId> {
        let mut ids: Vec<WalletId> = self
            .movements
            .iter()
            .flat_map(|m| [m.from, m.to])
            .flatten()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Run every movement against pre-loaded wallet copies
    pub(crate) fn apply_to(
        &self,
        wallets: &mut FxHashMap<WalletId, Wallet>,
    ) -> Result<(), LedgerError> {
        for movement in &self.movements {
            movement.apply_to(wallets)?;
        }
        Ok(())
    }
}

/// Balance state captured inside the committing transaction, carried
/// on events so listeners never re-read racy state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WalletSnapshot {
    pub wallet_id: WalletId,
    pub avail: u64,
    pub held: u64,
    pub version: u64,
}

impl WalletSnapshot {
    pub fn of(wallet: &Wallet) -> Self {
        Self {
            wallet_id: wallet.id,
            avail: wallet.balance.avail(),
            held: wallet.balance.held(),
            version: wallet.balance.version(),
        }
    }
}

/// Outcome of an applied (or replayed) transfer plan
#[derive(Debug, Clone)]
pub struct Applied {
    pub entries: Vec<LedgerEntry>,
    /// True when the plan was previously committed and this call only
    /// returned the stored result
    pub replayed: bool,
    /// Post-commit balances of every touched wallet (empty on replay)
    pub wallets: Vec<WalletSnapshot>,
}

/// Post-commit notification for external listeners. Never a
/// precondition for the transaction itself.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEvent {
    pub entry_id: String,
    pub entry_type: EntryType,
    pub amount: u64,
    pub currency: Currency,
    pub wallets: Vec<WalletSnapshot>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn from_applied(applied: &Applied) -> Option<Self> {
        let primary = applied.entries.first()?;
        Some(Self {
            entry_id: primary.id.to_string(),
            entry_type: primary.entry_type,
            amount: primary.amount,
            currency: primary.currency,
            wallets: applied.wallets.clone(),
            created_at: primary.created_at,
        })
    }
}

/// Count and sum of outflow entries inside a time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub count: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_status_roundtrip() {
        assert_eq!(WalletStatus::from_id(1), Some(WalletStatus::Active));
        assert_eq!(WalletStatus::from_id(2), Some(WalletStatus::Frozen));
        assert_eq!(WalletStatus::from_id(0), None);
        assert_eq!(WalletStatus::Active.as_str(), "active");
    }

    #[test]
    fn test_entry_type_roundtrip() {
        for t in [
            EntryType::Transfer,
            EntryType::Deposit,
            EntryType::Withdrawal,
            EntryType::Fee,
            EntryType::Commission,
            EntryType::EscrowHold,
            EntryType::EscrowRelease,
            EntryType::EscrowRefund,
        ] {
            assert_eq!(EntryType::from_id(t.id()), Some(t));
            assert_eq!(EntryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntryType::from_id(0), None);
        assert_eq!(EntryType::parse("unknown"), None);
    }

    #[test]
    fn test_outflow_classification() {
        assert!(EntryType::Transfer.counts_as_outflow());
        assert!(EntryType::Withdrawal.counts_as_outflow());
        assert!(EntryType::EscrowHold.counts_as_outflow());
        assert!(!EntryType::Deposit.counts_as_outflow());
        assert!(!EntryType::Fee.counts_as_outflow());
        assert!(!EntryType::EscrowRelease.counts_as_outflow());
    }

    #[test]
    fn test_movement_validation() {
        let w1 = WalletId::new();
        let w2 = WalletId::new();

        let ok = Movement::new("k1", EntryType::Transfer, Some(w1), Some(w2), 100, Currency::Gnf);
        assert!(ok.validate().is_ok());

        let zero = Movement::new("k2", EntryType::Transfer, Some(w1), Some(w2), 0, Currency::Gnf);
        assert!(zero.validate().is_err());

        // Deposit must not carry a source wallet
        let bad_deposit =
            Movement::new("k3", EntryType::Deposit, Some(w1), Some(w2), 100, Currency::Gnf);
        assert!(bad_deposit.validate().is_err());
        let deposit = Movement::new("k4", EntryType::Deposit, None, Some(w2), 100, Currency::Gnf);
        assert!(deposit.validate().is_ok());

        // Escrow hold stays inside one wallet
        let bad_hold =
            Movement::new("k5", EntryType::EscrowHold, Some(w1), Some(w2), 100, Currency::Gnf);
        assert!(bad_hold.validate().is_err());
        let hold = Movement::new("k6", EntryType::EscrowHold, Some(w1), Some(w1), 100, Currency::Gnf);
        assert!(hold.validate().is_ok());

        // Amounts above i64::MAX cannot be persisted
        let huge = Movement::new(
            "k7",
            EntryType::Transfer,
            Some(w1),
            Some(w2),
            u64::MAX,
            Currency::Gnf,
        );
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_plan_rejects_duplicate_keys() {
        let w1 = WalletId::new();
        let w2 = WalletId::new();
        let plan = TransferPlan::new(vec![
            Movement::new("same", EntryType::Transfer, Some(w1), Some(w2), 100, Currency::Gnf),
            Movement::new("same", EntryType::Fee, Some(w1), Some(w2), 1, Currency::Gnf),
        ]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_wallet_ids_sorted_and_deduped() {
        let w1 = WalletId::new();
        let w2 = WalletId::new();
        let plan = TransferPlan::new(vec![
            Movement::new("a", EntryType::Transfer, Some(w2), Some(w1), 100, Currency::Gnf),
            Movement::new("b", EntryType::Fee, Some(w2), Some(w1), 10, Currency::Gnf),
        ]);
        let ids = plan.wallet_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn test_plan_apply_to_conserves_funds() {
        let mut a = Wallet::new(1, Currency::Gnf);
        let mut b = Wallet::new(2, Currency::Gnf);
        let mut p = Wallet::new(0, Currency::Gnf);
        a.balance.credit(10_000).unwrap();
        b.balance.credit(500).unwrap();
        p.balance.credit(0).unwrap();
        let (aid, bid, pid) = (a.id, b.id, p.id);

        let mut wallets = FxHashMap::default();
        wallets.insert(aid, a);
        wallets.insert(bid, b);
        wallets.insert(pid, p);
        let before: u64 = wallets.values().map(|w| w.balance.avail()).sum();

        let fee = FeeBreakdown {
            percentage_fee: 800,
            fixed_fee: 0,
            total_fee: 800,
            net_amount: 7_200,
        };
        let plan = TransferPlan::new(vec![
            Movement::new("c1", EntryType::Transfer, Some(aid), Some(bid), 8_000, Currency::Gnf)
                .with_fee(fee),
            Movement::new("c1:fee", EntryType::Fee, Some(aid), Some(pid), 800, Currency::Gnf),
        ]);
        plan.apply_to(&mut wallets).unwrap();

        let after: u64 = wallets.values().map(|w| w.balance.avail()).sum();
        assert_eq!(before, after);
        assert_eq!(wallets[&aid].balance.avail(), 2_000);
        assert_eq!(wallets[&bid].balance.avail(), 7_700);
        assert_eq!(wallets[&pid].balance.avail(), 800);
    }

    #[test]
    fn test_plan_apply_to_rejects_frozen_wallet() {
        let mut a = Wallet::new(1, Currency::Gnf);
        a.balance.credit(1_000).unwrap();
        a.status = WalletStatus::Frozen;
        let b = Wallet::new(2, Currency::Gnf);
        let (aid, bid) = (a.id, b.id);

        let mut wallets = FxHashMap::default();
        wallets.insert(aid, a);
        wallets.insert(bid, b);

        let plan = TransferPlan::single(Movement::new(
            "f1",
            EntryType::Transfer,
            Some(aid),
            Some(bid),
            100,
            Currency::Gnf,
        ));
        let err = plan.apply_to(&mut wallets).unwrap_err();
        assert!(matches!(err, LedgerError::WalletFrozen));
    }
}
