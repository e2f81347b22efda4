//! Storage traits for the transaction engine
//!
//! Two seams: `LedgerStore` for wallets and entry application,
//! `EscrowStore` for escrow lifecycle. Both have an in-memory
//! implementation for tests and a PostgreSQL implementation for
//! production; services only ever see the traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core_types::{DisputeId, EscrowId, OrderRef, OwnerId, WalletId};
use crate::escrow::models::{Dispute, DisputeResolution, Escrow};
use crate::escrow::state::EscrowState;
use crate::fraud::FraudAudit;
use crate::ledger::error::LedgerError;
use crate::ledger::models::{
    Applied, LedgerEntry, TransferPlan, Wallet, WalletStatus, WindowStats,
};
use crate::money::Currency;

// ============================================================================
// Ledger Store
// ============================================================================

/// Wallets and the append-only entry log.
///
/// `apply` is the only way balances move. It MUST be atomic over every
/// movement in the plan and idempotent on the plan's primary key:
/// calling it again with the same key returns the stored entries
/// without touching any balance.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a wallet; (owner, currency) is unique.
    ///
    /// Returns `AlreadyExists` when the owner already holds a wallet in
    /// this currency.
    async fn create_wallet(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Wallet, LedgerError>;

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError>;

    async fn find_wallet(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Option<Wallet>, LedgerError>;

    /// Administrative freeze/unfreeze. Returns the updated wallet.
    async fn set_wallet_status(
        &self,
        wallet_id: WalletId,
        status: WalletStatus,
    ) -> Result<Wallet, LedgerError>;

    /// Get-or-create the platform wallet for a currency. Fee and
    /// commission legs credit this wallet; cross-currency transfers
    /// settle through it.
    async fn platform_wallet(&self, currency: Currency) -> Result<Wallet, LedgerError>;

    /// Apply a transfer plan atomically.
    ///
    /// Replay: if an entry already exists under the plan's primary key
    /// and describes the same request, the stored entries come back
    /// with `replayed = true`. The same key with a different payload is
    /// `IdempotencyConflict`.
    async fn apply(&self, plan: TransferPlan) -> Result<Applied, LedgerError>;

    async fn get_entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Count and sum of committed outflow entries for a wallet since a
    /// point in time. Velocity windows and transfer limits both read
    /// this; only committed entries count.
    async fn outflow_stats(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<WindowStats, LedgerError>;

    /// Append a fraud screening record. Best-effort from the caller's
    /// side; failures here must never block a transfer.
    async fn record_fraud_audit(&self, audit: &FraudAudit) -> Result<(), LedgerError>;

    /// Most recent fraud records for a wallet, newest first.
    async fn list_fraud_audits(
        &self,
        wallet_id: WalletId,
        limit: usize,
    ) -> Result<Vec<FraudAudit>, LedgerError>;
}

// ============================================================================
// Escrow Store
// ============================================================================

/// Escrow lifecycle persistence.
///
/// State changes that move money are compare-and-swap transitions
/// executed in the same transaction as the payout plan, so an escrow
/// can never reach a terminal state without its funds settling (or
/// vice versa).
#[async_trait]
pub trait EscrowStore: Send + Sync {
    /// Insert a PENDING escrow and apply its hold plan in one
    /// transaction.
    ///
    /// Returns `AlreadyExists` when the order already has an escrow;
    /// the caller decides whether that is a replay.
    async fn create_escrow(
        &self,
        escrow: &Escrow,
        plan: TransferPlan,
    ) -> Result<Applied, LedgerError>;

    async fn get_escrow(&self, escrow_id: EscrowId) -> Result<Escrow, LedgerError>;

    async fn find_escrow_by_order(
        &self,
        order_id: OrderRef,
    ) -> Result<Option<Escrow>, LedgerError>;

    /// PENDING escrows whose auto-release deadline has passed, oldest
    /// deadline first.
    async fn find_due_escrows(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Escrow>, LedgerError>;

    /// Settle an escrow: CAS the state from `expected` to `new`, apply
    /// the payout plan, and record the dispute resolution when one is
    /// attached, all in one transaction.
    ///
    /// When the CAS loses because the escrow is already in `new` state
    /// the stored entries come back with `replayed = true`; any other
    /// current state is `InvalidStateTransition`.
    async fn settle_escrow(
        &self,
        escrow_id: EscrowId,
        expected: EscrowState,
        new: EscrowState,
        plan: TransferPlan,
        resolution: Option<DisputeResolution>,
    ) -> Result<Applied, LedgerError>;

    /// Insert a dispute and CAS its escrow from PENDING to DISPUTED in
    /// one transaction. No funds move.
    async fn open_dispute(&self, dispute: &Dispute) -> Result<(), LedgerError>;

    async fn get_dispute(&self, dispute_id: DisputeId) -> Result<Dispute, LedgerError>;

    /// Open dispute for an escrow, if any. At most one can be open.
    async fn find_open_dispute(
        &self,
        escrow_id: EscrowId,
    ) -> Result<Option<Dispute>, LedgerError>;
}
