//! Ledger Store
//!
//! The transactional core: wallets with spendable/held sub-balances and
//! an append-only, idempotency-keyed entry log. Balances only change by
//! applying a `TransferPlan`, an atomic batch of movements that either
//! commits entirely or not at all.
//!
//! # Idempotency
//!
//! Every plan carries a caller-supplied primary key. Applying a plan
//! whose key already committed returns the stored entries untouched;
//! the same key with a different payload is rejected. Secondary legs
//! (fees, commissions) derive their keys from the primary, so one
//! request is one lineage of entries.
//!
//! # Backends
//!
//! `MemoryStore` for tests and the mock gateway, `PgStore` for
//! production. Both run plans through the same movement executor, so
//! balance semantics cannot diverge.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

// Re-exports for convenience
pub use error::LedgerError;
pub use memory::MemoryStore;
pub use models::{
    Applied, EntryStatus, EntryType, LedgerEntry, LedgerEvent, Movement, TransferPlan, Wallet,
    WalletSnapshot, WalletStatus, WindowStats,
};
pub use pg::PgStore;
pub use store::{EscrowStore, LedgerStore};
