//! PayLock - Wallet & Escrow Transaction Engine
//!
//! A double-entry wallet ledger with idempotent transfers, fee and
//! commission splits, velocity-based fraud screening, and escrow with
//! dispute resolution and deadline-driven auto-release.
//!
//! # Modules
//!
//! - [`core_types`] - ID newtypes (WalletId, EscrowId, ...)
//! - [`money`] - Currency table and minor-unit arithmetic
//! - [`balance`] - Enforced available/held balance type
//! - [`rates`] - Exchange-rate snapshot for conversions
//! - [`fee`] - Fee rules, tiers, and commission splits
//! - [`fraud`] - Pre-commit velocity and amount screening
//! - [`ledger`] - Wallets, transfer plans, and the entry log
//! - [`transfer`] - Transfer/deposit/withdraw orchestration
//! - [`escrow`] - Escrow lifecycle, disputes, auto-release sweeper
//! - [`gateway`] - HTTP API (axum + OpenAPI)

pub mod balance;
pub mod config;
pub mod core_types;
pub mod db;
pub mod escrow;
pub mod fee;
pub mod fraud;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod rates;
pub mod transfer;

// Convenient re-exports at crate root
pub use balance::WalletBalance;
pub use core_types::{DisputeId, EntryId, EscrowId, OrderRef, OwnerId, WalletId};
pub use escrow::{EscrowManager, EscrowPolicy, EscrowState, Sweeper, SweeperConfig};
pub use fee::{FeeBreakdown, FeeRule, FeeTable, Role};
pub use fraud::{FraudConfig, FraudScreen, Verdict};
pub use ledger::{LedgerEntry, LedgerError, LedgerStore, MemoryStore, PgStore, Wallet};
pub use money::Currency;
pub use rates::RateTable;
pub use transfer::{EventSink, LimitsConfig, RetryPolicy, TransferService};
