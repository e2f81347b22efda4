//! Transfer Service
//!
//! Orchestrates direct wallet movements: deposits, withdrawals and
//! wallet-to-wallet transfers, same-currency or cross-currency. The
//! pipeline is validate, replay lookup, limits, fraud screen, fee
//! computation, atomic ledger commit, post-commit event. The escrow
//! manager reuses the retry machinery here for its own settlements.

pub mod events;
pub mod limits;
pub mod service;

// Re-exports for convenience
pub use events::EventSink;
pub use limits::{LimitsConfig, TransferLimits};
pub use service::{
    DepositRequest, RetryPolicy, TransferOutcome, TransferRequest, TransferService,
    WithdrawRequest,
};
