//! Ledger Error Types
//!
//! The single error taxonomy for wallet, transfer and escrow operations.
//! Every variant carries a stable code for API responses and an HTTP
//! status suggestion; the gateway maps them without further translation.

use thiserror::Error;

use crate::fee::FeeError;
use crate::money::MoneyError;
use crate::rates::RateError;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Balance / wallet errors ===
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Currency mismatch: {expected} wallet cannot settle {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("Wallet is frozen")]
    WalletFrozen,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already exists for this owner and currency")]
    AlreadyExists,

    // === Request errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transfer limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Idempotency key reused with a different payload")]
    IdempotencyConflict,

    #[error("Transfer blocked by fraud screen: {0}")]
    FraudBlocked(String),

    // === Concurrency ===
    #[error("Concurrent modification, retry")]
    ConcurrentModification,

    // === Escrow / dispute errors ===
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),

    #[error("Dispute not found: {0}")]
    DisputeNotFound(String),

    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    // === System errors ===
    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::WalletFrozen => "WALLET_FROZEN",
            LedgerError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            LedgerError::AlreadyExists => "WALLET_ALREADY_EXISTS",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            LedgerError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            LedgerError::FraudBlocked(_) => "FRAUD_BLOCKED",
            LedgerError::ConcurrentModification => "CONCURRENT_MODIFICATION",
            LedgerError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            LedgerError::EscrowNotFound(_) => "ESCROW_NOT_FOUND",
            LedgerError::DisputeNotFound(_) => "DISPUTE_NOT_FOUND",
            LedgerError::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            LedgerError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_) => 400,
            LedgerError::FraudBlocked(_) => 403,
            LedgerError::WalletNotFound(_)
            | LedgerError::EscrowNotFound(_)
            | LedgerError::DisputeNotFound(_)
            | LedgerError::EntryNotFound(_) => 404,
            LedgerError::AlreadyExists
            | LedgerError::IdempotencyConflict
            | LedgerError::ConcurrentModification
            | LedgerError::InvalidStateTransition(_) => 409,
            LedgerError::InsufficientFunds
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::WalletFrozen
            | LedgerError::LimitExceeded(_) => 422,
            LedgerError::Database(_) | LedgerError::Internal(_) => 500,
            LedgerError::RateUnavailable(_) => 503,
        }
    }

    /// True when the caller may safely retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrentModification)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if let Some(code) = db.code() {
                // Serialization failure or deadlock: the transaction
                // can be retried as-is
                if code == "40001" || code == "40P01" {
                    return LedgerError::ConcurrentModification;
                }
            }
        }
        LedgerError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Internal(e.to_string())
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        LedgerError::InvalidAmount(e.to_string())
    }
}

impl From<RateError> for LedgerError {
    fn from(e: RateError) -> Self {
        match e {
            RateError::Unavailable { from, to } => {
                LedgerError::RateUnavailable(format!("{}->{}", from, to))
            }
            RateError::Overflow => LedgerError::Internal("rate conversion overflow".to_string()),
        }
    }
}

impl From<FeeError> for LedgerError {
    fn from(e: FeeError) -> Self {
        match e {
            FeeError::Rate(rate) => rate.into(),
            other => LedgerError::InvalidAmount(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            LedgerError::ConcurrentModification.code(),
            "CONCURRENT_MODIFICATION"
        );
        assert_eq!(
            LedgerError::FraudBlocked("velocity".into()).code(),
            "FRAUD_BLOCKED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::InvalidAmount("zero".into()).http_status(), 400);
        assert_eq!(LedgerError::FraudBlocked("x".into()).http_status(), 403);
        assert_eq!(LedgerError::WalletNotFound("w".into()).http_status(), 404);
        assert_eq!(LedgerError::IdempotencyConflict.http_status(), 409);
        assert_eq!(LedgerError::InsufficientFunds.http_status(), 422);
        assert_eq!(LedgerError::Database("down".into()).http_status(), 500);
        assert_eq!(LedgerError::RateUnavailable("USD->GNF".into()).http_status(), 503);
    }

    #[test]
    fn test_only_concurrent_modification_is_retryable() {
        assert!(LedgerError::ConcurrentModification.is_retryable());
        assert!(!LedgerError::InsufficientFunds.is_retryable());
        assert!(!LedgerError::IdempotencyConflict.is_retryable());
    }

    #[test]
    fn test_fee_error_conversion() {
        let e: LedgerError = FeeError::ExceedsAmount {
            fee: 500,
            amount: 300,
        }
        .into();
        assert_eq!(e.code(), "INVALID_AMOUNT");

        let e: LedgerError = FeeError::Rate(RateError::Unavailable {
            from: crate::money::Currency::Usd,
            to: crate::money::Currency::Gnf,
        })
        .into();
        assert_eq!(e.code(), "RATE_UNAVAILABLE");
    }
}
