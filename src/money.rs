//! Money Conversion Module
//!
//! Unified conversion between the internal u64 minor-unit representation
//! and client-facing string/Decimal representation. All conversions MUST
//! go through this module.
//!
//! ## Design Principles
//! 1. Integer minor units everywhere: no floats touch a balance
//! 2. Explicit Error Handling: No silent truncation
//! 3. The authoritative decimals source is [`Currency::decimals`]
//!
//! ## Internal Representation
//! - All amounts are stored as `u64` (or `i64` for signed deltas)
//! - The scale factor is `10^decimals` (e.g., 10^2 for USD = cents,
//!   10^0 for GNF which has no minor unit)

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported currency: {0}")]
    UnknownCurrency(String),
}

// ============================================================================
// Currency Registry
// ============================================================================

/// Supported settlement currencies.
///
/// Decimals follow ISO 4217 minor-unit exponents. GNF is the platform
/// default and, like XOF/XAF/JPY, has no minor unit: one internal unit
/// is one franc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Gnf,
    Usd,
    Eur,
    Xof,
    Xaf,
    Ngn,
    Gbp,
    Cad,
    Cny,
    Jpy,
}

impl Currency {
    pub const ALL: [Currency; 10] = [
        Currency::Gnf,
        Currency::Usd,
        Currency::Eur,
        Currency::Xof,
        Currency::Xaf,
        Currency::Ngn,
        Currency::Gbp,
        Currency::Cad,
        Currency::Cny,
        Currency::Jpy,
    ];

    /// ISO 4217 alpha code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gnf => "GNF",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Xof => "XOF",
            Currency::Xaf => "XAF",
            Currency::Ngn => "NGN",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Cny => "CNY",
            Currency::Jpy => "JPY",
        }
    }

    /// Minor-unit decimal places for the internal representation
    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Gnf | Currency::Xof | Currency::Xaf | Currency::Jpy => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GNF" => Ok(Currency::Gnf),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "XOF" => Ok(Currency::Xof),
            "XAF" => Ok(Currency::Xaf),
            "NGN" => Ok(Currency::Ngn),
            "GBP" => Ok(Currency::Gbp),
            "CAD" => Ok(Currency::Cad),
            "CNY" => Ok(Currency::Cny),
            "JPY" => Ok(Currency::Jpy),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

// ============================================================================
// Parse: Client -> Internal (String/Decimal -> u64)
// ============================================================================

/// Convert a client amount string to internal u64 minor units.
///
/// # Errors
/// * `PrecisionOverflow` - input has more decimal places than the currency
/// * `InvalidAmount` - amount is zero or signed
/// * `Overflow` - result would overflow u64
/// * `InvalidFormat` - string format is invalid (".5", "5.", "1.2.3", ...)
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<u64, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            // Strict check: both sides of the dot must be non-empty.
            // Rejects ambiguous formats like ".5" or "5."
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            if decimals == 0 {
                return Err(MoneyError::InvalidFormat(
                    "currency has no minor unit, but dot provided".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    // Precision validation: REJECT if too many decimals (no silent truncation)
    if frac.len() > decimals as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: decimals,
        });
    }

    let whole_num: u64 = whole.parse::<u64>().map_err(|e| {
        let err_str = e.to_string();
        if err_str.contains("too large") || err_str.contains("overflow") {
            MoneyError::Overflow
        } else {
            MoneyError::InvalidFormat(format!("invalid character in whole part: {}", whole))
        }
    })?;

    let frac_num: u64 = if decimals == 0 || frac.is_empty() {
        0
    } else {
        let frac_padded = format!("{:0<width$}", frac, width = decimals as usize);
        frac_padded[..decimals as usize]
            .parse::<u64>()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    let multiplier = 10u64.pow(decimals);
    let amount = whole_num
        .checked_mul(multiplier)
        .and_then(|v: u64| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)?;

    if amount == 0 {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(amount)
}

/// Parse an amount string in the given currency's minor units
pub fn parse_currency_amount(amount_str: &str, currency: Currency) -> Result<u64, MoneyError> {
    parse_amount(amount_str, currency.decimals())
}

/// Convert a Decimal to internal u64 minor units.
///
/// Used at the gateway boundary where `rust_decimal::Decimal` carries
/// JSON numbers.
pub fn parse_decimal(decimal: Decimal, decimals: u32) -> Result<u64, MoneyError> {
    if decimal.is_sign_negative() {
        return Err(MoneyError::InvalidAmount);
    }

    if decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    if decimal.scale() > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: decimal.scale(),
            max: decimals,
        });
    }

    let multiplier = Decimal::from(10u64.pow(decimals));
    let result = decimal * multiplier;

    // Should not have fractional part after scaling
    if !result.fract().is_zero() {
        return Err(MoneyError::PrecisionOverflow {
            provided: decimal.scale(),
            max: decimals,
        });
    }

    result.to_u64().ok_or(MoneyError::Overflow)
}

// ============================================================================
// Format: Internal -> Client (u64 -> String)
// ============================================================================

/// Convert internal u64 minor units to a display string
pub fn format_amount(value: u64, decimals: u32, display_decimals: u32) -> String {
    let decimal_value = Decimal::from(value) / Decimal::from(10u64.pow(decimals));
    format!("{:.prec$}", decimal_value, prec = display_decimals as usize)
}

/// Full-precision string for storage and API payloads
pub fn format_amount_full(value: u64, decimals: u32) -> String {
    format_amount(value, decimals, decimals)
}

/// Full-precision string in the given currency
pub fn format_currency_amount(value: u64, currency: Currency) -> String {
    format_amount_full(value, currency.decimals())
}

/// Signed variant for balance deltas
pub fn format_amount_signed(value: i64, decimals: u32, display_decimals: u32) -> String {
    let abs_value = value.unsigned_abs();
    let formatted = format_amount(abs_value, decimals, display_decimals);
    if value < 0 {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
