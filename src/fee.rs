//! Fee & commission calculation
//!
//! All rates use 10^6 precision: 25_000 = 2.5%. Computation is pure:
//! inputs in, breakdown out, no storage access. Rounding is always
//! round half up at the smallest currency unit so neither party is
//! systematically favored.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Currency;
use crate::rates::{RateError, RateTable};

/// Fee rate precision (10^6 = 1,000,000)
pub const FEE_PRECISION: u64 = 1_000_000;

/// Default escrow commission: 2.5%
pub const DEFAULT_ESCROW_COMMISSION_PPM: u64 = 25_000;

#[derive(Debug, Error)]
pub enum FeeError {
    #[error("Fee {fee} exceeds amount {amount}")]
    ExceedsAmount { fee: u64, amount: u64 },

    #[error("Invalid fee rate: {0}")]
    InvalidRate(String),

    #[error(transparent)]
    Rate(#[from] RateError),
}

/// Party role used for rule selection. Supplied by the surrounding
/// application together with the request; the engine never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Vendor,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
            Role::Driver => "driver",
        }
    }
}

/// One amount band of a tiered rule. `up_to` is inclusive, in minor
/// units; `None` marks the open-ended top band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeTier {
    pub up_to: Option<u64>,
    pub rate_ppm: u64,
}

/// Variable component of a fee rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeeKind {
    /// Rate applied to the full amount
    Percentage { rate_ppm: u64 },
    /// Flat charge in the rule's fee currency, regardless of amount
    Fixed { value: u64 },
    /// The whole amount is charged at the rate of the band it falls in
    Tiered { tiers: Vec<FeeTier> },
}

/// Fee rule for one role.
///
/// `fixed_fee`, a `Fixed` kind value, `min_fee` and `max_fee` are minor
/// units of `fee_currency` (the platform's reference currency) and are
/// converted into the settlement currency through the rate snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRule {
    pub kind: FeeKind,
    /// Flat platform fee added on top of the variable component
    #[serde(default)]
    pub fixed_fee: u64,
    #[serde(default)]
    pub fee_currency: Currency,
    /// Lower clamp on the total fee
    #[serde(default)]
    pub min_fee: u64,
    /// Upper clamp on the total fee
    #[serde(default)]
    pub max_fee: Option<u64>,
    /// Amounts below this floor are not charged at all
    #[serde(default)]
    pub min_amount: u64,
}

impl FeeRule {
    /// Zero-fee rule
    pub fn free() -> Self {
        Self {
            kind: FeeKind::Percentage { rate_ppm: 0 },
            fixed_fee: 0,
            fee_currency: Currency::default(),
            min_fee: 0,
            max_fee: None,
            min_amount: 0,
        }
    }

    pub fn percentage(rate_ppm: u64) -> Self {
        Self {
            kind: FeeKind::Percentage { rate_ppm },
            ..Self::free()
        }
    }
}

/// Role -> rule mapping with a fallback default
#[derive(Debug, Clone)]
pub struct FeeTable {
    rules: FxHashMap<Role, FeeRule>,
    default_rule: FeeRule,
}

impl FeeTable {
    pub fn new(default_rule: FeeRule) -> Self {
        Self {
            rules: FxHashMap::default(),
            default_rule,
        }
    }

    pub fn with_rule(mut self, role: Role, rule: FeeRule) -> Self {
        self.rules.insert(role, rule);
        self
    }

    pub fn rule_for(&self, role: Role) -> &FeeRule {
        self.rules.get(&role).unwrap_or(&self.default_rule)
    }
}

impl Default for FeeTable {
    fn default() -> Self {
        // 0.5% customer baseline, 1% vendor, matching the platform's
        // published schedule
        Self::new(FeeRule::percentage(5_000))
            .with_rule(Role::Customer, FeeRule::percentage(5_000))
            .with_rule(Role::Vendor, FeeRule::percentage(10_000))
            .with_rule(Role::Driver, FeeRule::percentage(5_000))
    }
}

/// Computed fee breakdown, all values in the settlement currency's
/// minor units. Persisted verbatim on the ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub percentage_fee: u64,
    pub fixed_fee: u64,
    pub total_fee: u64,
    pub net_amount: u64,
}

impl FeeBreakdown {
    /// Breakdown with no fee at all (net == amount)
    pub fn free(amount: u64) -> Self {
        Self {
            percentage_fee: 0,
            fixed_fee: 0,
            total_fee: 0,
            net_amount: amount,
        }
    }
}

/// Multiply `amount` by a 10^6-precision rate, rounding half up.
///
/// Uses a u128 intermediate so `amount * rate` cannot overflow.
#[inline]
pub fn rate_mul_half_up(amount: u64, rate_ppm: u64) -> u64 {
    let scaled = amount as u128 * rate_ppm as u128 + (FEE_PRECISION as u128 / 2);
    (scaled / FEE_PRECISION as u128) as u64
}

/// Split an amount into (net, commission) at the given rate.
///
/// Used by escrow release: the commission is carved out of the held
/// amount and the receiver gets the rest, so net + commission == amount.
pub fn commission_split(amount: u64, rate_ppm: u64) -> Result<(u64, u64), FeeError> {
    if rate_ppm > FEE_PRECISION {
        return Err(FeeError::InvalidRate(format!(
            "rate {} exceeds 100%",
            rate_ppm
        )));
    }
    let commission = rate_mul_half_up(amount, rate_ppm);
    if commission > amount {
        return Err(FeeError::ExceedsAmount {
            fee: commission,
            amount,
        });
    }
    Ok((amount - commission, commission))
}

/// Convert a human percentage ("2.5") into 10^6-precision rate units
pub fn ppm_from_percent(percent: Decimal) -> Result<u64, FeeError> {
    if percent.is_sign_negative() {
        return Err(FeeError::InvalidRate("negative percent".into()));
    }
    let ppm = percent * Decimal::from(FEE_PRECISION / 100);
    if !ppm.fract().is_zero() {
        return Err(FeeError::InvalidRate(format!(
            "percent {} finer than 10^-4",
            percent
        )));
    }
    ppm.to_u64()
        .ok_or_else(|| FeeError::InvalidRate("percent out of range".into()))
}

/// Render a 10^6-precision rate back as a percentage
pub fn percent_from_ppm(rate_ppm: u64) -> Decimal {
    Decimal::from(rate_ppm) / Decimal::from(FEE_PRECISION / 100)
}

/// Compute the fee breakdown for a transfer of `amount` in `currency`
/// under the given role's rule.
///
/// The net amount is what the receiver is credited; the total fee goes
/// to the platform wallet. Fixed components are converted from the
/// rule's reference currency through the injected rate snapshot.
pub fn compute(
    amount: u64,
    currency: Currency,
    role: Role,
    table: &FeeTable,
    rates: &RateTable,
) -> Result<FeeBreakdown, FeeError> {
    let rule = table.rule_for(role);

    if amount < rule.min_amount {
        return Ok(FeeBreakdown::free(amount));
    }

    let convert = |value: u64| -> Result<u64, FeeError> {
        if value == 0 || rule.fee_currency == currency {
            return Ok(value);
        }
        let (converted, _rate) = rates.convert(value, rule.fee_currency, currency)?;
        Ok(converted)
    };

    let percentage_fee = match &rule.kind {
        FeeKind::Percentage { rate_ppm } => rate_mul_half_up(amount, *rate_ppm),
        FeeKind::Fixed { .. } => 0,
        FeeKind::Tiered { tiers } => {
            let rate = tiers
                .iter()
                .find(|t| t.up_to.is_none_or(|cap| amount <= cap))
                .map(|t| t.rate_ppm)
                .unwrap_or(0);
            rate_mul_half_up(amount, rate)
        }
    };

    let mut fixed_fee = convert(rule.fixed_fee)?;
    if let FeeKind::Fixed { value } = rule.kind {
        fixed_fee = fixed_fee
            .checked_add(convert(value)?)
            .ok_or(RateError::Overflow)?;
    }

    let raw_total = percentage_fee
        .checked_add(fixed_fee)
        .ok_or(RateError::Overflow)?;

    let mut total_fee = raw_total.max(convert(rule.min_fee)?);
    if let Some(max) = rule.max_fee {
        total_fee = total_fee.min(convert(max)?);
    }

    if total_fee > amount {
        return Err(FeeError::ExceedsAmount {
            fee: total_fee,
            amount,
        });
    }

    // Clamping can move the total away from pct + fixed; keep the split
    // explainable by folding the adjustment into the fixed component
    let fixed_fee = total_fee.saturating_sub(percentage_fee.min(total_fee));
    let percentage_fee = percentage_fee.min(total_fee);

    Ok(FeeBreakdown {
        percentage_fee,
        fixed_fee,
        total_fee,
        net_amount: amount - total_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_rate_mul_rounds_half_up() {
        // 10% of 8000 = 800 exactly
        assert_eq!(rate_mul_half_up(8_000, 100_000), 800);
        // 0.5% of 101 = 0.505 -> 1
        assert_eq!(rate_mul_half_up(101, 5_000), 1);
        // 0.5% of 99 = 0.495 -> 0
        assert_eq!(rate_mul_half_up(99, 5_000), 0);
        // 2.5% of 8000 = 200
        assert_eq!(rate_mul_half_up(8_000, 25_000), 200);
    }

    #[test]
    fn test_commission_split_example() {
        // The canonical checkout example: 8000 at 10%
        let (net, commission) = commission_split(8_000, 100_000).unwrap();
        assert_eq!(net, 7_200);
        assert_eq!(commission, 800);
        assert_eq!(net + commission, 8_000);
    }

    #[test]
    fn test_commission_split_default_rate() {
        let (net, commission) = commission_split(10_000, DEFAULT_ESCROW_COMMISSION_PPM).unwrap();
        assert_eq!(commission, 250); // 2.5%
        assert_eq!(net, 9_750);
    }

    #[test]
    fn test_commission_split_conserves_total() {
        for amount in [1u64, 3, 99, 101, 8_000, 1_000_001] {
            for rate in [0u64, 5_000, 25_000, 100_000, 333_333, FEE_PRECISION] {
                let (net, commission) = commission_split(amount, rate).unwrap();
                assert_eq!(net + commission, amount, "amount={} rate={}", amount, rate);
            }
        }
    }

    #[test]
    fn test_commission_split_rejects_rate_over_one() {
        assert!(matches!(
            commission_split(100, FEE_PRECISION + 1),
            Err(FeeError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_percent_conversion() {
        assert_eq!(ppm_from_percent(dec("2.5")).unwrap(), 25_000);
        assert_eq!(ppm_from_percent(dec("10")).unwrap(), 100_000);
        assert_eq!(ppm_from_percent(dec("0.5")).unwrap(), 5_000);
        assert_eq!(ppm_from_percent(dec("100")).unwrap(), FEE_PRECISION);
        // Finer than 10^-4 percent cannot be represented
        assert!(ppm_from_percent(dec("0.00005")).is_err());
        assert!(ppm_from_percent(dec("-1")).is_err());

        assert_eq!(percent_from_ppm(25_000), dec("2.5"));
        assert_eq!(percent_from_ppm(100_000), dec("10"));
    }

    #[test]
    fn test_compute_percentage_rule() {
        let table = FeeTable::default();
        let rates = RateTable::new();

        // Customer pays 0.5% of 10_000 GNF = 50
        let b = compute(10_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.percentage_fee, 50);
        assert_eq!(b.fixed_fee, 0);
        assert_eq!(b.total_fee, 50);
        assert_eq!(b.net_amount, 9_950);

        // Vendor pays 1%
        let b = compute(10_000, Currency::Gnf, Role::Vendor, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 100);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let table = FeeTable::default();
        let rates = RateTable::new();
        let a = compute(123_457, Currency::Gnf, Role::Vendor, &table, &rates).unwrap();
        let b = compute(123_457, Currency::Gnf, Role::Vendor, &table, &rates).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compute_min_amount_floor() {
        let rule = FeeRule {
            min_amount: 1_000,
            ..FeeRule::percentage(100_000)
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new();

        // Below the floor: free
        let b = compute(999, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b, FeeBreakdown::free(999));

        // At the floor: charged
        let b = compute(1_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 100);
    }

    #[test]
    fn test_compute_min_max_clamps() {
        let rule = FeeRule {
            min_fee: 50,
            max_fee: Some(300),
            ..FeeRule::percentage(10_000) // 1%
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new();

        // 1% of 1000 = 10, clamped up to 50
        let b = compute(1_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 50);
        assert_eq!(b.net_amount, 950);

        // 1% of 100_000 = 1000, clamped down to 300
        let b = compute(100_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 300);
        assert_eq!(b.net_amount, 99_700);

        // In between: uncapped
        let b = compute(20_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 200);
    }

    #[test]
    fn test_compute_tiered_rule() {
        let rule = FeeRule {
            kind: FeeKind::Tiered {
                tiers: vec![
                    FeeTier {
                        up_to: Some(10_000),
                        rate_ppm: 20_000, // 2% on small amounts
                    },
                    FeeTier {
                        up_to: Some(100_000),
                        rate_ppm: 10_000, // 1% on medium
                    },
                    FeeTier {
                        up_to: None,
                        rate_ppm: 5_000, // 0.5% above
                    },
                ],
            },
            ..FeeRule::free()
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new();

        let b = compute(5_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 100); // 2%
        let b = compute(50_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 500); // 1%
        let b = compute(1_000_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.total_fee, 5_000); // 0.5%
    }

    #[test]
    fn test_compute_fixed_fee_converted() {
        // Fixed 50 USD cents on top of 1%, settled in GNF at 1 USD = 8650 GNF
        let rule = FeeRule {
            fixed_fee: 50,
            fee_currency: Currency::Usd,
            ..FeeRule::percentage(10_000)
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new();
        rates.set(Currency::Usd, Currency::Gnf, dec("8650"));

        let b = compute(100_000, Currency::Gnf, Role::Customer, &table, &rates).unwrap();
        assert_eq!(b.percentage_fee, 1_000);
        assert_eq!(b.fixed_fee, 4_325); // $0.50 in GNF
        assert_eq!(b.total_fee, 5_325);
        assert_eq!(b.net_amount, 94_675);
    }

    #[test]
    fn test_compute_missing_rate_fails() {
        let rule = FeeRule {
            fixed_fee: 50,
            fee_currency: Currency::Usd,
            ..FeeRule::percentage(10_000)
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new(); // no USD->GNF pair

        assert!(matches!(
            compute(100_000, Currency::Gnf, Role::Customer, &table, &rates),
            Err(FeeError::Rate(RateError::Unavailable { .. }))
        ));
    }

    #[test]
    fn test_compute_fee_exceeding_amount_rejected() {
        let rule = FeeRule {
            min_fee: 500,
            ..FeeRule::percentage(10_000)
        };
        let table = FeeTable::new(rule);
        let rates = RateTable::new();

        assert!(matches!(
            compute(300, Currency::Gnf, Role::Customer, &table, &rates),
            Err(FeeError::ExceedsAmount { fee: 500, amount: 300 })
        ));
    }

    #[test]
    fn test_no_overflow_on_large_amounts() {
        let large_amount: u64 = 10_000_000_000_000_000_000; // 10^19
        assert_eq!(rate_mul_half_up(large_amount, 2_000), 20_000_000_000_000_000);
    }
}
