//! Exchange-rate snapshot table.
//!
//! Rates are injected configuration, not live market data: the engine
//! never fetches them mid-transaction. Fee computation reads one rate
//! from this table and the rate used is persisted on the ledger entry,
//! so an entry can always be explained after the fact.

use dashmap::DashMap;
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::money::Currency;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("No exchange rate available for {from}->{to}")]
    Unavailable { from: Currency, to: Currency },

    #[error("Conversion overflow")]
    Overflow,
}

/// Thread-safe snapshot of currency-pair rates.
///
/// A rate maps one major unit of `from` to major units of `to`.
/// Identity pairs are implicit and always available.
pub struct RateTable {
    rates: DashMap<(Currency, Currency), Decimal>,
}

impl RateTable {
    /// Create an empty table (identity conversions only)
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
        }
    }

    /// Install or replace the rate for a pair
    pub fn set(&self, from: Currency, to: Currency, rate: Decimal) {
        self.rates.insert((from, to), rate);
    }

    /// Rate for a pair, identity included
    pub fn get(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.rates.get(&(from, to)).map(|r| *r)
    }

    /// Number of installed pairs
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Convert `amount` minor units of `from` into minor units of `to`,
    /// rounding half up at the target's smallest unit.
    ///
    /// Returns the converted amount together with the rate used, so the
    /// caller can persist the rate alongside the result.
    pub fn convert(
        &self,
        amount: u64,
        from: Currency,
        to: Currency,
    ) -> Result<(u64, Decimal), RateError> {
        let rate = self
            .get(from, to)
            .ok_or(RateError::Unavailable { from, to })?;
        if from == to {
            return Ok((amount, rate));
        }

        let from_scale = Decimal::from(10u64.pow(from.decimals()));
        let to_scale = Decimal::from(10u64.pow(to.decimals()));

        let major = Decimal::from(amount) / from_scale;
        let converted_minor = (major * rate * to_scale)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        let value = converted_minor.to_u64().ok_or(RateError::Overflow)?;
        Ok((value, rate))
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_identity_rate_always_available() {
        let table = RateTable::new();
        assert_eq!(table.get(Currency::Gnf, Currency::Gnf), Some(Decimal::ONE));

        let (v, rate) = table.convert(8_000, Currency::Gnf, Currency::Gnf).unwrap();
        assert_eq!(v, 8_000);
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn test_missing_pair() {
        let table = RateTable::new();
        assert!(table.get(Currency::Usd, Currency::Gnf).is_none());
        assert!(matches!(
            table.convert(100, Currency::Usd, Currency::Gnf),
            Err(RateError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_convert_across_exponents() {
        let table = RateTable::new();
        // 1 USD = 8650 GNF
        table.set(Currency::Usd, Currency::Gnf, dec("8650"));

        // $12.50 -> 108125 GNF
        let (v, rate) = table.convert(1_250, Currency::Usd, Currency::Gnf).unwrap();
        assert_eq!(v, 108_125);
        assert_eq!(rate, dec("8650"));

        // Reverse direction needs its own pair
        table.set(Currency::Gnf, Currency::Usd, dec("0.000115"));
        let (v, _) = table.convert(8_000, Currency::Gnf, Currency::Usd).unwrap();
        assert_eq!(v, 92); // 0.92 USD in cents
    }

    #[test]
    fn test_convert_rounds_half_up() {
        let table = RateTable::new();
        table.set(Currency::Jpy, Currency::Gnf, dec("1.5"));

        let (v, _) = table.convert(1, Currency::Jpy, Currency::Gnf).unwrap();
        assert_eq!(v, 2); // 1.5 rounds up
        let (v, _) = table.convert(3, Currency::Jpy, Currency::Gnf).unwrap();
        assert_eq!(v, 5); // 4.5 rounds up
        let (v, _) = table.convert(2, Currency::Jpy, Currency::Gnf).unwrap();
        assert_eq!(v, 3); // exact
    }

    #[test]
    fn test_replace_rate() {
        let table = RateTable::new();
        table.set(Currency::Usd, Currency::Eur, dec("0.92"));
        table.set(Currency::Usd, Currency::Eur, dec("0.95"));
        assert_eq!(table.get(Currency::Usd, Currency::Eur), Some(dec("0.95")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_convert_overflow() {
        let table = RateTable::new();
        table.set(Currency::Gnf, Currency::Gnf, Decimal::ONE);
        table.set(Currency::Jpy, Currency::Gnf, dec("99999999999999"));
        assert!(matches!(
            table.convert(u64::MAX, Currency::Jpy, Currency::Gnf),
            Err(RateError::Overflow)
        ));
    }
}
