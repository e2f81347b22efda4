/// ENFORCED BALANCE TYPE - Used by the ledger stores
///
/// This is the SINGLE source of truth for wallet balance arithmetic.
/// ALL balance mutations MUST go through these methods.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. All mutations return Result - errors are explicit
/// 3. Version auto-increments - optimistic concurrency + audit trail
/// 4. checked_add/sub - overflow protection
use serde::{Deserialize, Serialize};

/// Balance of a single wallet.
///
/// # Invariants (ENFORCED by private fields):
/// - avail >= 0 and held >= 0 at all times (u64 + validated subtraction)
/// - avail + held = total funds in the wallet (never negative)
/// - version increments on every mutation
/// - No overflow/underflow (checked arithmetic)
///
/// `held` is the escrow sub-balance: money that left the spendable side
/// at escrow initiation and is paid out (or refunded) exactly once.
///
/// # Usage:
/// ```ignore
/// let mut bal = WalletBalance::default();
/// bal.credit(1000)?;       // avail = 1000
/// bal.hold(600)?;          // avail = 400, held = 600
/// bal.spend_held(600)?;    // held = 0 (paid out to another wallet)
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBalance {
    avail: u64,   // PRIVATE - ONLY modified through credit/debit/hold/release
    held: u64,    // PRIVATE - ONLY modified through hold/spend_held/refund_held
    version: u64, // PRIVATE - incremented on every mutation
}

impl WalletBalance {
    /// Rehydrate a balance from storage. Callers are the store
    /// implementations only; everything else goes through mutations.
    pub fn from_parts(avail: u64, held: u64, version: u64) -> Self {
        Self {
            avail,
            held,
            version,
        }
    }

    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    /// Spendable balance
    #[inline(always)]
    pub const fn avail(&self) -> u64 {
        self.avail
    }

    /// Escrow-held balance
    #[inline(always)]
    pub const fn held(&self) -> u64 {
        self.held
    }

    /// Total funds (avail + held).
    /// Returns None on overflow, which indicates data corruption.
    #[inline(always)]
    pub const fn total(&self) -> Option<u64> {
        self.avail.checked_add(self.held)
    }

    /// Mutation counter, monotonic per wallet
    #[inline(always)]
    pub const fn version(&self) -> u64 {
        self.version
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Credit funds to the spendable balance
    pub fn credit(&mut self, amount: u64) -> Result<(), &'static str> {
        self.avail = self.avail.checked_add(amount).ok_or("Credit overflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Debit funds from the spendable balance
    ///
    /// # Errors
    /// - "Insufficient funds" if avail < amount
    pub fn debit(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.avail < amount {
            return Err("Insufficient funds");
        }
        self.avail = self.avail.checked_sub(amount).ok_or("Debit underflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Move funds from spendable to the escrow sub-balance
    ///
    /// # Errors
    /// - "Insufficient funds to hold" if avail < amount
    pub fn hold(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.avail < amount {
            return Err("Insufficient funds to hold");
        }
        self.avail = self
            .avail
            .checked_sub(amount)
            .ok_or("Hold avail underflow")?;
        self.held = self.held.checked_add(amount).ok_or("Hold overflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Spend held funds (remove from held without touching avail).
    /// Used at escrow release, when the held money is paid out to the
    /// receiver and platform wallets.
    ///
    /// # Errors
    /// - "Insufficient held funds" if held < amount
    pub fn spend_held(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.held < amount {
            return Err("Insufficient held funds");
        }
        self.held = self
            .held
            .checked_sub(amount)
            .ok_or("Spend held underflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Move held funds back to spendable. Used at escrow refund.
    ///
    /// # Errors
    /// - "Insufficient held funds" if held < amount
    pub fn refund_held(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.held < amount {
            return Err("Insufficient held funds");
        }
        self.held = self
            .held
            .checked_sub(amount)
            .ok_or("Refund held underflow")?;
        self.avail = self
            .avail
            .checked_add(amount)
            .ok_or("Refund avail overflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

}

// ============================================================
// TESTS - Prove enforcement works
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit() {
        let mut bal = WalletBalance::default();
        assert_eq!(bal.avail(), 0);

        bal.credit(100).unwrap();
        assert_eq!(bal.avail(), 100);
        assert_eq!(bal.version(), 1);

        bal.credit(50).unwrap();
        assert_eq!(bal.avail(), 150);
        assert_eq!(bal.version(), 2);
    }

    #[test]
    fn test_credit_overflow() {
        let mut bal = WalletBalance::default();
        bal.credit(u64::MAX).unwrap();

        assert!(bal.credit(1).is_err());
    }

    #[test]
    fn test_debit() {
        let mut bal = WalletBalance::default();
        bal.credit(100).unwrap();

        bal.debit(60).unwrap();
        assert_eq!(bal.avail(), 40);
        assert_eq!(bal.version(), 2);
    }

    #[test]
    fn test_debit_insufficient() {
        let mut bal = WalletBalance::default();
        bal.credit(50).unwrap();

        assert!(bal.debit(100).is_err());
        assert_eq!(bal.avail(), 50); // Unchanged
        assert_eq!(bal.version(), 1); // No bump on failure
    }

    #[test]
    fn test_hold_and_refund() {
        let mut bal = WalletBalance::default();
        bal.credit(100).unwrap();

        bal.hold(60).unwrap();
        assert_eq!(bal.avail(), 40);
        assert_eq!(bal.held(), 60);

        bal.refund_held(20).unwrap();
        assert_eq!(bal.avail(), 60);
        assert_eq!(bal.held(), 40);
    }

    #[test]
    fn test_hold_insufficient() {
        let mut bal = WalletBalance::default();
        bal.credit(50).unwrap();

        assert!(bal.hold(51).is_err());
        assert_eq!(bal.avail(), 50);
        assert_eq!(bal.held(), 0);
    }

    #[test]
    fn test_spend_held() {
        let mut bal = WalletBalance::default();
        bal.credit(100).unwrap();
        bal.hold(60).unwrap();

        bal.spend_held(30).unwrap();
        assert_eq!(bal.held(), 30);
        assert_eq!(bal.avail(), 40); // Unchanged
    }

    #[test]
    fn test_partial_settlement_composes() {
        let mut bal = WalletBalance::default();
        bal.credit(1000).unwrap();
        bal.hold(600).unwrap();

        // 400 leaves the wallet, 200 returns to spendable
        bal.spend_held(400).unwrap();
        bal.refund_held(200).unwrap();
        assert_eq!(bal.held(), 0);
        assert_eq!(bal.avail(), 600);
    }

    #[test]
    fn test_total() {
        let mut bal = WalletBalance::default();
        bal.credit(100).unwrap();
        assert_eq!(bal.total(), Some(100));

        bal.hold(60).unwrap();
        assert_eq!(bal.total(), Some(100)); // Total unchanged by hold

        bal.spend_held(20).unwrap();
        assert_eq!(bal.total(), Some(80)); // Total decreased by payout
    }

    #[test]
    fn test_version_increments_on_every_mutation() {
        let mut bal = WalletBalance::default();
        assert_eq!(bal.version(), 0);

        bal.credit(1000).unwrap();
        assert_eq!(bal.version(), 1);
        bal.hold(500).unwrap();
        assert_eq!(bal.version(), 2);
        bal.spend_held(100).unwrap();
        assert_eq!(bal.version(), 3);
        bal.refund_held(400).unwrap();
        assert_eq!(bal.version(), 4);
        bal.debit(10).unwrap();
        assert_eq!(bal.version(), 5);
    }

    #[test]
    fn test_from_parts_rehydration() {
        let bal = WalletBalance::from_parts(700, 300, 42);
        assert_eq!(bal.avail(), 700);
        assert_eq!(bal.held(), 300);
        assert_eq!(bal.version(), 42);
        assert_eq!(bal.total(), Some(1000));
    }
}
