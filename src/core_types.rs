//! Core types used throughout the engine
//!
//! Fundamental identifiers shared by all modules. Entity ids are ULID
//! newtypes: sortable, 128-bit, generated without coordination, stored
//! as their canonical 26-char string in PostgreSQL.

use std::fmt;
use std::str::FromStr;

/// Owner ID - the platform-level account that owns wallets.
///
/// Assigned by the surrounding application; immutable after assignment.
/// One wallet exists per (owner, currency) pair.
pub type OwnerId = u64;

/// Reserved owner of the platform revenue wallets.
///
/// Fees and escrow commissions are credited to a real wallet under this
/// owner (one per currency, created lazily), so summing deltas over the
/// whole wallet set is always zero.
pub const PLATFORM_OWNER_ID: OwnerId = 0;

/// External order reference attached to an escrow (caller-supplied).
pub type OrderRef = uuid::Uuid;

macro_rules! ulid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique id
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

ulid_id! {
    /// Wallet primary key
    WalletId
}

ulid_id! {
    /// Ledger entry primary key
    EntryId
}

ulid_id! {
    /// Escrow primary key
    EscrowId
}

ulid_id! {
    /// Dispute primary key
    DisputeId
}

ulid_id! {
    /// Fraud audit record primary key
    AuditId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_via_string() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_sortable_by_creation() {
        let a = EscrowId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = EscrowId::new();
        assert!(a < b, "later ULID must sort after earlier one");
    }

    #[test]
    fn test_invalid_id_string_rejected() {
        assert!("not-a-ulid".parse::<WalletId>().is_err());
    }
}
