//! Escrow State Definitions
//!
//! State IDs are stored in PostgreSQL as SMALLINT.

use std::fmt;

/// Escrow states
///
/// PENDING is the only entry state. RELEASED and REFUNDED are terminal
/// and mutually exclusive: the held amount is paid out exactly once.
/// DISPUTED is a side branch from PENDING that can only be exited by an
/// administrative resolution into one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EscrowState {
    /// Funds held, awaiting release, refund or dispute
    Pending = 0,

    /// Terminal: held amount paid to receiver (minus commission)
    Released = 10,

    /// Terminal: held amount returned to payer
    Refunded = 20,

    /// Frozen pending administrative resolution; auto-release skips it
    Disputed = 30,
}

impl EscrowState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::Refunded)
    }

    /// Legal state machine edges
    pub fn can_transition_to(&self, next: EscrowState) -> bool {
        matches!(
            (self, next),
            (EscrowState::Pending, EscrowState::Released)
                | (EscrowState::Pending, EscrowState::Refunded)
                | (EscrowState::Pending, EscrowState::Disputed)
                | (EscrowState::Disputed, EscrowState::Released)
                | (EscrowState::Disputed, EscrowState::Refunded)
        )
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(EscrowState::Pending),
            10 => Some(EscrowState::Released),
            20 => Some(EscrowState::Refunded),
            30 => Some(EscrowState::Disputed),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Pending => "PENDING",
            EscrowState::Released => "RELEASED",
            EscrowState::Refunded => "REFUNDED",
            EscrowState::Disputed => "DISPUTED",
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for EscrowState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        EscrowState::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(EscrowState::Released.is_terminal());
        assert!(EscrowState::Refunded.is_terminal());

        assert!(!EscrowState::Pending.is_terminal());
        assert!(!EscrowState::Disputed.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(EscrowState::Pending.can_transition_to(EscrowState::Released));
        assert!(EscrowState::Pending.can_transition_to(EscrowState::Refunded));
        assert!(EscrowState::Pending.can_transition_to(EscrowState::Disputed));
        assert!(EscrowState::Disputed.can_transition_to(EscrowState::Released));
        assert!(EscrowState::Disputed.can_transition_to(EscrowState::Refunded));
    }

    #[test]
    fn test_illegal_transitions() {
        // Terminal states never move again
        assert!(!EscrowState::Released.can_transition_to(EscrowState::Refunded));
        assert!(!EscrowState::Refunded.can_transition_to(EscrowState::Released));
        assert!(!EscrowState::Released.can_transition_to(EscrowState::Pending));

        // A dispute cannot be re-disputed or un-disputed without resolution
        assert!(!EscrowState::Disputed.can_transition_to(EscrowState::Disputed));
        assert!(!EscrowState::Disputed.can_transition_to(EscrowState::Pending));
    }

    #[test]
    fn test_state_id_roundtrip() {
        let states = [
            EscrowState::Pending,
            EscrowState::Released,
            EscrowState::Refunded,
            EscrowState::Disputed,
        ];

        for state in states {
            let id = state.id();
            let recovered = EscrowState::from_id(id).unwrap();
            assert_eq!(state, recovered);
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(EscrowState::from_id(999).is_none());
        assert!(EscrowState::from_id(-1).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(EscrowState::Pending.to_string(), "PENDING");
        assert_eq!(EscrowState::Released.to_string(), "RELEASED");
        assert_eq!(EscrowState::Disputed.to_string(), "DISPUTED");
    }
}
