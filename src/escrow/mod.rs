//! Escrow: hold funds for an order until release, refund, or an
//! administrative dispute resolution, with a sweeper auto-releasing
//! matured holds.

pub mod manager;
pub mod models;
pub mod state;
pub mod sweeper;

pub use manager::{
    EscrowManager, EscrowOutcome, EscrowPolicy, InitiateEscrowRequest, OpenDisputeRequest,
    ResolveDisputeRequest,
};
pub use models::{
    Dispute, DisputeOutcome, DisputeResolution, DisputeStatus, DisputeType, Escrow,
};
pub use state::EscrowState;
pub use sweeper::{SweepItem, SweepReport, SweepStatus, Sweeper, SweeperConfig};
