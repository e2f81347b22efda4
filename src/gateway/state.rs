use std::sync::Arc;

use crate::escrow::{EscrowManager, Sweeper};
use crate::ledger::LedgerStore;
use crate::transfer::TransferService;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub transfers: Arc<TransferService>,
    pub escrows: Arc<EscrowManager>,
    pub sweeper: Arc<Sweeper>,
    /// Direct store access for read-only lookups
    pub ledger: Arc<dyn LedgerStore>,
    /// Shared secret for `/internal/v1/sweep`; None disables the route
    pub service_token: Option<String>,
}

impl AppState {
    pub fn new(
        transfers: Arc<TransferService>,
        escrows: Arc<EscrowManager>,
        sweeper: Arc<Sweeper>,
        ledger: Arc<dyn LedgerStore>,
        service_token: Option<String>,
    ) -> Self {
        Self {
            transfers,
            escrows,
            sweeper,
            ledger,
            service_token,
        }
    }
}
