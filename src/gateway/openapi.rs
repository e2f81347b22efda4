//! OpenAPI / Swagger UI documentation.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    BalanceData, CreateWalletRequest, DepositRequest, DisputeData, EntryData, EscrowData,
    EscrowSettlementData, InitiateEscrowRequest, OpenDisputeRequest, RefundEscrowRequest,
    ResolveDisputeRequest, ScreeningData, SweepData, SweepItemData, TransferData, TransferRequest,
    WalletData, WithdrawRequest,
};

/// Shared-secret scheme for the internal sweep endpoint
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "service_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-Service-Token",
                    "Shared secret for internal callers; configured via gateway.service_token",
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PayLock Wallet & Escrow API",
        version = "1.0.0",
        description = "Double-entry wallet ledger with idempotent transfers, fee and commission \
                       splits, fraud screening, and escrow with dispute resolution and auto-release.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        // Public endpoints
        crate::gateway::handlers::health_check,
        // Wallets
        crate::gateway::handlers::create_wallet,
        crate::gateway::handlers::get_wallet,
        // Transfers
        crate::gateway::handlers::create_transfer,
        crate::gateway::handlers::create_deposit,
        crate::gateway::handlers::create_withdrawal,
        crate::gateway::handlers::get_entry,
        // Escrow
        crate::gateway::handlers::initiate_escrow,
        crate::gateway::handlers::get_escrow,
        crate::gateway::handlers::release_escrow,
        crate::gateway::handlers::refund_escrow,
        // Disputes
        crate::gateway::handlers::open_dispute,
        crate::gateway::handlers::get_dispute,
        crate::gateway::handlers::resolve_dispute,
        // Internal
        crate::gateway::handlers::run_sweep,
    ),
    components(
        schemas(
            HealthResponse,
            CreateWalletRequest,
            TransferRequest,
            DepositRequest,
            WithdrawRequest,
            InitiateEscrowRequest,
            RefundEscrowRequest,
            OpenDisputeRequest,
            ResolveDisputeRequest,
            WalletData,
            BalanceData,
            EntryData,
            ScreeningData,
            TransferData,
            EscrowData,
            EscrowSettlementData,
            DisputeData,
            SweepItemData,
            SweepData,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Wallet", description = "Wallet creation and balance queries"),
        (name = "Transfer", description = "Idempotent transfers, deposits, and withdrawals"),
        (name = "Escrow", description = "Escrow holds, releases, and refunds"),
        (name = "Dispute", description = "Dispute intake and administrative resolution"),
        (name = "System", description = "Health checks and system info"),
        (name = "Internal", description = "Service-token guarded maintenance endpoints")
    )
)]
pub struct ApiDoc;
