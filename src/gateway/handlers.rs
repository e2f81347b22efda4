//! HTTP handlers. Thin adapters: validate the DTO, convert to the
//! domain request, call the service, map the outcome back to wire form.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, State};
use utoipa::ToSchema;
use validator::Validate;

use super::state::AppState;
use super::types::{
    ApiError, ApiResult, BalanceData, CreateWalletRequest, DepositRequest, DisputeData, EntryData,
    EscrowData, EscrowSettlementData, InitiateEscrowRequest, OpenDisputeRequest,
    RefundEscrowRequest, ResolveDisputeRequest, ScreeningData, SweepData, TransferData,
    TransferRequest, WalletData, WithdrawRequest, ok, parse_wallet_id,
};
use crate::core_types::{DisputeId, EscrowId};
use crate::escrow::{DisputeOutcome, DisputeType};
use crate::transfer::TransferOutcome;

fn parse_escrow_id(s: &str) -> Result<EscrowId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid escrow id: {}", s)))
}

fn parse_dispute_id(s: &str) -> Result<DisputeId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid dispute id: {}", s)))
}

fn transfer_data(outcome: &TransferOutcome) -> TransferData {
    TransferData {
        entries: outcome.entries.iter().map(EntryData::from).collect(),
        replayed: outcome.replayed,
        screening: ScreeningData::from(&outcome.verdict),
        balances: outcome.wallets.iter().map(BalanceData::from).collect(),
    }
}

fn settlement_data(outcome: &crate::escrow::EscrowOutcome) -> EscrowSettlementData {
    EscrowSettlementData {
        escrow: EscrowData::from(&outcome.escrow),
        entries: outcome.entries.iter().map(EntryData::from).collect(),
        replayed: outcome.replayed,
    }
}

// ============================================================================
// System
// ============================================================================

#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service healthy", body = HealthResponse)),
    tag = "System"
)]
pub async fn health_check() -> ApiResult<HealthResponse> {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    ok(HealthResponse { timestamp_ms })
}

// ============================================================================
// Wallets
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/wallet",
    request_body = CreateWalletRequest,
    responses(
        (status = 200, description = "Wallet created", body = WalletData),
        (status = 409, description = "Wallet already exists for this owner and currency")
    ),
    tag = "Wallet"
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<WalletData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let wallet = state.ledger.create_wallet(req.owner_id, req.currency).await?;
    ok(WalletData::from(&wallet))
}

#[utoipa::path(
    get,
    path = "/api/v1/wallet/{wallet_id}",
    params(("wallet_id" = String, Path, description = "Wallet ULID")),
    responses(
        (status = 200, description = "Wallet with balances", body = WalletData),
        (status = 404, description = "Wallet not found")
    ),
    tag = "Wallet"
)]
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<String>,
) -> ApiResult<WalletData> {
    let id = parse_wallet_id(&wallet_id)?;
    let wallet = state.ledger.get_wallet(id).await?;
    ok(WalletData::from(&wallet))
}

// ============================================================================
// Transfers
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer committed, or replayed", body = TransferData),
        (status = 403, description = "Blocked by the fraud screen"),
        (status = 409, description = "Idempotency key reused with a different payload"),
        (status = 422, description = "Insufficient funds, limit breach, or currency mismatch")
    ),
    tag = "Transfer"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<TransferData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state
        .transfers
        .transfer(crate::transfer::TransferRequest {
            idempotency_key: req.idempotency_key,
            from_wallet_id: parse_wallet_id(&req.from_wallet_id)?,
            to_wallet_id: parse_wallet_id(&req.to_wallet_id)?,
            amount: req.amount,
            currency: req.currency,
            role: req.role,
        })
        .await?;
    ok(transfer_data(&outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/deposit",
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Deposit committed, or replayed", body = TransferData),
        (status = 404, description = "Wallet not found")
    ),
    tag = "Transfer"
)]
pub async fn create_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<TransferData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state
        .transfers
        .deposit(crate::transfer::DepositRequest {
            idempotency_key: req.idempotency_key,
            wallet_id: parse_wallet_id(&req.wallet_id)?,
            amount: req.amount,
            currency: req.currency,
        })
        .await?;
    ok(transfer_data(&outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal committed, or replayed", body = TransferData),
        (status = 403, description = "Blocked by the fraud screen"),
        (status = 422, description = "Insufficient funds or limit breach")
    ),
    tag = "Transfer"
)]
pub async fn create_withdrawal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<TransferData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state
        .transfers
        .withdraw(crate::transfer::WithdrawRequest {
            idempotency_key: req.idempotency_key,
            wallet_id: parse_wallet_id(&req.wallet_id)?,
            amount: req.amount,
            currency: req.currency,
            role: req.role,
        })
        .await?;
    ok(transfer_data(&outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/entry/{idempotency_key}",
    params(("idempotency_key" = String, Path, description = "Client idempotency key")),
    responses(
        (status = 200, description = "Committed ledger entry", body = EntryData),
        (status = 404, description = "No entry recorded under this key")
    ),
    tag = "Transfer"
)]
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(idempotency_key): Path<String>,
) -> ApiResult<EntryData> {
    let entry = state
        .ledger
        .get_entry_by_key(&idempotency_key)
        .await?
        .ok_or_else(|| {
            ApiError::from(crate::ledger::LedgerError::EntryNotFound(
                idempotency_key.clone(),
            ))
        })?;
    ok(EntryData::from(&entry))
}

// ============================================================================
// Escrow
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/escrow",
    request_body = InitiateEscrowRequest,
    responses(
        (status = 200, description = "Escrow opened and funds held, or replayed", body = EscrowSettlementData),
        (status = 409, description = "Order already escrowed with a different payload"),
        (status = 422, description = "Insufficient funds or currency mismatch")
    ),
    tag = "Escrow"
)]
pub async fn initiate_escrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitiateEscrowRequest>,
) -> ApiResult<EscrowSettlementData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state
        .escrows
        .initiate(crate::escrow::InitiateEscrowRequest {
            order_id: req.order_id,
            payer_wallet_id: parse_wallet_id(&req.payer_wallet_id)?,
            receiver_wallet_id: parse_wallet_id(&req.receiver_wallet_id)?,
            amount: req.amount,
            currency: req.currency,
            commission_ppm: req.commission_ppm,
        })
        .await?;
    ok(settlement_data(&outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/escrow/{escrow_id}",
    params(("escrow_id" = String, Path, description = "Escrow ULID")),
    responses(
        (status = 200, description = "Escrow record", body = EscrowData),
        (status = 404, description = "Escrow not found")
    ),
    tag = "Escrow"
)]
pub async fn get_escrow(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<String>,
) -> ApiResult<EscrowData> {
    let id = parse_escrow_id(&escrow_id)?;
    let escrow = state.escrows.get_escrow(id).await?;
    ok(EscrowData::from(&escrow))
}

#[utoipa::path(
    post,
    path = "/api/v1/escrow/{escrow_id}/release",
    params(("escrow_id" = String, Path, description = "Escrow ULID")),
    responses(
        (status = 200, description = "Funds released to the receiver, or replayed", body = EscrowSettlementData),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is refunded or disputed")
    ),
    tag = "Escrow"
)]
pub async fn release_escrow(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<String>,
) -> ApiResult<EscrowSettlementData> {
    let id = parse_escrow_id(&escrow_id)?;
    let outcome = state.escrows.release(id).await?;
    ok(settlement_data(&outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/escrow/{escrow_id}/refund",
    params(("escrow_id" = String, Path, description = "Escrow ULID")),
    request_body(content = RefundEscrowRequest, description = "Optional; resolver is required for disputed escrows"),
    responses(
        (status = 200, description = "Held funds returned to the payer, or replayed", body = EscrowSettlementData),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is released, or disputed without a resolver")
    ),
    tag = "Escrow"
)]
pub async fn refund_escrow(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<String>,
    body: Option<Json<RefundEscrowRequest>>,
) -> ApiResult<EscrowSettlementData> {
    let id = parse_escrow_id(&escrow_id)?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state.escrows.refund(id, req.resolver.as_deref()).await?;
    ok(settlement_data(&outcome))
}

// ============================================================================
// Disputes
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/escrow/{escrow_id}/dispute",
    params(("escrow_id" = String, Path, description = "Escrow ULID")),
    request_body = OpenDisputeRequest,
    responses(
        (status = 200, description = "Dispute opened, escrow frozen", body = DisputeData),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is not pending")
    ),
    tag = "Dispute"
)]
pub async fn open_dispute(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<String>,
    Json(req): Json<OpenDisputeRequest>,
) -> ApiResult<DisputeData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let id = parse_escrow_id(&escrow_id)?;
    let dispute_type = DisputeType::parse(&req.dispute_type).ok_or_else(|| {
        ApiError::bad_request(format!("unknown dispute type: {}", req.dispute_type))
    })?;
    let dispute = state
        .escrows
        .open_dispute(crate::escrow::OpenDisputeRequest {
            escrow_id: id,
            raised_by: req.raised_by,
            dispute_type,
            description: req.description,
            requested_amount: req.requested_amount,
        })
        .await?;
    ok(DisputeData::from(&dispute))
}

#[utoipa::path(
    get,
    path = "/api/v1/dispute/{dispute_id}",
    params(("dispute_id" = String, Path, description = "Dispute ULID")),
    responses(
        (status = 200, description = "Dispute record", body = DisputeData),
        (status = 404, description = "Dispute not found")
    ),
    tag = "Dispute"
)]
pub async fn get_dispute(
    State(state): State<Arc<AppState>>,
    Path(dispute_id): Path<String>,
) -> ApiResult<DisputeData> {
    let id = parse_dispute_id(&dispute_id)?;
    let dispute = state.escrows.get_dispute(id).await?;
    ok(DisputeData::from(&dispute))
}

#[utoipa::path(
    post,
    path = "/api/v1/dispute/{dispute_id}/resolve",
    params(("dispute_id" = String, Path, description = "Dispute ULID")),
    request_body = ResolveDisputeRequest,
    responses(
        (status = 200, description = "Dispute resolved and escrow settled, or replayed", body = EscrowSettlementData),
        (status = 404, description = "Dispute not found"),
        (status = 409, description = "Already resolved with a different outcome")
    ),
    tag = "Dispute"
)]
pub async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    Path(dispute_id): Path<String>,
    Json(req): Json<ResolveDisputeRequest>,
) -> ApiResult<EscrowSettlementData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let id = parse_dispute_id(&dispute_id)?;
    let outcome = DisputeOutcome::parse(&req.outcome)
        .ok_or_else(|| ApiError::bad_request(format!("unknown outcome: {}", req.outcome)))?;
    let result = state
        .escrows
        .resolve_dispute(crate::escrow::ResolveDisputeRequest {
            dispute_id: id,
            outcome,
            resolver: req.resolver,
        })
        .await?;
    ok(settlement_data(&result))
}

// ============================================================================
// Internal
// ============================================================================

/// One sweep pass over matured escrows, for cron-style callers. Guarded
/// by the service-token middleware.
#[utoipa::path(
    post,
    path = "/internal/v1/sweep",
    responses(
        (status = 200, description = "Sweep report", body = SweepData),
        (status = 401, description = "Missing or invalid service token")
    ),
    security(("service_token" = [])),
    tag = "Internal"
)]
pub async fn run_sweep(State(state): State<Arc<AppState>>) -> ApiResult<SweepData> {
    let report = state.sweeper.sweep_once().await?;
    ok(SweepData::from(&report))
}

/// Funding endpoint for local testing, compiled in only with the
/// `mock-api` feature.
#[cfg(feature = "mock-api")]
pub async fn mock_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<TransferData> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let outcome = state
        .transfers
        .deposit(crate::transfer::DepositRequest {
            idempotency_key: req.idempotency_key,
            wallet_id: parse_wallet_id(&req.wallet_id)?,
            amount: req.amount,
            currency: req.currency,
        })
        .await?;
    ok(transfer_data(&outcome))
}
