//! Gateway request/response types.
//!
//! Request DTOs validate shape at the serde/validator layer; handlers
//! convert them into domain requests. Response DTOs flatten domain
//! records into the wire form, with enum fields as their snake_case
//! names and amounts in minor units.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::core_types::{OwnerId, WalletId};
use crate::escrow::models::{Dispute, Escrow};
use crate::escrow::sweeper::{SweepReport, SweepStatus};
use crate::fee::Role;
use crate::fraud::Verdict;
use crate::ledger::models::{LedgerEntry, Wallet, WalletSnapshot};
use crate::ledger::LedgerError;
use crate::money::Currency;

/// Unified API response wrapper.
///
/// - code: "OK" on success, a stable SCREAMING_SNAKE error code otherwise
/// - msg: short human-readable message
/// - data: payload, present only on success
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = "OK")]
    pub code: String,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: "OK".to_string(),
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

/// Handler error carrying the HTTP status and the stable error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Success shorthand used by every handler
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PARAMETER", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = StatusCode::from_u16(e.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Internal details stay in the log, not the response body
        let msg = match &e {
            LedgerError::Database(_) | LedgerError::Internal(_) => {
                error!(error = %e, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            status,
            code: e.code(),
            msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            code: self.code.to_string(),
            msg: self.msg,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWalletRequest {
    /// Application-level account this wallet belongs to
    #[schema(example = 42)]
    pub owner_id: OwnerId,
    #[schema(value_type = String, example = "GNF")]
    pub currency: Currency,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    /// Client-chosen key; retries with the same key replay the result
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "order-7731-payment")]
    pub idempotency_key: String,
    #[schema(example = "01JG0000000000000000000000")]
    pub from_wallet_id: String,
    pub to_wallet_id: String,
    /// Minor units of `currency`
    #[validate(range(min = 1))]
    #[schema(example = 50_000_u64)]
    pub amount: u64,
    #[schema(value_type = String, example = "GNF")]
    pub currency: Currency,
    /// Fee/limit profile of the sender
    #[serde(default)]
    #[schema(value_type = String, example = "customer")]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DepositRequest {
    #[validate(length(min = 1, max = 64))]
    pub idempotency_key: String,
    pub wallet_id: String,
    #[validate(range(min = 1))]
    pub amount: u64,
    #[schema(value_type = String, example = "GNF")]
    pub currency: Currency,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WithdrawRequest {
    #[validate(length(min = 1, max = 64))]
    pub idempotency_key: String,
    pub wallet_id: String,
    #[validate(range(min = 1))]
    pub amount: u64,
    #[schema(value_type = String, example = "GNF")]
    pub currency: Currency,
    #[serde(default)]
    #[schema(value_type = String, example = "customer")]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct InitiateEscrowRequest {
    /// Caller-supplied order reference; one escrow per order
    pub order_id: Uuid,
    pub payer_wallet_id: String,
    pub receiver_wallet_id: String,
    #[validate(range(min = 1))]
    #[schema(example = 8_000_u64)]
    pub amount: u64,
    #[schema(value_type = String, example = "GNF")]
    pub currency: Currency,
    /// Commission override in 10^6 precision; defaults to policy
    #[serde(default)]
    pub commission_ppm: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct RefundEscrowRequest {
    /// Administrative identity; required when the escrow is disputed
    #[validate(length(min = 1, max = 64))]
    pub resolver: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OpenDisputeRequest {
    /// Owner raising the dispute
    pub raised_by: OwnerId,
    /// not_received | not_as_described | unauthorized | other
    #[schema(value_type = String, example = "not_received")]
    pub dispute_type: String,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    /// For partial resolutions: amount to return to the payer
    #[serde(default)]
    pub requested_amount: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ResolveDisputeRequest {
    /// release | refund | partial
    #[schema(value_type = String, example = "refund")]
    pub outcome: String,
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "ops:amara")]
    pub resolver: String,
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletData {
    #[schema(example = "01JG0000000000000000000000")]
    pub wallet_id: String,
    pub owner_id: OwnerId,
    #[schema(example = "GNF")]
    pub currency: String,
    /// Spendable minor units
    pub avail: u64,
    /// Minor units locked by escrow holds
    pub held: u64,
    pub total: u64,
    #[schema(example = "active")]
    pub status: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Wallet> for WalletData {
    fn from(w: &Wallet) -> Self {
        Self {
            wallet_id: w.id.to_string(),
            owner_id: w.owner_id,
            currency: w.currency.code().to_string(),
            avail: w.balance.avail(),
            held: w.balance.held(),
            total: w.balance.avail().saturating_add(w.balance.held()),
            status: w.status.as_str().to_string(),
            version: w.balance.version(),
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceData {
    pub wallet_id: String,
    pub avail: u64,
    pub held: u64,
    pub version: u64,
}

impl From<&WalletSnapshot> for BalanceData {
    fn from(s: &WalletSnapshot) -> Self {
        Self {
            wallet_id: s.wallet_id.to_string(),
            avail: s.avail,
            held: s.held,
            version: s.version,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EntryData {
    pub entry_id: String,
    pub idempotency_key: String,
    #[schema(example = "transfer")]
    pub entry_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_wallet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_wallet_id: Option<String>,
    pub amount: u64,
    #[schema(example = "GNF")]
    pub currency: String,
    pub percentage_fee: u64,
    pub fixed_fee: u64,
    pub total_fee: u64,
    pub net_amount: u64,
    #[schema(example = "completed")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_amount: Option<u64>,
    /// Exchange rate used for `converted_amount`, as a decimal string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&LedgerEntry> for EntryData {
    fn from(e: &LedgerEntry) -> Self {
        Self {
            entry_id: e.id.to_string(),
            idempotency_key: e.idempotency_key.clone(),
            entry_type: e.entry_type.as_str().to_string(),
            from_wallet_id: e.from_wallet_id.map(|id| id.to_string()),
            to_wallet_id: e.to_wallet_id.map(|id| id.to_string()),
            amount: e.amount,
            currency: e.currency.code().to_string(),
            percentage_fee: e.fee.percentage_fee,
            fixed_fee: e.fee.fixed_fee,
            total_fee: e.fee.total_fee,
            net_amount: e.fee.net_amount,
            status: e.status.as_str().to_string(),
            converted_amount: e.converted_amount,
            exchange_rate: e.exchange_rate.map(|r| r.to_string()),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScreeningData {
    #[schema(example = "allow")]
    pub decision: String,
    /// Names of the tripped rules, empty when clean
    pub rules: Vec<String>,
}

impl From<&Verdict> for ScreeningData {
    fn from(v: &Verdict) -> Self {
        Self {
            decision: v.decision.as_str().to_string(),
            rules: v.hits.iter().map(|h| h.rule.as_str().to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferData {
    pub entries: Vec<EntryData>,
    /// True when this call replayed a previously committed transfer
    pub replayed: bool,
    pub screening: ScreeningData,
    /// Post-commit balances of the touched wallets (empty on replay)
    pub balances: Vec<BalanceData>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowData {
    pub escrow_id: String,
    pub order_id: Uuid,
    pub payer_wallet_id: String,
    pub receiver_wallet_id: String,
    pub amount: u64,
    #[schema(example = "GNF")]
    pub currency: String,
    pub commission_ppm: u64,
    #[schema(example = "pending")]
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub auto_release_deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl From<&Escrow> for EscrowData {
    fn from(e: &Escrow) -> Self {
        Self {
            escrow_id: e.id.to_string(),
            order_id: e.order_id,
            payer_wallet_id: e.payer_wallet_id.to_string(),
            receiver_wallet_id: e.receiver_wallet_id.to_string(),
            amount: e.amount,
            currency: e.currency.code().to_string(),
            commission_ppm: e.commission_ppm,
            state: e.state.as_str().to_string(),
            created_at: e.created_at,
            auto_release_deadline: e.auto_release_deadline,
            released_at: e.released_at,
        }
    }
}

/// Escrow lifecycle step result: the escrow after the step plus the
/// ledger entries the step committed (or replayed).
#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowSettlementData {
    pub escrow: EscrowData,
    pub entries: Vec<EntryData>,
    pub replayed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisputeData {
    pub dispute_id: String,
    pub escrow_id: String,
    pub raised_by: OwnerId,
    #[schema(example = "not_received")]
    pub dispute_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_amount: Option<u64>,
    #[schema(example = "open")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&Dispute> for DisputeData {
    fn from(d: &Dispute) -> Self {
        Self {
            dispute_id: d.id.to_string(),
            escrow_id: d.escrow_id.to_string(),
            raised_by: d.raised_by,
            dispute_type: d.dispute_type.as_str().to_string(),
            description: d.description.clone(),
            requested_amount: d.requested_amount,
            status: d.status.as_str().to_string(),
            outcome: d.outcome.map(|o| o.as_str().to_string()),
            resolver: d.resolver.clone(),
            created_at: d.created_at,
            resolved_at: d.resolved_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepItemData {
    pub escrow_id: String,
    pub order_id: Uuid,
    #[schema(example = "released")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepData {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<SweepItemData>,
}

impl From<&SweepReport> for SweepData {
    fn from(r: &SweepReport) -> Self {
        Self {
            processed: r.processed,
            succeeded: r.succeeded,
            failed: r.failed,
            items: r
                .items
                .iter()
                .map(|i| SweepItemData {
                    escrow_id: i.escrow_id.to_string(),
                    order_id: i.order_id,
                    status: match i.status {
                        SweepStatus::Released => "released",
                        SweepStatus::Replayed => "replayed",
                        SweepStatus::Failed => "failed",
                    }
                    .to_string(),
                    error: i.error.clone(),
                })
                .collect(),
        }
    }
}

/// Parse a ULID path/body parameter into a wallet id
pub fn parse_wallet_id(s: &str) -> Result<WalletId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid wallet id: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_validates_key_length() {
        let req = TransferRequest {
            idempotency_key: String::new(),
            from_wallet_id: "a".to_string(),
            to_wallet_id: "b".to_string(),
            amount: 100,
            currency: Currency::Gnf,
            role: Role::Customer,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_transfer_request_rejects_zero_amount() {
        let json = r#"{
            "idempotency_key": "k1",
            "from_wallet_id": "a",
            "to_wallet_id": "b",
            "amount": 0,
            "currency": "GNF"
        }"#;
        let req: TransferRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.role, Role::Customer);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_transfer_request_rejects_negative_amount_at_serde() {
        let json = r#"{
            "idempotency_key": "k1",
            "from_wallet_id": "a",
            "to_wallet_id": "b",
            "amount": -5,
            "currency": "GNF"
        }"#;
        assert!(serde_json::from_str::<TransferRequest>(json).is_err());
    }

    #[test]
    fn test_dispute_request_description_bounds() {
        let req = OpenDisputeRequest {
            raised_by: 1,
            dispute_type: "not_received".to_string(),
            description: "x".repeat(501),
            requested_amount: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_api_error_serializes_error_envelope() {
        let err: ApiError = LedgerError::InsufficientFunds.into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "INSUFFICIENT_FUNDS");
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err: ApiError = LedgerError::Database("connection reset by peer".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.msg, "internal error");
    }

    #[test]
    fn test_success_envelope_shape() {
        let resp = ApiResponse::success(42u64);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""code":"OK""#));
        assert!(json.contains(r#""data":42"#));
    }
}
