//! HTTP gateway: axum router, service-token middleware, Swagger UI.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{Next, from_fn_with_state},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;
use types::ApiError;

/// Shared-secret check for `/internal/v1` routes. With no token
/// configured the routes stay dark rather than open.
async fn require_service_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.service_token.as_deref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SWEEP_DISABLED",
            "sweep endpoint requires a configured service token",
        )
    })?;

    let presented = request
        .headers()
        .get("x-service-token")
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        return Err(ApiError::unauthorized("invalid service token"));
    }

    Ok(next.run(request).await)
}

/// Start the HTTP gateway. Runs until the listener fails.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    // ==========================================================================
    // Public Routes
    // ==========================================================================
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Wallets
        .route("/wallet", post(handlers::create_wallet))
        .route("/wallet/{wallet_id}", get(handlers::get_wallet))
        // Transfers
        .route("/transfer", post(handlers::create_transfer))
        .route("/deposit", post(handlers::create_deposit))
        .route("/withdraw", post(handlers::create_withdrawal))
        .route("/entry/{idempotency_key}", get(handlers::get_entry))
        // Escrow
        .route("/escrow", post(handlers::initiate_escrow))
        .route("/escrow/{escrow_id}", get(handlers::get_escrow))
        .route("/escrow/{escrow_id}/release", post(handlers::release_escrow))
        .route("/escrow/{escrow_id}/refund", post(handlers::refund_escrow))
        // Disputes
        .route("/escrow/{escrow_id}/dispute", post(handlers::open_dispute))
        .route("/dispute/{dispute_id}", get(handlers::get_dispute))
        .route("/dispute/{dispute_id}/resolve", post(handlers::resolve_dispute));

    // ==========================================================================
    // Internal Routes (service token required)
    // ==========================================================================
    let internal_routes = Router::new()
        .route("/sweep", post(handlers::run_sweep))
        .layer(from_fn_with_state(state.clone(), require_service_token));

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/internal/v1", internal_routes);

    // [SECURITY] Mock API routes - only compiled when 'mock-api' feature is enabled.
    // Production builds MUST be compiled with `--no-default-features` to exclude this.
    #[cfg(feature = "mock-api")]
    let app = app.nest(
        "/internal/mock",
        Router::new().route("/deposit", post(handlers::mock_deposit)),
    );

    let app = app
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()));

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!(addr = %addr, "gateway listening");
    info!("API docs: http://{}/docs", addr);
    #[cfg(feature = "mock-api")]
    info!("mock API enabled at /internal/mock (disable with --no-default-features)");

    axum::serve(listener, app).await?;
    Ok(())
}
