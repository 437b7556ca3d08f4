//! HTTP API for the digital wallet server.
//!
//! # Modules
//!
//! - [`wallets`]: Balance, withdrawal and transaction history handlers
//! - [`request_id`]: Correlation ID middleware and extractor
//! - [`response`]: Success and error envelopes, error to status mapping
//!
//! # Endpoints Overview
//!
//! - `GET  /health` - Server health status
//! - `GET  /api/v1/wallet/balance/{user_id}` - Wallet balance (creates the wallet on first use)
//! - `POST /api/v1/wallet/withdraw` - Withdraw funds
//! - `GET  /api/v1/wallet/{user_id}/transactions` - Transaction history
//! - `GET  /api/v1/wallet/{user_id}/transactions/{transaction_id}` - Single transaction
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use digital_wallet::db::MemoryWalletStore;
//! use digital_wallet::{WalletConfig, WalletManager};
//! use dw_server::api::{AppState, create_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = WalletManager::new(MemoryWalletStore::new(), WalletConfig::default());
//! let state = AppState {
//!     wallet_service: Arc::new(manager),
//! };
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. In production, configure appropriate
//! origins, methods and headers.

pub mod request_id;
pub mod response;
pub mod wallets;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use digital_wallet::WalletService;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; the service sits behind an `Arc` so the handlers do
/// not care which storage backend it runs on.
#[derive(Clone)]
pub struct AppState {
    pub wallet_service: Arc<dyn WalletService>,
}

/// Create the API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                                              - Health check
/// GET  /api/v1/wallet/balance/{user_id}                     - Get balance
/// POST /api/v1/wallet/withdraw                              - Withdraw
/// GET  /api/v1/wallet/{user_id}/transactions                - History (?limit=&offset=)
/// GET  /api/v1/wallet/{user_id}/transactions/{transaction_id} - Get transaction
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/wallet/balance/{user_id}", get(wallets::get_balance))
        .route("/wallet/withdraw", post(wallets::withdraw))
        .route(
            "/wallet/{user_id}/transactions",
            get(wallets::get_transaction_history),
        )
        .route(
            "/wallet/{user_id}/transactions/{transaction_id}",
            get(wallets::get_transaction),
        )
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the backing store answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","store":true,"timestamp":"2025-11-22T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = match state.wallet_service.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            false
        }
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
