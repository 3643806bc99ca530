//! Walletcore REST API
//!
//! The wire surface of the wallet wrapper:
//!
//! ```text
//! /v2/{ledger}/
//! ├── /wallets                          - derive a wallet
//! ├── /wallets/{walletID}/credit        - credit from system control
//! ├── /wallets/{walletID}/debit         - debit, optional channel settlement
//! ├── /wallets/{walletID}/lien          - reserve funds
//! ├── /wallets/{walletID}/lien/release  - release or pay out a lien
//! ├── /wallets/{walletID}/history       - entries, newest first
//! ├── /wallets/{walletID}/statement     - entries, commit order
//! ├── /channels                         - provision a channel
//! ├── /channels/{channelID}/credit      - fund a channel
//! ├── /channels/{channelID}             - channel account read
//! └── /channels/{channelID}/history     - channel transactions
//! ```
//!
//! Amounts are integer minor units. The `Idempotency-Key` header is
//! forwarded to the engine for replay safety.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients.
    pub enable_cors: bool,
    /// Enable response compression.
    pub enable_compression: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            enable_compression: true,
            enable_tracing: true,
        }
    }
}

/// Create the main API router with all middleware.
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let mut router = Router::new()
        .nest("/v2", routes::api_v2_routes())
        .route(
            "/health",
            axum::routing::get(handlers::health::health_check),
        )
        .route(
            "/ready",
            axum::routing::get(handlers::health::readiness_check),
        )
        .merge(routes::swagger_routes())
        .with_state(state);

    let x_request_id = HeaderName::from_static("x-request-id");
    router = router
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id));

    if config.enable_tracing {
        router = router.layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        );
    }

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Create a minimal router for testing.
pub fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/v2", routes::api_v2_routes())
        .route(
            "/health",
            axum::routing::get(handlers::health::health_check),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_middleware() {
        let config = ApiConfig::default();
        assert!(config.enable_cors);
        assert!(config.enable_compression);
        assert!(config.enable_tracing);
    }

    #[test]
    fn router_builds() {
        let state = Arc::new(AppState::in_memory());
        let _ = create_router(state, ApiConfig::default());
    }
}
