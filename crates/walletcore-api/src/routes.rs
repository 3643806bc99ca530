//! Route definitions

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// The `/v2` wallet wrapper surface.
pub fn api_v2_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Wallet operations
        .route("/{ledger}/wallets", post(handlers::wallets::create_wallet))
        .route(
            "/{ledger}/wallets/{walletID}/credit",
            post(handlers::wallets::credit_wallet),
        )
        .route(
            "/{ledger}/wallets/{walletID}/debit",
            post(handlers::wallets::debit_wallet),
        )
        .route(
            "/{ledger}/wallets/{walletID}/lien",
            post(handlers::wallets::lien_wallet),
        )
        .route(
            "/{ledger}/wallets/{walletID}/lien/release",
            post(handlers::wallets::release_lien),
        )
        // Wallet reads
        .route(
            "/{ledger}/wallets/{walletID}/history",
            get(handlers::wallets::wallet_history),
        )
        .route(
            "/{ledger}/wallets/{walletID}/statement",
            get(handlers::wallets::wallet_statement),
        )
        // Channels
        .route("/{ledger}/channels", post(handlers::channels::create_channel))
        .route(
            "/{ledger}/channels/{channelID}/credit",
            post(handlers::channels::credit_channel),
        )
        .route(
            "/{ledger}/channels/{channelID}",
            get(handlers::channels::get_channel),
        )
        .route(
            "/{ledger}/channels/{channelID}/history",
            get(handlers::channels::channel_history),
        )
}

/// Swagger UI over the generated OpenAPI document.
pub fn swagger_routes() -> Router<Arc<AppState>> {
    use crate::openapi::ApiDoc;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}
