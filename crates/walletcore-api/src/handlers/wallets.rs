//! Wallet handlers
//!
//! The five wallet operations plus the history and statement readers.
//! Handlers decode the wire contract, derive identity, and hand off to the
//! wallet service; no business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use walletcore_engine::Transaction;
use walletcore_wallet::{
    ChannelLeg, CreditWallet, DebitWallet, LienWallet, ReleaseLien, StatementPage,
};

use crate::dto::{
    CreateWalletRequest, CreateWalletResponse, CreditRequest, DebitRequest, HistoryQuery,
    LienRequest, MovementResponse, ReleaseLienRequest,
};
use crate::error::ApiResult;
use crate::handlers::idempotency_key;
use crate::state::AppState;

/// Derive a wallet for a user and currency. Purely derivational: no ledger
/// write happens and the call is idempotent by construction.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/wallets",
    tag = "Wallets",
    params(("ledger" = String, Path, description = "User ledger name")),
    request_body = CreateWalletRequest,
    responses(
        (status = 201, description = "Wallet identity derived", body = CreateWalletResponse),
        (status = 400, description = "Validation failure or unsupported currency")
    )
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    Path(_ledger): Path<String>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<(StatusCode, Json<CreateWalletResponse>)> {
    let handle = state.wallets.create_wallet(&req.user_id, &req.currency)?;
    Ok((StatusCode::CREATED, Json(handle.into())))
}

/// Credit a wallet from the system control account.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/wallets/{walletID}/credit",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replay-safety key")
    ),
    request_body = CreditRequest,
    responses(
        (status = 201, description = "Transaction committed"),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Reference or idempotency-key conflict")
    )
)]
pub async fn credit_wallet(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreditRequest>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let executed = state
        .wallets
        .credit(
            &ledger,
            CreditWallet {
                wallet_id,
                amount: req.amount,
                reference: req.reference,
                idempotency_key: idempotency_key(&headers),
                metadata: req.metadata.unwrap_or_default(),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(executed.transaction)))
}

/// Debit a wallet, optionally settling through a payment channel.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/wallets/{walletID}/debit",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replay-safety key")
    ),
    request_body = DebitRequest,
    responses(
        (status = 201, description = "Transaction committed, channel/revenue leg ids in metadata"),
        (status = 400, description = "Validation failure or insufficient funds"),
        (status = 409, description = "Reference or idempotency-key conflict"),
        (status = 500, description = "Partial commit; committed leg ids in details")
    )
)]
pub async fn debit_wallet(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<DebitRequest>,
) -> ApiResult<(StatusCode, Json<MovementResponse>)> {
    let channel = req.channel_id.map(|channel_id| ChannelLeg {
        channel_id,
        amount: req.channel_amount.unwrap_or(0),
    });
    let receipt = state
        .wallets
        .debit(
            &ledger,
            DebitWallet {
                wallet_id,
                amount: req.amount,
                reference: req.reference,
                idempotency_key: idempotency_key(&headers),
                metadata: req.metadata.unwrap_or_default(),
                channel,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// Reserve wallet funds under lien.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/wallets/{walletID}/lien",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replay-safety key")
    ),
    request_body = LienRequest,
    responses(
        (status = 201, description = "Transaction committed"),
        (status = 400, description = "Validation failure or lien exceeds available"),
        (status = 409, description = "Reference or idempotency-key conflict")
    )
)]
pub async fn lien_wallet(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<LienRequest>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let executed = state
        .wallets
        .lien(
            &ledger,
            LienWallet {
                wallet_id,
                amount: req.amount,
                reference: req.reference,
                idempotency_key: idempotency_key(&headers),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(executed.transaction)))
}

/// Release a lien back to the wallet, or pay it out.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/wallets/{walletID}/lien/release",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replay-safety key")
    ),
    request_body = ReleaseLienRequest,
    responses(
        (status = 201, description = "Transaction committed"),
        (status = 400, description = "Validation failure or amount exceeds lien"),
        (status = 409, description = "Reference or idempotency-key conflict"),
        (status = 500, description = "Partial commit; committed leg ids in details")
    )
)]
pub async fn release_lien(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<ReleaseLienRequest>,
) -> ApiResult<(StatusCode, Json<MovementResponse>)> {
    let channel = req.channel_id.map(|channel_id| ChannelLeg {
        channel_id,
        amount: req.channel_amount.unwrap_or(0),
    });
    let receipt = state
        .wallets
        .release_lien(
            &ledger,
            ReleaseLien {
                wallet_id,
                amount: req.amount,
                reference: req.reference,
                mode: req.mode.into(),
                idempotency_key: idempotency_key(&headers),
                channel,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// Wallet history, newest first.
#[utoipa::path(
    get,
    path = "/v2/{ledger}/wallets/{walletID}/history",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("reference" = Option<String>, Query, description = "Filter by reference"),
        ("startTime" = Option<String>, Query, description = "Inclusive lower time bound"),
        ("endTime" = Option<String>, Query, description = "Inclusive upper time bound"),
        ("cursor" = Option<String>, Query, description = "Opaque page cursor"),
        ("pageSize" = Option<usize>, Query, description = "Page size, default 15, max 100")
    ),
    responses(
        (status = 200, description = "Projected entries, descending by transaction id"),
        (status = 404, description = "Unknown ledger")
    )
)]
pub async fn wallet_history(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<StatementPage>> {
    let page = state
        .wallets
        .wallet_history(&ledger, &wallet_id, query.into_filter())
        .await?;
    Ok(Json(page))
}

/// Wallet statement: commit order with running balances.
#[utoipa::path(
    get,
    path = "/v2/{ledger}/wallets/{walletID}/statement",
    tag = "Wallets",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("walletID" = String, Path, description = "Wallet id"),
        ("reference" = Option<String>, Query, description = "Filter by reference"),
        ("startTime" = Option<String>, Query, description = "Inclusive lower time bound"),
        ("endTime" = Option<String>, Query, description = "Inclusive upper time bound"),
        ("cursor" = Option<String>, Query, description = "Opaque page cursor"),
        ("pageSize" = Option<usize>, Query, description = "Page size, default 15, max 100")
    ),
    responses(
        (status = 200, description = "Projected entries, ascending by transaction id"),
        (status = 404, description = "Unknown ledger")
    )
)]
pub async fn wallet_statement(
    State(state): State<Arc<AppState>>,
    Path((ledger, wallet_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<StatementPage>> {
    let page = state
        .wallets
        .wallet_statement(&ledger, &wallet_id, query.into_filter())
        .await?;
    Ok(Json(page))
}
