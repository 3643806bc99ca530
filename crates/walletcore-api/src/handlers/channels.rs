//! Channel handlers
//!
//! Payment-channel provisioning, funding, and reads. Channels live on the
//! per-currency channel ledger; the currency arrives in the body or as a
//! query parameter because the path does not carry it.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use walletcore_engine::{Account, Transaction};
use walletcore_wallet::TransactionListPage;

use crate::dto::{
    ChannelCurrencyQuery, ChannelHistoryQuery, CreateChannelRequest, CreateChannelResponse,
    CreditChannelRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Provision a channel on the per-currency channel ledger.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/channels",
    tag = "Channels",
    params(("ledger" = String, Path, description = "User ledger name")),
    request_body = CreateChannelRequest,
    responses(
        (status = 201, description = "Channel provisioned", body = CreateChannelResponse),
        (status = 400, description = "Validation failure or unsupported currency")
    )
)]
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Path(_ledger): Path<String>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<(StatusCode, Json<CreateChannelResponse>)> {
    let handle = state
        .wallets
        .create_channel(&req.currency, req.metadata.unwrap_or_default())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateChannelResponse {
            channel_id: handle.channel_id,
            currency: handle.currency,
            ledger: handle.ledger,
        }),
    ))
}

/// Fund a channel from world.
#[utoipa::path(
    post,
    path = "/v2/{ledger}/channels/{channelID}/credit",
    tag = "Channels",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("channelID" = String, Path, description = "Channel id")
    ),
    request_body = CreditChannelRequest,
    responses(
        (status = 201, description = "Transaction committed"),
        (status = 400, description = "Validation failure"),
        (status = 404, description = "Channel ledger does not exist")
    )
)]
pub async fn credit_channel(
    State(state): State<Arc<AppState>>,
    Path((_ledger, channel_id)): Path<(String, String)>,
    Json(req): Json<CreditChannelRequest>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let executed = state
        .wallets
        .credit_channel(&channel_id, &req.currency, req.amount, &req.reference)
        .await?;
    Ok((StatusCode::CREATED, Json(executed.transaction)))
}

/// Read a channel account with volumes.
#[utoipa::path(
    get,
    path = "/v2/{ledger}/channels/{channelID}",
    tag = "Channels",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("channelID" = String, Path, description = "Channel id"),
        ("currency" = String, Query, description = "Channel currency")
    ),
    responses(
        (status = 200, description = "Channel account with volumes"),
        (status = 404, description = "Unknown channel or ledger")
    )
)]
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path((_ledger, channel_id)): Path<(String, String)>,
    Query(query): Query<ChannelCurrencyQuery>,
) -> ApiResult<Json<Account>> {
    let account = state
        .wallets
        .get_channel(&channel_id, &query.currency)
        .await?;
    Ok(Json(account))
}

/// Channel transaction history, newest first.
#[utoipa::path(
    get,
    path = "/v2/{ledger}/channels/{channelID}/history",
    tag = "Channels",
    params(
        ("ledger" = String, Path, description = "User ledger name"),
        ("channelID" = String, Path, description = "Channel id"),
        ("currency" = String, Query, description = "Channel currency"),
        ("startTime" = Option<String>, Query, description = "Inclusive lower time bound"),
        ("endTime" = Option<String>, Query, description = "Inclusive upper time bound"),
        ("cursor" = Option<String>, Query, description = "Opaque page cursor"),
        ("pageSize" = Option<usize>, Query, description = "Page size, default 15, max 100")
    ),
    responses(
        (status = 200, description = "Channel transactions, descending by id"),
        (status = 404, description = "Unknown channel ledger")
    )
)]
pub async fn channel_history(
    State(state): State<Arc<AppState>>,
    Path((_ledger, channel_id)): Path<(String, String)>,
    Query(query): Query<ChannelHistoryQuery>,
) -> ApiResult<Json<TransactionListPage>> {
    let (currency, filter) = query.into_filter();
    let page = state
        .wallets
        .channel_history(&channel_id, &currency, filter)
        .await?;
    Ok(Json(page))
}
