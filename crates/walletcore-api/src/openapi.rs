//! OpenAPI document

use utoipa::OpenApi;

use crate::dto;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Walletcore API",
        description = "Wallet wrapper over a double-entry ledger engine: \
                       credits, debits, liens, channel settlement, and \
                       statement reconstruction.",
    ),
    paths(
        handlers::wallets::create_wallet,
        handlers::wallets::credit_wallet,
        handlers::wallets::debit_wallet,
        handlers::wallets::lien_wallet,
        handlers::wallets::release_lien,
        handlers::wallets::wallet_history,
        handlers::wallets::wallet_statement,
        handlers::channels::create_channel,
        handlers::channels::credit_channel,
        handlers::channels::get_channel,
        handlers::channels::channel_history,
    ),
    components(schemas(
        dto::CreateWalletRequest,
        dto::CreateWalletResponse,
        dto::CreditRequest,
        dto::DebitRequest,
        dto::LienRequest,
        dto::ReleaseLienRequest,
        dto::ReleaseModeDto,
        dto::CreateChannelRequest,
        dto::CreateChannelResponse,
        dto::CreditChannelRequest,
    )),
    tags(
        (name = "Wallets", description = "Wallet operations and statements"),
        (name = "Channels", description = "Payment channel liquidity")
    )
)]
pub struct ApiDoc;
