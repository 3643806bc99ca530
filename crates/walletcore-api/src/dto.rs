//! Request and response DTOs
//!
//! Field names follow the wire contract: camelCase identifiers with `ID`
//! suffixes, amounts as integer minor units.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use walletcore_engine::Posting;
use walletcore_wallet::{MovementReceipt, ReleaseMode, WalletHandle};

/// `POST /v2/{ledger}/wallets`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateWalletResponse {
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub currency: String,
}

impl From<WalletHandle> for CreateWalletResponse {
    fn from(handle: WalletHandle) -> Self {
        Self {
            wallet_id: handle.wallet_id,
            user_id: handle.user_id,
            currency: handle.currency,
        }
    }
}

/// `POST /v2/{ledger}/wallets/{walletID}/credit`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreditRequest {
    pub amount: i64,
    pub reference: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// `POST /v2/{ledger}/wallets/{walletID}/debit`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DebitRequest {
    pub amount: i64,
    pub reference: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(rename = "channelID")]
    pub channel_id: Option<String>,
    #[serde(rename = "channelAmount")]
    pub channel_amount: Option<i64>,
}

/// `POST /v2/{ledger}/wallets/{walletID}/lien`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LienRequest {
    pub amount: i64,
    pub reference: String,
}

/// Release disposition on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub enum ReleaseModeDto {
    #[serde(rename = "RELEASE_ONLY")]
    ReleaseOnly,
    #[serde(rename = "PAY")]
    Pay,
}

impl From<ReleaseModeDto> for ReleaseMode {
    fn from(mode: ReleaseModeDto) -> Self {
        match mode {
            ReleaseModeDto::ReleaseOnly => ReleaseMode::ReleaseOnly,
            ReleaseModeDto::Pay => ReleaseMode::Pay,
        }
    }
}

/// `POST /v2/{ledger}/wallets/{walletID}/lien/release`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReleaseLienRequest {
    pub amount: i64,
    pub reference: String,
    pub mode: ReleaseModeDto,
    #[serde(rename = "channelID")]
    pub channel_id: Option<String>,
    #[serde(rename = "channelAmount")]
    pub channel_amount: Option<i64>,
}

/// Movement response body: the committed wallet transaction plus link
/// metadata for any channel and revenue legs.
#[derive(Debug, Clone, Serialize)]
pub struct MovementData {
    pub txid: u64,
    pub timestamp: DateTime<Utc>,
    pub postings: Vec<Posting>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementResponse {
    pub data: MovementData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<MovementReceipt> for MovementResponse {
    fn from(receipt: MovementReceipt) -> Self {
        // link ids merge over the transaction's own metadata
        let mut metadata = receipt.transaction.metadata.clone();
        metadata.extend(receipt.links.to_metadata());
        Self {
            data: MovementData {
                txid: receipt.transaction.id,
                timestamp: receipt.transaction.timestamp,
                postings: receipt.transaction.postings,
                metadata,
            },
            warning: receipt.warning,
        }
    }
}

/// Query parameters shared by the history and statement endpoints.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct HistoryQuery {
    pub reference: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<usize>,
}

impl HistoryQuery {
    pub fn into_filter(self) -> walletcore_wallet::ReadFilter {
        walletcore_wallet::ReadFilter {
            reference: self.reference,
            start_time: self.start_time,
            end_time: self.end_time,
            cursor: self.cursor,
            page_size: self.page_size,
        }
    }
}

/// `POST /v2/{ledger}/channels`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateChannelRequest {
    pub currency: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateChannelResponse {
    pub channel_id: String,
    pub currency: String,
    pub ledger: String,
}

/// `POST /v2/{ledger}/channels/{channelID}/credit`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreditChannelRequest {
    pub amount: i64,
    pub currency: String,
    pub reference: String,
}

/// `?currency=` on channel reads.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChannelCurrencyQuery {
    pub currency: String,
}

/// Channel history query: currency plus the shared pagination filters.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChannelHistoryQuery {
    pub currency: String,
    pub reference: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<usize>,
}

impl ChannelHistoryQuery {
    pub fn into_filter(self) -> (String, walletcore_wallet::ReadFilter) {
        (
            self.currency,
            walletcore_wallet::ReadFilter {
                reference: self.reference,
                start_time: self.start_time,
                end_time: self.end_time,
                cursor: self.cursor,
                page_size: self.page_size,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let req: CreateWalletRequest =
            serde_json::from_str(r#"{"userID":"u1","currency":"USD"}"#).unwrap();
        assert_eq!(req.user_id, "u1");

        let req: DebitRequest = serde_json::from_str(
            r#"{"amount":100,"reference":"d1","channelID":"c1","channelAmount":80}"#,
        )
        .unwrap();
        assert_eq!(req.channel_id.as_deref(), Some("c1"));
        assert_eq!(req.channel_amount, Some(80));
    }

    #[test]
    fn release_mode_wire_values() {
        let req: ReleaseLienRequest = serde_json::from_str(
            r#"{"amount":10,"reference":"r1","mode":"RELEASE_ONLY"}"#,
        )
        .unwrap();
        assert_eq!(req.mode, ReleaseModeDto::ReleaseOnly);

        let req: ReleaseLienRequest =
            serde_json::from_str(r#"{"amount":10,"reference":"r1","mode":"PAY"}"#).unwrap();
        assert_eq!(req.mode, ReleaseModeDto::Pay);

        assert!(serde_json::from_str::<ReleaseLienRequest>(
            r#"{"amount":10,"reference":"r1","mode":"CANCEL"}"#
        )
        .is_err());
    }
}
