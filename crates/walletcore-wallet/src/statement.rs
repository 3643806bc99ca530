//! Statement and history projections
//!
//! Read-only views rebuilt from ledger transactions on every request;
//! there is no cached counter anywhere in the wrapper. History pages
//! descend by transaction id; statements ascend, because running balances
//! only compose forwards. Cursors are opaque base64 tokens keyed on the
//! last-seen id with strict inequality, so pages never duplicate and never
//! gap; statement cursors also carry the running balances so the next page
//! resumes the computation exactly.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use walletcore_engine::{Order, Posting, Transaction, TransactionsQuery};
use walletcore_types::{channel_addr, channels_ledger, WalletId, WORLD};

use crate::error::{WalletError, WalletResult};
use crate::service::WalletService;

pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const MAX_PAGE_SIZE: usize = 100;

/// How a transaction moved money relative to one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Credit,
    Debit,
    Lien,
    ReleaseOnly,
    ReleaseAndDebit,
    /// A posting shape the wrapper does not emit itself.
    Unknown,
}

/// One projected statement or history line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementEntry {
    pub ledger_tx_id: u64,
    pub timestamp: DateTime<Utc>,
    pub reference: String,
    pub operation_type: OperationType,
    pub amount: i64,
    pub currency: String,
    /// Balance fields are present whenever the transaction's post-commit
    /// volumes (or, on statements, the running computation) determine them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lien_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lien_after: Option<i64>,
}

/// Optional filters shared by all read paths.
#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    pub reference: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub page_size: Option<usize>,
}

impl ReadFilter {
    fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// A page of projected entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementPage {
    pub entries: Vec<StatementEntry>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A page of raw transactions (channel history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionListPage {
    pub transactions: Vec<Transaction>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryToken {
    last_id: u64,
}

#[derive(Serialize, Deserialize)]
struct StatementToken {
    last_id: u64,
    available: i64,
    lien: i64,
}

fn encode_token<T: Serialize>(token: &T) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(token).expect("cursor token serializes"))
}

fn decode_token<T: DeserializeOwned>(cursor: &str) -> WalletResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| WalletError::validation("invalid cursor"))?;
    serde_json::from_slice(&bytes).map_err(|_| WalletError::validation("invalid cursor"))
}

impl WalletService {
    /// Wallet history: newest first. Balance fields are filled from each
    /// transaction's own post-commit volumes where it touched the account.
    pub async fn wallet_history(
        &self,
        ledger: &str,
        wallet_id: &str,
        filter: ReadFilter,
    ) -> WalletResult<StatementPage> {
        let (wallet, asset) = self.resolve(wallet_id)?;
        let after_id = match &filter.cursor {
            Some(cursor) => Some(decode_token::<HistoryToken>(cursor)?.last_id),
            None => None,
        };

        let page = self
            .engine
            .list_transactions(ledger, wallet_query(&wallet, &filter, Order::Desc, after_id))
            .await?;

        let entries: Vec<StatementEntry> = page
            .transactions
            .iter()
            .map(|tx| project_history(tx, &wallet, &asset))
            .collect();

        let next_cursor = if page.has_more {
            entries
                .last()
                .map(|entry| encode_token(&HistoryToken { last_id: entry.ledger_tx_id }))
        } else {
            None
        };

        Ok(StatementPage {
            entries,
            has_more: page.has_more,
            next_cursor,
        })
    }

    /// Wallet statement: commit order, with running available/lien balances
    /// threaded through the cursor. Identical parameters always reproduce
    /// the identical sequence.
    pub async fn wallet_statement(
        &self,
        ledger: &str,
        wallet_id: &str,
        filter: ReadFilter,
    ) -> WalletResult<StatementPage> {
        let (wallet, asset) = self.resolve(wallet_id)?;
        let (after_id, mut available, mut lien) = match &filter.cursor {
            Some(cursor) => {
                let token = decode_token::<StatementToken>(cursor)?;
                (Some(token.last_id), token.available, token.lien)
            }
            None => (None, 0, 0),
        };

        let page = self
            .engine
            .list_transactions(ledger, wallet_query(&wallet, &filter, Order::Asc, after_id))
            .await?;

        let entries: Vec<StatementEntry> = page
            .transactions
            .iter()
            .map(|tx| project_statement(tx, &wallet, &asset, &mut available, &mut lien))
            .collect();

        let next_cursor = if page.has_more {
            entries.last().map(|entry| {
                encode_token(&StatementToken {
                    last_id: entry.ledger_tx_id,
                    available,
                    lien,
                })
            })
        } else {
            None
        };

        Ok(StatementPage {
            entries,
            has_more: page.has_more,
            next_cursor,
        })
    }

    /// Channel history: raw transactions for one channel account, newest
    /// first.
    pub async fn channel_history(
        &self,
        channel_id: &str,
        currency: &str,
        filter: ReadFilter,
    ) -> WalletResult<TransactionListPage> {
        self.registry.require(currency)?;
        let after_id = match &filter.cursor {
            Some(cursor) => Some(decode_token::<HistoryToken>(cursor)?.last_id),
            None => None,
        };

        let query = TransactionsQuery {
            accounts: vec![channel_addr(channel_id)],
            reference: filter.reference.clone(),
            start_time: filter.start_time,
            end_time: filter.end_time,
            order: Order::Desc,
            limit: filter.page_size(),
            after_id,
        };
        let page = self
            .engine
            .list_transactions(&channels_ledger(currency), query)
            .await?;

        let next_cursor = if page.has_more {
            page.transactions
                .last()
                .map(|tx| encode_token(&HistoryToken { last_id: tx.id }))
        } else {
            None
        };

        Ok(TransactionListPage {
            transactions: page.transactions,
            has_more: page.has_more,
            next_cursor,
        })
    }
}

fn wallet_query(
    wallet: &WalletId,
    filter: &ReadFilter,
    order: Order,
    after_id: Option<u64>,
) -> TransactionsQuery {
    TransactionsQuery {
        accounts: vec![wallet.available_addr(), wallet.lien_addr()],
        reference: filter.reference.clone(),
        start_time: filter.start_time,
        end_time: filter.end_time,
        order,
        limit: filter.page_size(),
        after_id,
    }
}

/// Classify a posting pair relative to one wallet.
pub fn classify(posting: &Posting, wallet: &WalletId) -> OperationType {
    let available = wallet.available_addr();
    let lien = wallet.lien_addr();
    let control = wallet.system_control_addr();
    let (source, destination) = (posting.source.as_str(), posting.destination.as_str());

    if source == control && destination == available {
        OperationType::Credit
    } else if source == available && destination == control {
        OperationType::Debit
    } else if source == available && destination == lien {
        OperationType::Lien
    } else if source == lien && destination == available {
        OperationType::ReleaseOnly
    } else if source == lien && destination == WORLD {
        OperationType::ReleaseAndDebit
    } else {
        OperationType::Unknown
    }
}

fn project_history(tx: &Transaction, wallet: &WalletId, asset: &str) -> StatementEntry {
    let (operation_type, amount) = match tx.postings.first() {
        Some(posting) => (classify(posting, wallet), posting.amount),
        None => (OperationType::Unknown, 0),
    };

    let available_after = tx
        .volumes_for(&wallet.available_addr(), asset)
        .map(|v| v.balance());
    let lien_after = tx.volumes_for(&wallet.lien_addr(), asset).map(|v| v.balance());

    // The transaction's own effect determines the pre-commit balance of any
    // account it touched.
    let (balance_before, lien_before) = match operation_type {
        OperationType::Credit => (available_after.map(|b| b - amount), None),
        OperationType::Debit => (available_after.map(|b| b + amount), None),
        OperationType::Lien => (
            available_after.map(|b| b + amount),
            lien_after.map(|b| b - amount),
        ),
        OperationType::ReleaseOnly => (
            available_after.map(|b| b - amount),
            lien_after.map(|b| b + amount),
        ),
        OperationType::ReleaseAndDebit => (None, lien_after.map(|b| b + amount)),
        OperationType::Unknown => (None, None),
    };

    StatementEntry {
        ledger_tx_id: tx.id,
        timestamp: tx.timestamp,
        reference: tx.reference.clone(),
        operation_type,
        amount,
        currency: wallet.currency.clone(),
        balance_before,
        balance_after: available_after,
        lien_before,
        lien_after,
    }
}

fn project_statement(
    tx: &Transaction,
    wallet: &WalletId,
    asset: &str,
    available: &mut i64,
    lien: &mut i64,
) -> StatementEntry {
    let (operation_type, amount) = match tx.postings.first() {
        Some(posting) => (classify(posting, wallet), posting.amount),
        None => (OperationType::Unknown, 0),
    };

    let balance_before = *available;
    let lien_before = *lien;
    // Post-commit volumes are authoritative for every account the
    // transaction touched; untouched accounts carry forward.
    let balance_after = tx
        .volumes_for(&wallet.available_addr(), asset)
        .map(|v| v.balance())
        .unwrap_or(balance_before);
    let lien_after = tx
        .volumes_for(&wallet.lien_addr(), asset)
        .map(|v| v.balance())
        .unwrap_or(lien_before);

    *available = balance_after;
    *lien = lien_after;

    StatementEntry {
        ledger_tx_id: tx.id,
        timestamp: tx.timestamp,
        reference: tx.reference.clone(),
        operation_type,
        amount,
        currency: wallet.currency.clone(),
        balance_before: Some(balance_before),
        balance_after: Some(balance_after),
        lien_before: Some(lien_before),
        lien_after: Some(lien_after),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletId {
        WalletId::derive("u1", "USD")
    }

    fn posting(source: &str, destination: &str) -> Posting {
        Posting {
            source: source.into(),
            destination: destination.into(),
            asset: "USD/2".into(),
            amount: 10,
        }
    }

    #[test]
    fn classification_table() {
        let w = wallet();
        let available = w.available_addr();
        let lien = w.lien_addr();
        let control = w.system_control_addr();

        assert_eq!(classify(&posting(&control, &available), &w), OperationType::Credit);
        assert_eq!(classify(&posting(&available, &control), &w), OperationType::Debit);
        assert_eq!(classify(&posting(&available, &lien), &w), OperationType::Lien);
        assert_eq!(classify(&posting(&lien, &available), &w), OperationType::ReleaseOnly);
        assert_eq!(classify(&posting(&lien, WORLD), &w), OperationType::ReleaseAndDebit);
        assert_eq!(classify(&posting(WORLD, &available), &w), OperationType::Unknown);
    }

    #[test]
    fn operation_type_wire_names() {
        let json = serde_json::to_string(&OperationType::ReleaseAndDebit).unwrap();
        assert_eq!(json, "\"release_and_debit\"");
        let json = serde_json::to_string(&OperationType::ReleaseOnly).unwrap();
        assert_eq!(json, "\"release_only\"");
    }

    #[test]
    fn cursor_tokens_round_trip() {
        let token = StatementToken {
            last_id: 42,
            available: 700,
            lien: 30,
        };
        let encoded = encode_token(&token);
        let decoded: StatementToken = decode_token(&encoded).unwrap();
        assert_eq!(decoded.last_id, 42);
        assert_eq!(decoded.available, 700);
        assert_eq!(decoded.lien, 30);
    }

    #[test]
    fn garbage_cursor_is_a_validation_error() {
        let err = decode_token::<HistoryToken>("not-base64!!").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn page_size_clamped() {
        let filter = ReadFilter {
            page_size: Some(5000),
            ..ReadFilter::default()
        };
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);
        assert_eq!(ReadFilter::default().page_size(), DEFAULT_PAGE_SIZE);
    }
}
