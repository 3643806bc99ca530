//! Wire types shared by every engine backend

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One committed movement: `amount` of `asset` from `source` to
/// `destination`. Amounts are non-negative integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub source: String,
    pub destination: String,
    pub asset: String,
    pub amount: i64,
}

/// The posting shape a caller asks the engine to execute.
///
/// `source_overdraft` grants the source account permission to go negative;
/// the `world` account always has it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingSpec {
    pub source: String,
    pub destination: String,
    pub asset: String,
    pub amount: i64,
    #[serde(default)]
    pub source_overdraft: bool,
}

impl PostingSpec {
    /// The committed form of this spec.
    pub fn to_posting(&self) -> Posting {
        Posting {
            source: self.source.clone(),
            destination: self.destination.clone(),
            asset: self.asset.clone(),
            amount: self.amount,
        }
    }
}

/// A transaction submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub posting: PostingSpec,
    /// Caller-supplied intent id, unique per ledger when non-empty.
    pub reference: String,
    /// Optional replay-safety key, scoped to the ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TransactionSpec {
    pub fn new(posting: PostingSpec, reference: impl Into<String>) -> Self {
        Self {
            posting,
            reference: reference.into(),
            idempotency_key: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Content hash deciding replay vs conflict for duplicate references and
    /// idempotency keys. Covers the effective posting, reference, and
    /// metadata; the idempotency key itself is excluded so that a retry may
    /// add one.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.posting.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.posting.destination.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.posting.asset.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.posting.amount.to_be_bytes());
        hasher.update([self.posting.source_overdraft as u8]);
        hasher.update(self.reference.as_bytes());
        for (k, v) in &self.metadata {
            hasher.update([0u8]);
            hasher.update(k.as_bytes());
            hasher.update([0u8]);
            hasher.update(v.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Cumulative in/out volume of one asset through one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volumes {
    pub input: i64,
    pub output: i64,
}

impl Volumes {
    /// Signed balance: everything received minus everything sent.
    pub fn balance(&self) -> i64 {
        self.input - self.output
    }
}

/// Post-commit snapshot: account → asset → volumes, covering the accounts
/// the transaction touched.
pub type PostCommitVolumes = BTreeMap<String, BTreeMap<String, Volumes>>;

/// A committed engine-side transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub reference: String,
    pub postings: Vec<Posting>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub post_commit_volumes: PostCommitVolumes,
}

impl Transaction {
    /// Post-commit volumes for one account and asset, when the transaction
    /// touched it.
    pub fn volumes_for(&self, account: &str, asset: &str) -> Option<Volumes> {
        self.post_commit_volumes
            .get(account)
            .and_then(|assets| assets.get(asset))
            .copied()
    }
}

/// Result of [`crate::LedgerEngine::create_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTransaction {
    pub transaction: Transaction,
    /// `true` when a duplicate reference or idempotency key replayed a
    /// previously committed transaction instead of posting a new one.
    pub replayed: bool,
}

/// A resolved ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// An account read, volumes expanded on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, Volumes>,
}

/// Listing order over the total transaction-id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Asc,
    Desc,
}

/// Transaction listing query.
///
/// `after_id` is a strict bound on the id order: ids greater than it for
/// ascending listings, smaller for descending. Time bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsQuery {
    /// Match transactions with any posting touching one of these accounts.
    pub accounts: Vec<String>,
    pub reference: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub order: Order,
    pub limit: usize,
    pub after_id: Option<u64>,
}

impl TransactionsQuery {
    pub fn for_accounts(accounts: Vec<String>, order: Order, limit: usize) -> Self {
        Self {
            accounts,
            reference: None,
            start_time: None,
            end_time: None,
            order,
            limit,
            after_id: None,
        }
    }
}

/// One page of a transaction listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsPage {
    pub transactions: Vec<Transaction>,
    /// Whether further transactions exist past the end of this page.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TransactionSpec {
        TransactionSpec::new(
            PostingSpec {
                source: "a".into(),
                destination: "b".into(),
                asset: "USD/2".into(),
                amount: 100,
                source_overdraft: false,
            },
            "r1",
        )
    }

    #[test]
    fn content_hash_stable_under_idempotency_key() {
        let bare = spec();
        let keyed = spec().with_idempotency_key(Some("ik".into()));
        assert_eq!(bare.content_hash(), keyed.content_hash());
    }

    #[test]
    fn content_hash_tracks_payload() {
        let a = spec();
        let mut b = spec();
        b.posting.amount = 101;
        assert_ne!(a.content_hash(), b.content_hash());

        let mut c = spec();
        c.metadata.insert("k".into(), "v".into());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn volumes_balance_signed() {
        let v = Volumes {
            input: 30,
            output: 100,
        };
        assert_eq!(v.balance(), -70);
    }

    #[test]
    fn empty_idempotency_key_dropped() {
        let spec = spec().with_idempotency_key(Some(String::new()));
        assert_eq!(spec.idempotency_key, None);
    }
}
