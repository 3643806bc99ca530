//! In-memory reference engine
//!
//! Backs the test suite and the server's dev mode. All state lives behind a
//! single `RwLock`; commits take the write lock, which serializes them and
//! yields the per-ledger total order the contract requires.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::types::{
    Account, ExecutedTransaction, LedgerInfo, Order, PostCommitVolumes, Transaction,
    TransactionSpec, TransactionsPage, TransactionsQuery, Volumes,
};
use crate::LedgerEngine;
use walletcore_types::WORLD;

#[derive(Debug, Default)]
struct LedgerState {
    created_at: DateTime<Utc>,
    next_id: u64,
    transactions: Vec<Transaction>,
    /// account → asset → cumulative volumes
    volumes: HashMap<String, BTreeMap<String, Volumes>>,
    /// reference → (transaction id, content hash)
    references: HashMap<String, (u64, String)>,
    /// idempotency key → (transaction id, content hash)
    idempotency: HashMap<String, (u64, String)>,
    account_metadata: HashMap<String, BTreeMap<String, String>>,
}

impl LedgerState {
    fn balance(&self, account: &str, asset: &str) -> i64 {
        self.volumes
            .get(account)
            .and_then(|assets| assets.get(asset))
            .map(Volumes::balance)
            .unwrap_or(0)
    }

    fn replay(&self, id: u64) -> ExecutedTransaction {
        let transaction = self
            .transactions
            .iter()
            .find(|tx| tx.id == id)
            .expect("indexed transaction present in log")
            .clone();
        ExecutedTransaction {
            transaction,
            replayed: true,
        }
    }
}

/// In-process [`LedgerEngine`] holding every ledger in memory.
#[derive(Default)]
pub struct MemoryLedgerEngine {
    ledgers: RwLock<HashMap<String, LedgerState>>,
}

impl MemoryLedgerEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerEngine for MemoryLedgerEngine {
    async fn create_ledger(&self, name: &str) -> EngineResult<bool> {
        if name.is_empty() {
            return Err(EngineError::fatal("ledger name must not be empty"));
        }
        let mut ledgers = self.ledgers.write().await;
        if ledgers.contains_key(name) {
            return Ok(false);
        }
        ledgers.insert(
            name.to_string(),
            LedgerState {
                created_at: Utc::now(),
                next_id: 1,
                ..LedgerState::default()
            },
        );
        Ok(true)
    }

    async fn get_ledger(&self, name: &str) -> EngineResult<LedgerInfo> {
        let ledgers = self.ledgers.read().await;
        ledgers
            .get(name)
            .map(|state| LedgerInfo {
                name: name.to_string(),
                created_at: state.created_at,
            })
            .ok_or_else(|| EngineError::ledger_not_found(name))
    }

    async fn create_transaction(
        &self,
        ledger: &str,
        spec: TransactionSpec,
    ) -> EngineResult<ExecutedTransaction> {
        if spec.posting.amount < 0 {
            return Err(EngineError::fatal("posting amount must be non-negative"));
        }

        let mut ledgers = self.ledgers.write().await;
        let state = ledgers
            .get_mut(ledger)
            .ok_or_else(|| EngineError::ledger_not_found(ledger))?;

        let hash = spec.content_hash();

        if let Some(key) = &spec.idempotency_key {
            if let Some((id, prior_hash)) = state.idempotency.get(key) {
                if *prior_hash == hash {
                    return Ok(state.replay(*id));
                }
                return Err(EngineError::idempotency_key_conflict(ledger, key));
            }
        }

        if !spec.reference.is_empty() {
            if let Some((id, prior_hash)) = state.references.get(&spec.reference) {
                if *prior_hash == hash {
                    return Ok(state.replay(*id));
                }
                return Err(EngineError::reference_conflict(ledger, &spec.reference));
            }
        }

        let posting = spec.posting.to_posting();
        let overdraft = spec.posting.source_overdraft || posting.source == WORLD;
        if !overdraft && state.balance(&posting.source, &posting.asset) < posting.amount {
            return Err(EngineError::InsufficientFund {
                ledger: ledger.to_string(),
                account: posting.source.clone(),
            });
        }

        state
            .volumes
            .entry(posting.source.clone())
            .or_default()
            .entry(posting.asset.clone())
            .or_default()
            .output += posting.amount;
        state
            .volumes
            .entry(posting.destination.clone())
            .or_default()
            .entry(posting.asset.clone())
            .or_default()
            .input += posting.amount;

        let mut post_commit_volumes = PostCommitVolumes::new();
        for account in [&posting.source, &posting.destination] {
            let assets = state
                .volumes
                .get(account)
                .map(|assets| assets.clone())
                .unwrap_or_default();
            post_commit_volumes.insert(account.clone(), assets);
        }

        let id = state.next_id;
        state.next_id += 1;

        let transaction = Transaction {
            id,
            timestamp: Utc::now(),
            reference: spec.reference.clone(),
            postings: vec![posting],
            metadata: spec.metadata.clone(),
            post_commit_volumes,
        };

        if !spec.reference.is_empty() {
            state
                .references
                .insert(spec.reference.clone(), (id, hash.clone()));
        }
        if let Some(key) = &spec.idempotency_key {
            state.idempotency.insert(key.clone(), (id, hash));
        }

        state.transactions.push(transaction.clone());

        Ok(ExecutedTransaction {
            transaction,
            replayed: false,
        })
    }

    async fn save_account_metadata(
        &self,
        ledger: &str,
        address: &str,
        metadata: BTreeMap<String, String>,
    ) -> EngineResult<()> {
        let mut ledgers = self.ledgers.write().await;
        let state = ledgers
            .get_mut(ledger)
            .ok_or_else(|| EngineError::ledger_not_found(ledger))?;
        state
            .account_metadata
            .entry(address.to_string())
            .or_default()
            .extend(metadata);
        Ok(())
    }

    async fn get_account(
        &self,
        ledger: &str,
        address: &str,
        expand_volumes: bool,
    ) -> EngineResult<Account> {
        let ledgers = self.ledgers.read().await;
        let state = ledgers
            .get(ledger)
            .ok_or_else(|| EngineError::ledger_not_found(ledger))?;

        let metadata = state.account_metadata.get(address).cloned();
        let volumes = state.volumes.get(address).cloned();
        if metadata.is_none() && volumes.is_none() {
            return Err(EngineError::account_not_found(ledger, address));
        }

        Ok(Account {
            address: address.to_string(),
            metadata: metadata.unwrap_or_default(),
            volumes: if expand_volumes {
                volumes.unwrap_or_default()
            } else {
                BTreeMap::new()
            },
        })
    }

    async fn list_transactions(
        &self,
        ledger: &str,
        query: TransactionsQuery,
    ) -> EngineResult<TransactionsPage> {
        let ledgers = self.ledgers.read().await;
        let state = ledgers
            .get(ledger)
            .ok_or_else(|| EngineError::ledger_not_found(ledger))?;

        let matches = |tx: &Transaction| -> bool {
            if !query.accounts.is_empty()
                && !tx.postings.iter().any(|p| {
                    query.accounts.iter().any(|a| a == &p.source)
                        || query.accounts.iter().any(|a| a == &p.destination)
                })
            {
                return false;
            }
            if let Some(reference) = &query.reference {
                if &tx.reference != reference {
                    return false;
                }
            }
            if let Some(start) = query.start_time {
                if tx.timestamp < start {
                    return false;
                }
            }
            if let Some(end) = query.end_time {
                if tx.timestamp > end {
                    return false;
                }
            }
            match (query.order, query.after_id) {
                (Order::Asc, Some(after)) => tx.id > after,
                (Order::Desc, Some(after)) => tx.id < after,
                (_, None) => true,
            }
        };

        // The log is already ascending by id.
        let mut filtered: Vec<&Transaction> = state.transactions.iter().filter(|t| matches(t)).collect();
        if query.order == Order::Desc {
            filtered.reverse();
        }

        let has_more = filtered.len() > query.limit;
        let transactions = filtered
            .into_iter()
            .take(query.limit)
            .cloned()
            .collect();

        Ok(TransactionsPage {
            transactions,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostingSpec;
    use crate::ConflictKind;

    fn posting(source: &str, destination: &str, amount: i64, overdraft: bool) -> PostingSpec {
        PostingSpec {
            source: source.into(),
            destination: destination.into(),
            asset: "USD/2".into(),
            amount,
            source_overdraft: overdraft,
        }
    }

    async fn engine_with_ledger(name: &str) -> MemoryLedgerEngine {
        let engine = MemoryLedgerEngine::new();
        engine.create_ledger(name).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn create_ledger_is_idempotent() {
        let engine = MemoryLedgerEngine::new();
        assert!(engine.create_ledger("main").await.unwrap());
        assert!(!engine.create_ledger("main").await.unwrap());
        assert!(engine.get_ledger("main").await.is_ok());
        assert!(matches!(
            engine.get_ledger("other").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn overdraft_gate() {
        let engine = engine_with_ledger("main").await;

        // no funds, no grant: rejected
        let err = engine
            .create_transaction(
                "main",
                TransactionSpec::new(posting("alice", "bob", 10, false), "r1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFund { .. }));

        // explicit grant lets the source go negative
        let executed = engine
            .create_transaction(
                "main",
                TransactionSpec::new(posting("system", "bob", 10, true), "r2"),
            )
            .await
            .unwrap();
        assert_eq!(
            executed
                .transaction
                .volumes_for("system", "USD/2")
                .unwrap()
                .balance(),
            -10
        );

        // world never needs a grant
        engine
            .create_transaction(
                "main",
                TransactionSpec::new(posting(WORLD, "bob", 5, false), "r3"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_reference_replays_identical_content() {
        let engine = engine_with_ledger("main").await;
        let spec = TransactionSpec::new(posting(WORLD, "bob", 10, false), "r1");

        let first = engine.create_transaction("main", spec.clone()).await.unwrap();
        assert!(!first.replayed);

        let second = engine.create_transaction("main", spec).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.transaction.id, first.transaction.id);

        // balance moved once
        let account = engine.get_account("main", "bob", true).await.unwrap();
        assert_eq!(account.volumes.get("USD/2").unwrap().balance(), 10);
    }

    #[tokio::test]
    async fn duplicate_reference_with_divergent_content_conflicts() {
        let engine = engine_with_ledger("main").await;
        engine
            .create_transaction("main", TransactionSpec::new(posting(WORLD, "bob", 10, false), "r1"))
            .await
            .unwrap();

        let err = engine
            .create_transaction("main", TransactionSpec::new(posting(WORLD, "bob", 11, false), "r1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict {
                kind: ConflictKind::Reference,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn idempotency_key_replays_and_conflicts() {
        let engine = engine_with_ledger("main").await;
        let spec = TransactionSpec::new(posting(WORLD, "bob", 10, false), "r1")
            .with_idempotency_key(Some("ik1".into()));

        let first = engine.create_transaction("main", spec.clone()).await.unwrap();
        let replay = engine.create_transaction("main", spec).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.transaction.id, first.transaction.id);

        let divergent = TransactionSpec::new(posting(WORLD, "bob", 99, false), "r2")
            .with_idempotency_key(Some("ik1".into()));
        let err = engine.create_transaction("main", divergent).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict {
                kind: ConflictKind::IdempotencyKey,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn references_are_scoped_per_ledger() {
        let engine = MemoryLedgerEngine::new();
        engine.create_ledger("a").await.unwrap();
        engine.create_ledger("b").await.unwrap();

        let spec_a = TransactionSpec::new(posting(WORLD, "x", 10, false), "shared");
        let spec_b = TransactionSpec::new(posting(WORLD, "y", 20, false), "shared");
        engine.create_transaction("a", spec_a).await.unwrap();
        // different content under the same reference is fine on another ledger
        engine.create_transaction("b", spec_b).await.unwrap();
    }

    #[tokio::test]
    async fn account_metadata_creates_account_lazily() {
        let engine = engine_with_ledger("main").await;
        assert!(engine.get_account("main", "channel:c1", true).await.is_err());

        let mut metadata = BTreeMap::new();
        metadata.insert("provider".to_string(), "acme".to_string());
        engine
            .save_account_metadata("main", "channel:c1", metadata)
            .await
            .unwrap();

        let account = engine.get_account("main", "channel:c1", true).await.unwrap();
        assert_eq!(account.metadata.get("provider").unwrap(), "acme");
        assert!(account.volumes.is_empty());
    }

    #[tokio::test]
    async fn listing_filters_orders_and_paginates() {
        let engine = engine_with_ledger("main").await;
        for i in 1..=5 {
            engine
                .create_transaction(
                    "main",
                    TransactionSpec::new(posting(WORLD, "acct", 10, false), format!("r{i}")),
                )
                .await
                .unwrap();
        }
        // unrelated account
        engine
            .create_transaction(
                "main",
                TransactionSpec::new(posting(WORLD, "other", 10, false), "r-other"),
            )
            .await
            .unwrap();

        let page = engine
            .list_transactions(
                "main",
                TransactionsQuery::for_accounts(vec!["acct".into()], Order::Desc, 2),
            )
            .await
            .unwrap();
        assert_eq!(
            page.transactions.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![5, 4]
        );
        assert!(page.has_more);

        let mut next = TransactionsQuery::for_accounts(vec!["acct".into()], Order::Desc, 10);
        next.after_id = Some(4);
        let page = engine.list_transactions("main", next).await.unwrap();
        assert_eq!(
            page.transactions.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        assert!(!page.has_more);

        let mut by_reference =
            TransactionsQuery::for_accounts(vec!["acct".into()], Order::Asc, 10);
        by_reference.reference = Some("r3".into());
        let page = engine.list_transactions("main", by_reference).await.unwrap();
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].reference, "r3");
    }

    #[tokio::test]
    async fn concurrent_duplicates_observe_one_winner() {
        use std::sync::Arc;

        let engine = Arc::new(MemoryLedgerEngine::new());
        engine.create_ledger("main").await.unwrap();

        let spec = TransactionSpec::new(posting(WORLD, "bob", 50, false), "dup");
        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            let spec = spec.clone();
            handles.push(tokio::spawn(async move {
                engine.create_transaction("main", spec).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut fresh = 0;
        for handle in handles {
            let executed = handle.await.unwrap();
            if !executed.replayed {
                fresh += 1;
            }
            ids.push(executed.transaction.id);
        }
        assert_eq!(fresh, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let account = engine.get_account("main", "bob", true).await.unwrap();
        assert_eq!(account.volumes.get("USD/2").unwrap().balance(), 50);
    }
}
