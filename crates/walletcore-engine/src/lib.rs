//! Walletcore ledger engine adapter
//!
//! The wrapper treats the ledger engine as a black box behind the
//! [`LedgerEngine`] trait: create-ledger, create-transaction, account
//! metadata, account reads, and transaction listing. The engine, not the
//! wrapper, is the source of truth for balances, reference uniqueness, and
//! idempotency-key replay.
//!
//! Two backends ship with the crate:
//!
//! - [`memory::MemoryLedgerEngine`]: in-process reference engine backing the
//!   test suite and the server's dev mode
//! - [`postgres::PostgresLedgerEngine`]: durable engine over PostgreSQL
//!
//! Both honour the same contract:
//!
//! 1. Committed transactions per ledger are totally ordered by id
//! 2. A non-empty `reference` commits at most once per ledger; a duplicate
//!    with identical content replays the committed transaction, a divergent
//!    duplicate is a conflict
//! 3. An idempotency key replays its prior result; a divergent payload under
//!    the same key is a conflict
//! 4. A source account without an overdraft grant never goes negative

pub mod error;
pub mod memory;
pub mod postgres;
mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use error::{ConflictKind, EngineError, EngineResult};
pub use memory::MemoryLedgerEngine;
pub use postgres::PostgresLedgerEngine;
pub use types::{
    Account, ExecutedTransaction, LedgerInfo, Order, PostCommitVolumes, Posting, PostingSpec,
    Transaction, TransactionSpec, TransactionsPage, TransactionsQuery, Volumes,
};

/// Capability set of the underlying ledger engine.
///
/// All calls are synchronous request/response with no ordering requirements
/// between them; every call is an await point and cancellable.
#[async_trait]
pub trait LedgerEngine: Send + Sync {
    /// Create a ledger if it does not exist. Returns `true` when the ledger
    /// was created by this call, `false` when it already existed.
    async fn create_ledger(&self, name: &str) -> EngineResult<bool>;

    /// Resolve a ledger by name, failing with `NotFound` when absent.
    async fn get_ledger(&self, name: &str) -> EngineResult<LedgerInfo>;

    /// Execute a single-posting transaction on a ledger.
    async fn create_transaction(
        &self,
        ledger: &str,
        spec: TransactionSpec,
    ) -> EngineResult<ExecutedTransaction>;

    /// Attach metadata to an account, creating the account lazily.
    async fn save_account_metadata(
        &self,
        ledger: &str,
        address: &str,
        metadata: BTreeMap<String, String>,
    ) -> EngineResult<()>;

    /// Read an account, optionally expanding its per-asset volumes.
    async fn get_account(
        &self,
        ledger: &str,
        address: &str,
        expand_volumes: bool,
    ) -> EngineResult<Account>;

    /// List committed transactions matching a query, ordered by id.
    async fn list_transactions(
        &self,
        ledger: &str,
        query: TransactionsQuery,
    ) -> EngineResult<TransactionsPage>;
}
