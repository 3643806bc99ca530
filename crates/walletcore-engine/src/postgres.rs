//! PostgreSQL engine backend
//!
//! Durable implementation of the [`LedgerEngine`] contract. Commits run in a
//! database transaction holding a per-ledger advisory lock, which serializes
//! them and yields the per-ledger total id order. Reference uniqueness is
//! additionally backed by a partial unique index, so a racing duplicate that
//! slips past the in-transaction check still cannot commit twice.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::{EngineError, EngineResult};
use crate::types::{
    Account, ExecutedTransaction, LedgerInfo, Order, PostCommitVolumes, Posting, Transaction,
    TransactionSpec, TransactionsPage, TransactionsQuery, Volumes,
};
use crate::LedgerEngine;
use walletcore_types::WORLD;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ledgers (
        name       TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        ledger              TEXT NOT NULL REFERENCES ledgers(name),
        id                  BIGINT NOT NULL,
        timestamp           TIMESTAMPTZ NOT NULL,
        reference           TEXT NOT NULL,
        content_hash        TEXT NOT NULL,
        postings            JSONB NOT NULL,
        metadata            JSONB NOT NULL,
        post_commit_volumes JSONB NOT NULL,
        PRIMARY KEY (ledger, id)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS transactions_ledger_reference
        ON transactions (ledger, reference) WHERE reference <> ''
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS idempotency_keys (
        ledger       TEXT NOT NULL,
        key          TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        tx_id        BIGINT NOT NULL,
        PRIMARY KEY (ledger, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS volumes (
        ledger  TEXT NOT NULL,
        account TEXT NOT NULL,
        asset   TEXT NOT NULL,
        input   BIGINT NOT NULL DEFAULT 0,
        output  BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (ledger, account, asset)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_metadata (
        ledger   TEXT NOT NULL,
        account  TEXT NOT NULL,
        metadata JSONB NOT NULL,
        PRIMARY KEY (ledger, account)
    )
    "#,
];

/// Durable [`LedgerEngine`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresLedgerEngine {
    pool: PgPool,
}

impl PostgresLedgerEngine {
    /// Connect to the engine backing store.
    ///
    /// With `auto_upgrade` the storage schema is created or upgraded on
    /// startup.
    pub async fn connect(uri: &str, max_connections: u32, auto_upgrade: bool) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await
            .map_err(transient)?;
        let engine = Self { pool };
        if auto_upgrade {
            engine.migrate().await?;
        }
        Ok(engine)
    }

    /// Wrap an existing pool. Schema management is the caller's concern.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or upgrade the storage schema.
    pub async fn migrate(&self) -> EngineResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(fatal)?;
        }
        tracing::info!("ledger engine schema ready");
        Ok(())
    }

    async fn replay(
        &self,
        ledger: &str,
        id: i64,
    ) -> EngineResult<ExecutedTransaction> {
        let row = sqlx::query(
            r#"
            SELECT id, timestamp, reference, postings, metadata, post_commit_volumes
            FROM transactions WHERE ledger = $1 AND id = $2
            "#,
        )
        .bind(ledger)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(transient)?;

        Ok(ExecutedTransaction {
            transaction: row_to_transaction(&row)?,
            replayed: true,
        })
    }
}

#[async_trait]
impl LedgerEngine for PostgresLedgerEngine {
    async fn create_ledger(&self, name: &str) -> EngineResult<bool> {
        if name.is_empty() {
            return Err(EngineError::fatal("ledger name must not be empty"));
        }
        let result = sqlx::query(
            "INSERT INTO ledgers (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_ledger(&self, name: &str) -> EngineResult<LedgerInfo> {
        let row = sqlx::query("SELECT name, created_at FROM ledgers WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(transient)?
            .ok_or_else(|| EngineError::ledger_not_found(name))?;
        Ok(LedgerInfo {
            name: row.try_get("name").map_err(fatal)?,
            created_at: row.try_get("created_at").map_err(fatal)?,
        })
    }

    async fn create_transaction(
        &self,
        ledger: &str,
        spec: TransactionSpec,
    ) -> EngineResult<ExecutedTransaction> {
        if spec.posting.amount < 0 {
            return Err(EngineError::fatal("posting amount must be non-negative"));
        }

        self.get_ledger(ledger).await?;
        let hash = spec.content_hash();

        let mut db = self.pool.begin().await.map_err(transient)?;

        // Serialize commits per ledger for the duration of this transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(ledger)
            .execute(&mut *db)
            .await
            .map_err(transient)?;

        if let Some(key) = &spec.idempotency_key {
            let prior = sqlx::query(
                "SELECT content_hash, tx_id FROM idempotency_keys WHERE ledger = $1 AND key = $2",
            )
            .bind(ledger)
            .bind(key)
            .fetch_optional(&mut *db)
            .await
            .map_err(transient)?;
            if let Some(row) = prior {
                let prior_hash: String = row.try_get("content_hash").map_err(fatal)?;
                let tx_id: i64 = row.try_get("tx_id").map_err(fatal)?;
                db.rollback().await.map_err(transient)?;
                if prior_hash == hash {
                    return self.replay(ledger, tx_id).await;
                }
                return Err(EngineError::idempotency_key_conflict(ledger, key));
            }
        }

        if !spec.reference.is_empty() {
            let prior = sqlx::query(
                "SELECT content_hash, id FROM transactions WHERE ledger = $1 AND reference = $2",
            )
            .bind(ledger)
            .bind(&spec.reference)
            .fetch_optional(&mut *db)
            .await
            .map_err(transient)?;
            if let Some(row) = prior {
                let prior_hash: String = row.try_get("content_hash").map_err(fatal)?;
                let tx_id: i64 = row.try_get("id").map_err(fatal)?;
                db.rollback().await.map_err(transient)?;
                if prior_hash == hash {
                    return self.replay(ledger, tx_id).await;
                }
                return Err(EngineError::reference_conflict(ledger, &spec.reference));
            }
        }

        let posting = spec.posting.to_posting();
        let overdraft = spec.posting.source_overdraft || posting.source == WORLD;
        if !overdraft {
            let row = sqlx::query(
                r#"
                SELECT input, output FROM volumes
                WHERE ledger = $1 AND account = $2 AND asset = $3
                FOR UPDATE
                "#,
            )
            .bind(ledger)
            .bind(&posting.source)
            .bind(&posting.asset)
            .fetch_optional(&mut *db)
            .await
            .map_err(transient)?;
            let balance = match row {
                Some(row) => {
                    let input: i64 = row.try_get("input").map_err(fatal)?;
                    let output: i64 = row.try_get("output").map_err(fatal)?;
                    input - output
                }
                None => 0,
            };
            if balance < posting.amount {
                db.rollback().await.map_err(transient)?;
                return Err(EngineError::InsufficientFund {
                    ledger: ledger.to_string(),
                    account: posting.source,
                });
            }
        }

        let mut post_commit_volumes = PostCommitVolumes::new();
        for (account, input_delta, output_delta) in [
            (&posting.source, 0i64, posting.amount),
            (&posting.destination, posting.amount, 0i64),
        ] {
            let row = sqlx::query(
                r#"
                INSERT INTO volumes (ledger, account, asset, input, output)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (ledger, account, asset)
                DO UPDATE SET input = volumes.input + $4, output = volumes.output + $5
                RETURNING input, output
                "#,
            )
            .bind(ledger)
            .bind(account)
            .bind(&posting.asset)
            .bind(input_delta)
            .bind(output_delta)
            .fetch_one(&mut *db)
            .await
            .map_err(transient)?;
            let volumes = Volumes {
                input: row.try_get("input").map_err(fatal)?,
                output: row.try_get("output").map_err(fatal)?,
            };
            post_commit_volumes
                .entry(account.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(posting.asset.clone(), volumes);
        }

        let id_row = sqlx::query(
            "SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM transactions WHERE ledger = $1",
        )
        .bind(ledger)
        .fetch_one(&mut *db)
        .await
        .map_err(transient)?;
        let id: i64 = id_row.try_get("next_id").map_err(fatal)?;
        let timestamp = Utc::now();

        let transaction = Transaction {
            id: id as u64,
            timestamp,
            reference: spec.reference.clone(),
            postings: vec![posting],
            metadata: spec.metadata.clone(),
            post_commit_volumes,
        };

        sqlx::query(
            r#"
            INSERT INTO transactions
                (ledger, id, timestamp, reference, content_hash, postings, metadata, post_commit_volumes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(ledger)
        .bind(id)
        .bind(timestamp)
        .bind(&spec.reference)
        .bind(&hash)
        .bind(serde_json::to_value(&transaction.postings).map_err(fatal)?)
        .bind(serde_json::to_value(&transaction.metadata).map_err(fatal)?)
        .bind(serde_json::to_value(&transaction.post_commit_volumes).map_err(fatal)?)
        .execute(&mut *db)
        .await
        .map_err(|e| map_unique_violation(e, ledger, &spec.reference))?;

        if let Some(key) = &spec.idempotency_key {
            sqlx::query(
                r#"
                INSERT INTO idempotency_keys (ledger, key, content_hash, tx_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(ledger)
            .bind(key)
            .bind(&hash)
            .bind(id)
            .execute(&mut *db)
            .await
            .map_err(transient)?;
        }

        db.commit().await.map_err(transient)?;

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
        self.get_ledger(ledger).await?;
        sqlx::query(
            r#"
            INSERT INTO account_metadata (ledger, account, metadata)
            VALUES ($1, $2, $3)
            ON CONFLICT (ledger, account)
            DO UPDATE SET metadata = account_metadata.metadata || $3
            "#,
        )
        .bind(ledger)
        .bind(address)
        .bind(serde_json::to_value(&metadata).map_err(fatal)?)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(())
    }

    async fn get_account(
        &self,
        ledger: &str,
        address: &str,
        expand_volumes: bool,
    ) -> EngineResult<Account> {
        self.get_ledger(ledger).await?;

        let metadata_row = sqlx::query(
            "SELECT metadata FROM account_metadata WHERE ledger = $1 AND account = $2",
        )
        .bind(ledger)
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        let volume_rows = sqlx::query(
            "SELECT asset, input, output FROM volumes WHERE ledger = $1 AND account = $2",
        )
        .bind(ledger)
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;

        if metadata_row.is_none() && volume_rows.is_empty() {
            return Err(EngineError::account_not_found(ledger, address));
        }

        let metadata = match metadata_row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("metadata").map_err(fatal)?;
                serde_json::from_value(value).map_err(fatal)?
            }
            None => BTreeMap::new(),
        };

        let mut volumes = BTreeMap::new();
        if expand_volumes {
            for row in volume_rows {
                let asset: String = row.try_get("asset").map_err(fatal)?;
                volumes.insert(
                    asset,
                    Volumes {
                        input: row.try_get("input").map_err(fatal)?,
                        output: row.try_get("output").map_err(fatal)?,
                    },
                );
            }
        }

        Ok(Account {
            address: address.to_string(),
            metadata,
            volumes,
        })
    }

    async fn list_transactions(
        &self,
        ledger: &str,
        query: TransactionsQuery,
    ) -> EngineResult<TransactionsPage> {
        self.get_ledger(ledger).await?;

        // Account match walks the postings array: any posting with source or
        // destination in the requested set.
        let mut sql = String::from(
            r#"
            SELECT id, timestamp, reference, postings, metadata, post_commit_volumes
            FROM transactions
            WHERE ledger = $1
              AND (cardinality($2::text[]) = 0 OR EXISTS (
                  SELECT 1 FROM jsonb_array_elements(postings) AS p
                  WHERE p->>'source' = ANY($2) OR p->>'destination' = ANY($2)
              ))
              AND ($3::text IS NULL OR reference = $3)
              AND ($4::timestamptz IS NULL OR timestamp >= $4)
              AND ($5::timestamptz IS NULL OR timestamp <= $5)
            "#,
        );
        match (query.order, query.after_id.is_some()) {
            (Order::Asc, true) => sql.push_str(" AND id > $6 ORDER BY id ASC LIMIT $7"),
            (Order::Desc, true) => sql.push_str(" AND id < $6 ORDER BY id DESC LIMIT $7"),
            (Order::Asc, false) => sql.push_str(" AND $6::bigint IS NULL ORDER BY id ASC LIMIT $7"),
            (Order::Desc, false) => {
                sql.push_str(" AND $6::bigint IS NULL ORDER BY id DESC LIMIT $7")
            }
        }

        let rows = sqlx::query(&sql)
            .bind(ledger)
            .bind(&query.accounts)
            .bind(&query.reference)
            .bind(query.start_time)
            .bind(query.end_time)
            .bind(query.after_id.map(|id| id as i64))
            .bind(query.limit as i64 + 1)
            .fetch_all(&self.pool)
            .await
            .map_err(transient)?;

        let has_more = rows.len() > query.limit;
        let transactions = rows
            .iter()
            .take(query.limit)
            .map(row_to_transaction)
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(TransactionsPage {
            transactions,
            has_more,
        })
    }
}

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> EngineResult<Transaction> {
    let id: i64 = row.try_get("id").map_err(fatal)?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(fatal)?;
    let reference: String = row.try_get("reference").map_err(fatal)?;
    let postings: serde_json::Value = row.try_get("postings").map_err(fatal)?;
    let metadata: serde_json::Value = row.try_get("metadata").map_err(fatal)?;
    let volumes: serde_json::Value = row.try_get("post_commit_volumes").map_err(fatal)?;

    let postings: Vec<Posting> = serde_json::from_value(postings).map_err(fatal)?;
    Ok(Transaction {
        id: id as u64,
        timestamp,
        reference,
        postings,
        metadata: serde_json::from_value(metadata).map_err(fatal)?,
        post_commit_volumes: serde_json::from_value(volumes).map_err(fatal)?,
    })
}

/// A racing duplicate reference that commits first trips the partial unique
/// index; report it as the conflict it is rather than a transient failure.
fn map_unique_violation(err: sqlx::Error, ledger: &str, reference: &str) -> EngineError {
    if let sqlx::Error::Database(db) = &err {
        if db.constraint() == Some("transactions_ledger_reference") {
            return EngineError::reference_conflict(ledger, reference);
        }
    }
    transient(err)
}

fn transient(err: impl std::fmt::Display) -> EngineError {
    EngineError::transient(err.to_string())
}

fn fatal(err: impl std::fmt::Display) -> EngineError {
    EngineError::fatal(err.to_string())
}
