//! Engine error categories
//!
//! The orchestrator dispatches on category only; backend-specific causes are
//! flattened into the message.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Which uniqueness layer a conflict arose on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Duplicate `reference` with divergent content.
    Reference,
    /// Duplicate idempotency key with divergent content.
    IdempotencyKey,
}

/// Error surface of every [`crate::LedgerEngine`] backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}")]
    Conflict {
        kind: ConflictKind,
        ledger: String,
        message: String,
    },

    #[error("insufficient funds in {account} on ledger {ledger}")]
    InsufficientFund { ledger: String, account: String },

    #[error("{what} not found")]
    NotFound { what: String },

    /// Network or availability failure; the caller may retry.
    #[error("engine unavailable: {message}")]
    Transient { message: String },

    /// Malformed submission or storage schema error; not retryable.
    #[error("engine failure: {message}")]
    Fatal { message: String },
}

impl EngineError {
    pub fn ledger_not_found(name: &str) -> Self {
        Self::NotFound {
            what: format!("ledger {name}"),
        }
    }

    pub fn account_not_found(ledger: &str, address: &str) -> Self {
        Self::NotFound {
            what: format!("account {address} on ledger {ledger}"),
        }
    }

    pub fn reference_conflict(ledger: &str, reference: &str) -> Self {
        Self::Conflict {
            kind: ConflictKind::Reference,
            ledger: ledger.to_string(),
            message: format!("reference {reference} already committed with different content"),
        }
    }

    pub fn idempotency_key_conflict(ledger: &str, key: &str) -> Self {
        Self::Conflict {
            kind: ConflictKind::IdempotencyKey,
            ledger: ledger.to_string(),
            message: format!("idempotency key {key} was used with a different payload"),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }
}
