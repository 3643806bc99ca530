//! Wallet-level error surface
//!
//! Every error carries a stable `error_code()` for API responses. Engine
//! errors are folded in per operation: the same engine rejection can mean
//! different things depending on which posting tripped it (an overdrawn
//! available account vs a lien larger than available).

use thiserror::Error;

use walletcore_engine::{ConflictKind, EngineError};
use walletcore_types::{InvalidWalletId, UnsupportedCurrency};

pub type WalletResult<T> = Result<T, WalletError>;

/// Which leg of a multi-ledger operation a committed transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Wallet,
    Channel,
    Revenue,
}

/// One durably committed leg, reported inside a partial-commit failure so
/// callers can drive reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommittedLeg {
    pub leg: Leg,
    pub ledger: String,
    pub tx_id: u64,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("{message}")]
    Validation { message: String },

    #[error("currency {code} not supported or disabled")]
    UnsupportedCurrency { code: String },

    #[error("invalid wallet id {wallet_id:?}: expected {{userId}}-{{currency}}")]
    InvalidWalletId { wallet_id: String },

    #[error("insufficient funds in {account}")]
    InsufficientFund { account: String },

    #[error("lien amount exceeds available balance")]
    LienExceedsAvailable,

    #[error("{message}")]
    ReferenceConflict { message: String },

    #[error("{message}")]
    IdempotencyKeyConflict { message: String },

    /// A multi-ledger operation committed some legs and then failed. The
    /// committed legs stay committed; a retry with the same reference
    /// replays them and re-attempts the rest.
    #[error("operation partially committed: {cause}")]
    PartialCommit {
        committed: Vec<CommittedLeg>,
        cause: String,
    },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("ledger engine unavailable: {message}")]
    Transient { message: String },

    #[error("internal failure: {message}")]
    Fatal { message: String },
}

impl WalletError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UnsupportedCurrency { .. } => "UNSUPPORTED_CURRENCY",
            Self::InvalidWalletId { .. } => "INVALID_WALLET_ID",
            Self::InsufficientFund { .. } => "INSUFFICIENT_FUND",
            Self::LienExceedsAvailable => "LIEN_EXCEEDS_AVAILABLE",
            Self::ReferenceConflict { .. } => "REFERENCE_CONFLICT",
            Self::IdempotencyKeyConflict { .. } => "IDEMPOTENCY_KEY_CONFLICT",
            Self::PartialCommit { .. } => "PARTIAL_COMMIT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Transient { .. } => "TRANSIENT",
            Self::Fatal { .. } => "FATAL",
        }
    }
}

impl From<UnsupportedCurrency> for WalletError {
    fn from(err: UnsupportedCurrency) -> Self {
        Self::UnsupportedCurrency { code: err.code }
    }
}

impl From<InvalidWalletId> for WalletError {
    fn from(err: InvalidWalletId) -> Self {
        Self::InvalidWalletId {
            wallet_id: err.wallet_id,
        }
    }
}

impl From<EngineError> for WalletError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Conflict {
                kind: ConflictKind::Reference,
                message,
                ..
            } => Self::ReferenceConflict { message },
            EngineError::Conflict {
                kind: ConflictKind::IdempotencyKey,
                message,
                ..
            } => Self::IdempotencyKeyConflict { message },
            EngineError::InsufficientFund { account, .. } => Self::InsufficientFund { account },
            EngineError::NotFound { what } => Self::NotFound { what },
            EngineError::Transient { message } => Self::Transient { message },
            EngineError::Fatal { message } => Self::Fatal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_conflicts_map_to_distinct_codes() {
        let reference: WalletError = EngineError::reference_conflict("main", "r1").into();
        assert_eq!(reference.error_code(), "REFERENCE_CONFLICT");

        let key: WalletError = EngineError::idempotency_key_conflict("main", "ik").into();
        assert_eq!(key.error_code(), "IDEMPOTENCY_KEY_CONFLICT");
    }

    #[test]
    fn partial_commit_names_committed_legs() {
        let err = WalletError::PartialCommit {
            committed: vec![CommittedLeg {
                leg: Leg::Wallet,
                ledger: "main".into(),
                tx_id: 7,
            }],
            cause: "channel ledger unavailable".into(),
        };
        assert_eq!(err.error_code(), "PARTIAL_COMMIT");
        let WalletError::PartialCommit { committed, .. } = &err else {
            unreachable!()
        };
        assert_eq!(committed[0].tx_id, 7);
    }
}
