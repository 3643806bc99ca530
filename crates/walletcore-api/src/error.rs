//! API error handling
//!
//! Maps wallet errors onto the wire contract: `{code, message, details?}`
//! bodies with the documented status codes. Partial commits carry the
//! committed leg ids in `details` so callers can drive reconciliation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use walletcore_wallet::WalletError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Wire-level error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub WalletError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WalletError::Validation { .. }
            | WalletError::UnsupportedCurrency { .. }
            | WalletError::InvalidWalletId { .. }
            | WalletError::InsufficientFund { .. }
            | WalletError::LienExceedsAvailable => StatusCode::BAD_REQUEST,
            WalletError::ReferenceConflict { .. } | WalletError::IdempotencyKeyConflict { .. } => {
                StatusCode::CONFLICT
            }
            WalletError::NotFound { .. } => StatusCode::NOT_FOUND,
            WalletError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::PartialCommit { .. } | WalletError::Fatal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.0 {
            WalletError::PartialCommit { committed, .. } => {
                serde_json::to_value(committed).ok().map(|legs| {
                    serde_json::json!({ "committed_legs": legs })
                })
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.error_code(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            code: self.0.error_code().to_string(),
            message: self.0.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletcore_wallet::{CommittedLeg, Leg};

    #[test]
    fn status_mapping() {
        let cases = [
            (WalletError::validation("bad"), StatusCode::BAD_REQUEST),
            (WalletError::LienExceedsAvailable, StatusCode::BAD_REQUEST),
            (
                WalletError::ReferenceConflict {
                    message: "dup".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                WalletError::NotFound {
                    what: "ledger x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                WalletError::Transient {
                    message: "down".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn partial_commit_details_carry_leg_ids() {
        let err = ApiError(WalletError::PartialCommit {
            committed: vec![CommittedLeg {
                leg: Leg::Wallet,
                ledger: "main".into(),
                tx_id: 12,
            }],
            cause: "channel leg failed".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = err.details().unwrap();
        assert_eq!(details["committed_legs"][0]["tx_id"], 12);
    }
}
