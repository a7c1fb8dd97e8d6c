//! HTTP error types for the `Tally` server.
//!
//! Maps domain errors from `tally-core` into HTTP responses. Every error
//! produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`. Internal failures are logged and reported with
//! a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use tally_core::error::{AccountError, LedgerError, TokenError, ValidationError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client sent invalid input.
    #[error("validation: {0}")]
    Validation(String),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested user or entry not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger would grow past its size cap.
    #[error("size limit: {0}")]
    SizeLimit(String),

    /// Duplicate username or a write that kept losing its version race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage, hashing, signing, or a corrupt document.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::SizeLimit(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "size_limit", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(inner) => inner.into(),
            LedgerError::UserNotFound { .. } | LedgerError::EntryNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            LedgerError::SizeLimitExceeded { .. } => Self::SizeLimit(err.to_string()),
            LedgerError::Contended { .. } => Self::Conflict(err.to_string()),
            LedgerError::Corrupt { .. }
            | LedgerError::Serialization { .. }
            | LedgerError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Invalid { .. } | TokenError::Revoked => {
                Self::Unauthorized(err.to_string())
            }
            TokenError::Signing { .. } | TokenError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(inner) => inner.into(),
            AccountError::UserNotFound => Self::NotFound(err.to_string()),
            AccountError::InvalidCredentials => Self::Unauthorized(err.to_string()),
            AccountError::UsernameTaken => Self::Conflict(err.to_string()),
            AccountError::Token(inner) => inner.into(),
            AccountError::Hashing { .. }
            | AccountError::Serialization { .. }
            | AccountError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}
