//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("invalid resource action: {0}")]
    InvalidResourceAction(String),

    #[error("invalid idempotency status: {0}")]
    InvalidStatus(String),

    #[error("validation failed: {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
