//! Coordinator error types.

use keyward_metadata::MetadataError;
use thiserror::Error;

/// Coordinator errors.
///
/// Cache failures never appear here: they are logged and downgraded.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The durable store failed for a reason other than a lost admission race.
    #[error("metadata store error: {0}")]
    Store(#[from] MetadataError),

    /// `complete` found no IN_PROGRESS record for the scope.
    #[error("no in-progress claim for {0}")]
    ClaimLost(String),
}

/// Result type for coordinator operations.
pub type IdempotencyResult<T> = std::result::Result<T, IdempotencyError>;
