//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The (idempotency_key, resource_action) pair is already claimed.
    ///
    /// Kept distinct from every other failure: callers treat it as a lost
    /// admission race, not as an error.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Returns true when a sqlx error is a unique/primary key constraint violation.
///
/// SQLite reports "UNIQUE constraint failed: ..." and PostgreSQL SQLSTATE 23505;
/// sqlx maps both to `ErrorKind::UniqueViolation`.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.code().as_deref() == Some("23505")
        }
        _ => false,
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
