//! Cache error types.

use thiserror::Error;

/// Cache operation errors.
///
/// Every variant means "the cache could not answer"; callers fall back to
/// the durable store rather than failing the request.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for cache operations.
pub type KvResult<T> = std::result::Result<T, KvError>;
