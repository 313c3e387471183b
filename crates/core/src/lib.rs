//! Core domain types and shared logic for Keyward.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Idempotency keys, resource actions and record status
//! - Cache entries and replayable response snapshots
//! - Article requests, queries and responses
//! - Configuration for every component

pub mod article;
pub mod config;
pub mod error;
pub mod idempotency;

pub use article::{Article, ArticleQuery, NewArticle, SortOrder};
pub use error::{Error, Result};
pub use idempotency::{
    CacheEntry, IdempotencyKey, IdempotencyScope, IdempotencyStatus, ResourceAction,
    StoredResponse,
};

/// Default time-to-live for idempotency records in the cache: 24 hours.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 86_400;

/// Upper bound on any configured idempotency TTL: 365 days.
pub const MAX_IDEMPOTENCY_TTL_SECS: u64 = 365 * 86_400;

/// Maximum length of an idempotency key or resource action (matches the column width).
pub const MAX_IDEMPOTENCY_FIELD_LEN: usize = 255;
