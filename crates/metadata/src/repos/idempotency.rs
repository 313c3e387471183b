//! Idempotency record repository.
//!
//! The unique index on (idempotency_key, resource_action) is the only arbiter
//! of admission: whichever insert the database accepts first wins, every other
//! concurrent insert gets [`MetadataError::UniqueViolation`].
//!
//! [`MetadataError::UniqueViolation`]: crate::MetadataError::UniqueViolation

use crate::error::MetadataResult;
use crate::models::IdempotencyRecordRow;
use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for idempotency records.
#[async_trait]
pub trait IdempotencyRepo: Send + Sync {
    /// Get the record for a (key, action) pair.
    async fn find_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
    ) -> MetadataResult<Option<IdempotencyRecordRow>>;

    /// Insert a record.
    ///
    /// Fails with `UniqueViolation` if a record for the pair already exists.
    async fn insert_idempotency_record(&self, record: &IdempotencyRecordRow)
    -> MetadataResult<()>;

    /// Mark an IN_PROGRESS record COMPLETED with its response snapshot.
    /// Returns false if no IN_PROGRESS record owned by `claim_token` exists.
    async fn complete_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        claim_token: Uuid,
        response_code: i32,
        response_body: Option<&Value>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Delete the IN_PROGRESS record owned by `claim_token`.
    /// Returns false if no such record exists.
    async fn delete_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        claim_token: Uuid,
    ) -> MetadataResult<bool>;

    /// Take over an IN_PROGRESS record whose `updated_at` still equals
    /// `observed_updated_at`, bumping it to `now` and handing ownership to
    /// `claim_token`.
    ///
    /// Compare-and-swap: of several concurrent callers observing the same
    /// timestamp, exactly one gets `true`.
    async fn reclaim_stale_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        observed_updated_at: OffsetDateTime,
        claim_token: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;
}
