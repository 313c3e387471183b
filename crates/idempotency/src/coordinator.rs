//! Admission, completion and failure of idempotent operations.
//!
//! The volatile cache answers the common duplicate cheaply; the durable store
//! is authoritative and its unique index on (key, resource action) is the only
//! arbiter of which claimant runs the operation. No locks are held here.

use crate::error::{IdempotencyError, IdempotencyResult};
use keyward_core::config::IdempotencyConfig;
use keyward_core::{
    CacheEntry, DEFAULT_IDEMPOTENCY_TTL_SECS, IdempotencyScope, IdempotencyStatus, StoredResponse,
};
use keyward_kv::KeyValueStore;
use keyward_metadata::{IdempotencyRecordRow, IdempotencyRepo, MetadataError};
use std::sync::Arc;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ownership of an admitted operation.
///
/// Handed out with [`ClaimOutcome::New`] and required by `complete` and `fail`.
/// A stale claim taken over by another caller gets a fresh token, so the
/// previous owner's `complete` or `fail` no longer matches the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of [`IdempotencyCoordinator::check_and_claim`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The caller owns the operation and must run it, then `complete` or `fail`.
    New(ClaimToken),
    /// Another claimant owns the operation and has not finished.
    InProgress,
    /// The operation already succeeded; replay this response.
    Completed(StoredResponse),
}

impl ClaimOutcome {
    /// The claim token, if the caller was admitted.
    pub fn token(&self) -> Option<ClaimToken> {
        match self {
            Self::New(token) => Some(*token),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::InProgress => "in_progress",
            Self::Completed(_) => "completed",
        }
    }
}

/// Coordinates cache and durable store for idempotent operations.
pub struct IdempotencyCoordinator {
    store: Arc<dyn IdempotencyRepo>,
    cache: Arc<dyn KeyValueStore>,
    default_ttl_secs: u64,
    stale_claim_timeout: Option<Duration>,
}

impl IdempotencyCoordinator {
    /// Create a coordinator with the default TTL and no stale-claim recovery.
    pub fn new(store: Arc<dyn IdempotencyRepo>, cache: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache,
            default_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            stale_claim_timeout: None,
        }
    }

    /// Create a coordinator from the `[idempotency]` configuration section.
    pub fn from_config(
        store: Arc<dyn IdempotencyRepo>,
        cache: Arc<dyn KeyValueStore>,
        config: &IdempotencyConfig,
    ) -> Self {
        Self::new(store, cache)
            .with_default_ttl(config.default_ttl_secs)
            .with_stale_claim_timeout(config.stale_claim_timeout())
    }

    /// TTL used when a caller passes `None` or `0`. Zero keeps the current default.
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        if ttl_secs > 0 {
            self.default_ttl_secs = ttl_secs;
        }
        self
    }

    /// Allow IN_PROGRESS records untouched for `timeout` to be reclaimed.
    pub fn with_stale_claim_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stale_claim_timeout = timeout;
        self
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    fn resolve_ttl(&self, ttl_secs: Option<u64>) -> u64 {
        match ttl_secs {
            Some(ttl) if ttl > 0 => ttl,
            _ => self.default_ttl_secs,
        }
    }

    /// Decide whether the caller may run the operation for `scope`.
    pub async fn check_and_claim(
        &self,
        scope: &IdempotencyScope,
        ttl_secs: Option<u64>,
    ) -> IdempotencyResult<ClaimOutcome> {
        let ttl = self.resolve_ttl(ttl_secs);
        let cache_key = scope.cache_key();

        // 1. Cache fast path
        if let Some(entry) = self.read_cache(&cache_key).await {
            let status = entry.status;
            match status {
                IdempotencyStatus::Completed => {
                    if let Some(response) = entry.into_response() {
                        tracing::debug!(scope = %scope, "Idempotency cache hit (completed)");
                        return Ok(ClaimOutcome::Completed(response));
                    }
                }
                // With stale-claim recovery enabled the store decides whether
                // an in-progress claim is still live.
                IdempotencyStatus::InProgress if self.stale_claim_timeout.is_none() => {
                    tracing::debug!(scope = %scope, "Idempotency cache hit (in progress)");
                    return Ok(ClaimOutcome::InProgress);
                }
                IdempotencyStatus::InProgress => {}
            }
        }

        // 2. Durable record
        let key = scope.key.as_str();
        let action = scope.resource_action.as_str();
        if let Some(record) = self.store.find_idempotency_record(key, action).await? {
            return match record.status()? {
                IdempotencyStatus::Completed => {
                    let response = completed_response(&record)?;
                    self.write_cache(&cache_key, &CacheEntry::completed(&response), ttl)
                        .await;
                    Ok(ClaimOutcome::Completed(response))
                }
                IdempotencyStatus::InProgress => self.try_reclaim(scope, &record, ttl).await,
            };
        }

        // 3. Claim
        self.write_cache(&cache_key, &CacheEntry::in_progress(), ttl)
            .await;

        let record = IdempotencyRecordRow::claim(scope);
        match self.store.insert_idempotency_record(&record).await {
            Ok(()) => {
                tracing::debug!(scope = %scope, "Idempotency key claimed");
                Ok(ClaimOutcome::New(ClaimToken(record.claim_token)))
            }
            Err(MetadataError::UniqueViolation(_)) => {
                tracing::debug!(scope = %scope, "Lost idempotency claim race");
                self.settle_lost_race(scope, &cache_key, ttl).await
            }
            Err(e) => {
                // No record was written, so the entry above must not outlive this call.
                self.evict_cache(&cache_key).await;
                Err(e.into())
            }
        }
    }

    /// Re-read the winner's record after a lost insert, so the IN_PROGRESS
    /// entry written for the attempt never shadows the winner's real state.
    async fn settle_lost_race(
        &self,
        scope: &IdempotencyScope,
        cache_key: &str,
        ttl: u64,
    ) -> IdempotencyResult<ClaimOutcome> {
        let record = match self
            .store
            .find_idempotency_record(scope.key.as_str(), scope.resource_action.as_str())
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                // The winner already failed and released the pair.
                self.evict_cache(cache_key).await;
                return Ok(ClaimOutcome::InProgress);
            }
            Err(e) => {
                self.evict_cache(cache_key).await;
                return Err(e.into());
            }
        };

        match record.status() {
            Ok(IdempotencyStatus::InProgress) => Ok(ClaimOutcome::InProgress),
            Ok(IdempotencyStatus::Completed) => {
                let response = completed_response(&record)?;
                self.write_cache(cache_key, &CacheEntry::completed(&response), ttl)
                    .await;
                Ok(ClaimOutcome::Completed(response))
            }
            Err(e) => {
                self.evict_cache(cache_key).await;
                Err(e.into())
            }
        }
    }

    /// Take over an abandoned IN_PROGRESS record, if recovery is enabled and
    /// the record is old enough. Otherwise report it as in progress.
    async fn try_reclaim(
        &self,
        scope: &IdempotencyScope,
        record: &IdempotencyRecordRow,
        ttl: u64,
    ) -> IdempotencyResult<ClaimOutcome> {
        let Some(timeout) = self.stale_claim_timeout else {
            return Ok(ClaimOutcome::InProgress);
        };

        let now = OffsetDateTime::now_utc();
        let age = now - record.updated_at;
        if age < timeout {
            return Ok(ClaimOutcome::InProgress);
        }

        let token = ClaimToken(Uuid::new_v4());
        let reclaimed = self
            .store
            .reclaim_stale_idempotency_record(
                scope.key.as_str(),
                scope.resource_action.as_str(),
                record.updated_at,
                token.as_uuid(),
                now,
            )
            .await?;

        if !reclaimed {
            return Ok(ClaimOutcome::InProgress);
        }

        tracing::warn!(
            scope = %scope,
            age_secs = age.whole_seconds(),
            "Reclaimed stale in-progress idempotency record"
        );
        self.write_cache(&scope.cache_key(), &CacheEntry::in_progress(), ttl)
            .await;
        Ok(ClaimOutcome::New(token))
    }

    /// Record the successful response for a claim owned by the caller.
    pub async fn complete(
        &self,
        scope: &IdempotencyScope,
        token: ClaimToken,
        response: &StoredResponse,
        ttl_secs: Option<u64>,
    ) -> IdempotencyResult<()> {
        let ttl = self.resolve_ttl(ttl_secs);

        let updated = self
            .store
            .complete_idempotency_record(
                scope.key.as_str(),
                scope.resource_action.as_str(),
                token.as_uuid(),
                i32::from(response.status_code),
                response.body.as_ref(),
                OffsetDateTime::now_utc(),
            )
            .await?;

        if !updated {
            return Err(IdempotencyError::ClaimLost(scope.to_string()));
        }

        self.write_cache(&scope.cache_key(), &CacheEntry::completed(response), ttl)
            .await;

        tracing::debug!(
            scope = %scope,
            status_code = response.status_code,
            "Idempotent operation completed"
        );
        Ok(())
    }

    /// Release a claim after the operation failed, so the key can be retried.
    ///
    /// A claim that was taken over by another caller is left alone.
    pub async fn fail(&self, scope: &IdempotencyScope, token: ClaimToken) -> IdempotencyResult<()> {
        let deleted = self
            .store
            .delete_idempotency_record(
                scope.key.as_str(),
                scope.resource_action.as_str(),
                token.as_uuid(),
            )
            .await?;
        if !deleted {
            tracing::debug!(scope = %scope, token = %token, "Idempotency claim no longer held");
            return Ok(());
        }

        self.evict_cache(&scope.cache_key()).await;
        Ok(())
    }

    async fn evict_cache(&self, cache_key: &str) {
        if let Err(e) = self.cache.delete(cache_key).await {
            tracing::warn!(cache_key, error = %e, "Failed to delete idempotency cache entry");
        }
    }

    async fn read_cache(&self, cache_key: &str) -> Option<CacheEntry> {
        let raw = match self.cache.get(cache_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(cache_key, error = %e, "Idempotency cache read failed");
                return None;
            }
        };
        match CacheEntry::decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(cache_key, error = %e, "Ignoring undecodable idempotency cache entry");
                None
            }
        }
    }

    async fn write_cache(&self, cache_key: &str, entry: &CacheEntry, ttl_secs: u64) {
        let encoded = match entry.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(cache_key, error = %e, "Failed to encode idempotency cache entry");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set_with_expiry(cache_key, &encoded, ttl_secs)
            .await
        {
            tracing::warn!(cache_key, error = %e, "Idempotency cache write failed");
        }
    }
}

fn completed_response(record: &IdempotencyRecordRow) -> IdempotencyResult<StoredResponse> {
    Ok(record.stored_response()?.unwrap_or(StoredResponse {
        status_code: 200,
        body: None,
    }))
}
