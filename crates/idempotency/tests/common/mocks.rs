use async_trait::async_trait;
use keyward_core::StoredResponse;
use keyward_kv::{KeyValueStore, KvError, KvResult};
use keyward_metadata::{IdempotencyRecordRow, IdempotencyRepo, MetadataError, MetadataResult};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Cache that fails every operation, as if the server were unreachable.
pub struct FailingCache;

#[async_trait]
impl KeyValueStore for FailingCache {
    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl_secs: u64) -> KvResult<()> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> KvResult<bool> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> KvResult<()> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Handler double that counts its invocations.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Succeed with `response` after `delay`.
    pub async fn succeed(
        &self,
        response: StoredResponse,
        delay: Duration,
    ) -> Result<StoredResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        Ok(response)
    }

    /// Fail with `message`.
    pub async fn fail(&self, message: &str) -> Result<StoredResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(message.to_string())
    }
}

/// Store wrapper with one-shot faults, for interleavings a real database
/// will not produce on demand.
#[allow(dead_code)]
pub struct ScriptedStore {
    inner: Arc<dyn IdempotencyRepo>,
    fail_next_insert: AtomicBool,
    missed_finds: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedStore {
    pub fn new(inner: Arc<dyn IdempotencyRepo>) -> Self {
        Self {
            inner,
            fail_next_insert: AtomicBool::new(false),
            missed_finds: AtomicUsize::new(0),
        }
    }

    /// The next insert fails with a non-unique database error.
    pub fn fail_next_insert(self) -> Self {
        self.fail_next_insert.store(true, Ordering::SeqCst);
        self
    }

    /// The next `count` lookups report no record, as reads racing a
    /// concurrent insert or delete would.
    pub fn miss_finds(self, count: usize) -> Self {
        self.missed_finds.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl IdempotencyRepo for ScriptedStore {
    async fn find_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
    ) -> MetadataResult<Option<IdempotencyRecordRow>> {
        if self
            .missed_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        self.inner
            .find_idempotency_record(idempotency_key, resource_action)
            .await
    }

    async fn insert_idempotency_record(
        &self,
        record: &IdempotencyRecordRow,
    ) -> MetadataResult<()> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(MetadataError::Internal("pool timed out".to_string()));
        }
        self.inner.insert_idempotency_record(record).await
    }

    async fn complete_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        claim_token: Uuid,
        response_code: i32,
        response_body: Option<&Value>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        self.inner
            .complete_idempotency_record(
                idempotency_key,
                resource_action,
                claim_token,
                response_code,
                response_body,
                updated_at,
            )
            .await
    }

    async fn delete_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        claim_token: Uuid,
    ) -> MetadataResult<bool> {
        self.inner
            .delete_idempotency_record(idempotency_key, resource_action, claim_token)
            .await
    }

    async fn reclaim_stale_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
        observed_updated_at: OffsetDateTime,
        claim_token: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        self.inner
            .reclaim_stale_idempotency_record(
                idempotency_key,
                resource_action,
                observed_updated_at,
                claim_token,
                now,
            )
            .await
    }
}

/// Cache wrapper whose next read misses, as a read taken before another
/// instance's write would.
#[allow(dead_code)]
pub struct StaleReadCache {
    inner: Arc<dyn KeyValueStore>,
    miss_next_get: AtomicBool,
}

#[allow(dead_code)]
impl StaleReadCache {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            miss_next_get: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl KeyValueStore for StaleReadCache {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        if self.miss_next_get.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        self.inner.set_with_expiry(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> KvResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "stale-read"
    }
}
