//! Cache trait definitions.

use crate::error::KvResult;
use async_trait::async_trait;

/// A string key/value store with per-entry expiry.
///
/// The cache is a latency optimization in front of the durable store. Entries
/// may vanish at any time (expiry, eviction, restart) and implementations make
/// no atomicity promises across keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value for a key, or `None` if absent or expired.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Set a value that expires after `ttl_secs` seconds, replacing any
    /// existing value and expiry. A zero TTL is rejected.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()>;

    /// Delete a key. Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> KvResult<()>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
