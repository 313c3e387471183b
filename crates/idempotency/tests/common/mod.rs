pub mod mocks;

#[allow(unused_imports)]
pub use mocks::{CountingHandler, FailingCache, ScriptedStore, StaleReadCache};

use keyward_core::{IdempotencyKey, IdempotencyScope, ResourceAction};
use keyward_idempotency::{ClaimOutcome, ClaimToken, IdempotencyCoordinator, Interceptor};
use keyward_kv::{KeyValueStore, MemoryBackend};
use keyward_metadata::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A coordinator over a temp-dir SQLite store, cleaned up on drop.
#[allow(dead_code)]
pub struct TestCoordinator {
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub store: Arc<SqliteStore>,
    pub cache: Arc<dyn KeyValueStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestCoordinator {
    /// SQLite store plus in-memory cache.
    pub async fn new() -> Self {
        Self::with_cache(Arc::new(MemoryBackend::new()), None).await
    }

    /// SQLite store plus a cache that fails every operation.
    pub async fn with_failing_cache() -> Self {
        Self::with_cache(Arc::new(FailingCache), None).await
    }

    pub async fn with_cache(
        cache: Arc<dyn KeyValueStore>,
        stale_claim_timeout: Option<Duration>,
    ) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = Arc::new(
            SqliteStore::new(temp_dir.path().join("test.db"), None)
                .await
                .expect("Failed to create SQLite store"),
        );
        let coordinator = IdempotencyCoordinator::new(store.clone(), cache.clone())
            .with_stale_claim_timeout(stale_claim_timeout);

        Self {
            coordinator: Arc::new(coordinator),
            store,
            cache,
            _temp_dir: temp_dir,
        }
    }

    /// A second coordinator sharing this one's durable store but not its cache,
    /// standing in for another instance.
    pub fn peer(&self, cache: Arc<dyn KeyValueStore>) -> Arc<IdempotencyCoordinator> {
        Arc::new(IdempotencyCoordinator::new(self.store.clone(), cache))
    }

    pub fn interceptor(&self) -> Interceptor {
        Interceptor::new(self.coordinator.clone())
    }
}

/// Build a scope from string literals.
pub fn scope(key: &str, action: &str) -> IdempotencyScope {
    IdempotencyScope::new(
        IdempotencyKey::parse(key).expect("valid key"),
        ResourceAction::parse(action).expect("valid action"),
    )
}

/// The token of an admitted claim; panics on any other outcome.
#[allow(dead_code)]
pub fn admitted(outcome: ClaimOutcome) -> ClaimToken {
    match outcome {
        ClaimOutcome::New(token) => token,
        other => panic!("expected New, got {other:?}"),
    }
}
