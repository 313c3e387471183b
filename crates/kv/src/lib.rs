//! Volatile key/value cache for keyward.
//!
//! This crate provides:
//! - The [`KeyValueStore`] trait: get, set with expiry, delete
//! - Backends: process-local memory and Redis

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{memory::MemoryBackend, redis::RedisBackend};
pub use error::{KvError, KvResult};
pub use traits::KeyValueStore;

use keyward_core::config::CacheConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a cache from configuration.
///
/// The memory backend gets a background sweeper, so this must run inside a
/// Tokio runtime.
pub async fn from_config(config: &CacheConfig) -> KvResult<Arc<dyn KeyValueStore>> {
    config.validate().map_err(KvError::Config)?;

    match config {
        CacheConfig::Memory {
            sweep_interval_secs,
        } => {
            let backend = Arc::new(MemoryBackend::new());
            backend.spawn_sweeper(Duration::from_secs(*sweep_interval_secs));
            Ok(backend as Arc<dyn KeyValueStore>)
        }
        CacheConfig::Redis {
            url,
            connect_timeout_ms,
        } => {
            let backend =
                RedisBackend::new(url, Duration::from_millis(*connect_timeout_ms)).await?;
            Ok(Arc::new(backend))
        }
    }
}
