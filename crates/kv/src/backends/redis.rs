//! Redis cache backend.

use crate::error::{KvError, KvResult};
use crate::traits::KeyValueStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Cache backed by Redis (or any RESP-compatible server).
///
/// Shared by every instance pointing at the same server, so all of them see
/// each other's IN_PROGRESS and COMPLETED entries.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the server at `url`.
    ///
    /// The connection manager reconnects on its own after the initial
    /// connection succeeds.
    pub async fn new(url: &str, connect_timeout: Duration) -> KvResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                KvError::Unavailable(format!(
                    "timed out after {}ms connecting to redis",
                    connect_timeout.as_millis()
                ))
            })??;

        tracing::info!("Connected to redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisBackend {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        if ttl_secs == 0 {
            return Err(KvError::InvalidTtl(format!(
                "TTL for '{key}' must be at least 1 second"
            )));
        }
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(KvError::Unavailable(format!(
                "unexpected PING reply: {pong}"
            )));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
