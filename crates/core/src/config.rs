//! Configuration types shared across crates.

use crate::{DEFAULT_IDEMPOTENCY_TTL_SECS, MAX_IDEMPOTENCY_TTL_SECS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prefix under which the API routes are mounted.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_prefix.is_empty()
            && (!self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/'))
        {
            return Err(format!(
                "server.api_prefix '{}' must start with '/' and must not end with '/'",
                self.api_prefix
            ));
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Durable record store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single-instance deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// WARNING: Prefer KEYWARD_METADATA__PASSWORD over storing it in the config file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/keyward.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("metadata.max_connections must be at least 1".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Volatile cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Process-local cache. Not shared between instances.
    Memory {
        /// Interval between sweeps of expired entries.
        #[serde(default = "default_sweep_interval_secs")]
        sweep_interval_secs: u64,
    },
    /// Redis (or any RESP-compatible server).
    Redis {
        /// Connection URL, e.g. "redis://localhost:6379/0".
        url: String,
        /// Timeout for establishing the connection.
        #[serde(default = "default_redis_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_redis_connect_timeout_ms() -> u64 {
    2_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Memory {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CacheConfig::Memory {
                sweep_interval_secs,
            } => {
                // tokio::time::interval panics on a zero period
                if *sweep_interval_secs == 0 {
                    return Err("cache.sweep_interval_secs cannot be 0".to_string());
                }
                Ok(())
            }
            CacheConfig::Redis { url, .. } => {
                if url.trim().is_empty() {
                    return Err("redis cache config requires 'url'".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Idempotency coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Request header carrying the idempotency key.
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// TTL applied to cache entries when a route does not override it.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// TTL used by the article creation route.
    #[serde(default = "default_ttl_secs")]
    pub create_article_ttl_secs: u64,
    /// When set, an IN_PROGRESS record not updated for this many seconds may be
    /// reclaimed by a new claimant. Unset means records are never reclaimed.
    #[serde(default)]
    pub stale_claim_timeout_secs: Option<u64>,
    /// Largest response body captured for replay.
    #[serde(default = "default_max_replay_body_bytes")]
    pub max_replay_body_bytes: usize,
}

fn default_header_name() -> String {
    "idempotency-key".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL_SECS
}

fn default_max_replay_body_bytes() -> usize {
    1024 * 1024
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header_name: default_header_name(),
            default_ttl_secs: default_ttl_secs(),
            create_article_ttl_secs: default_ttl_secs(),
            stale_claim_timeout_secs: None,
            max_replay_body_bytes: default_max_replay_body_bytes(),
        }
    }
}

impl IdempotencyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.header_name.trim().is_empty() {
            return Err("idempotency.header_name cannot be empty".to_string());
        }
        if !self.header_name.bytes().all(is_header_token_byte) {
            return Err(format!(
                "idempotency.header_name '{}' is not a valid HTTP header name",
                self.header_name
            ));
        }
        if self.default_ttl_secs == 0 {
            return Err("idempotency.default_ttl_secs cannot be 0".to_string());
        }
        for (name, ttl) in [
            ("default_ttl_secs", self.default_ttl_secs),
            ("create_article_ttl_secs", self.create_article_ttl_secs),
        ] {
            if ttl > MAX_IDEMPOTENCY_TTL_SECS {
                return Err(format!(
                    "idempotency.{name} cannot exceed {MAX_IDEMPOTENCY_TTL_SECS} seconds"
                ));
            }
        }
        if self.stale_claim_timeout_secs == Some(0) {
            return Err(
                "idempotency.stale_claim_timeout_secs cannot be 0; omit it to disable reclaiming"
                    .to_string(),
            );
        }
        if self.max_replay_body_bytes == 0 {
            return Err("idempotency.max_replay_body_bytes cannot be 0".to_string());
        }
        Ok(())
    }

    pub fn stale_claim_timeout(&self) -> Option<Duration> {
        self.stale_claim_timeout_secs.map(Duration::from_secs)
    }
}

/// RFC 9110 token characters.
fn is_header_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

impl AppConfig {
    /// Validate every section, returning the first error.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.metadata.validate()?;
        self.cache.validate()?;
        self.idempotency.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite at `db_path` and the in-memory cache.
    pub fn for_testing(db_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata: MetadataConfig::Sqlite {
                path: db_path.into(),
                query_timeout_secs: None,
            },
            ..Default::default()
        }
    }
}
