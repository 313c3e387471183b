//! Keyward server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use keyward_core::config::AppConfig;
use keyward_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keyward - idempotent request coordinator
#[derive(Parser, Debug)]
#[command(name = "keywardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "KEYWARD_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `KEYWARD_` env vars.
///
/// Every section has defaults, so a missing file with no env vars yields a
/// working single-instance setup (SQLite + in-memory cache).
fn load_config(config_path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if Path::new(config_path).exists() {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::info!(
            config_path = %config_path,
            "No config file found, using defaults and environment variables"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("KEYWARD_").split("__").ignore(&["config"]))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Keyward v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    // Register Prometheus metrics
    keyward_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize metadata store (authoritative for idempotency records)
    let metadata = keyward_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!(backend = metadata.backend_name(), "Metadata store initialized");

    // Initialize cache. Runtime cache failures are tolerated, but a cache that
    // cannot be configured at all is a startup error.
    let cache = keyward_kv::from_config(&config.cache)
        .await
        .context("failed to initialize cache")?;
    if let Err(e) = cache.health_check().await {
        tracing::warn!(
            backend = cache.backend_name(),
            error = %e,
            "Cache health check failed; serving from the metadata store until it recovers"
        );
    } else {
        tracing::info!(backend = cache.backend_name(), "Cache initialized");
    }

    if let Some(timeout) = config.idempotency.stale_claim_timeout() {
        tracing::info!(
            timeout_secs = timeout.as_secs(),
            "Stale idempotency claims will be reclaimed"
        );
    }

    let state = AppState::new(config.clone(), metadata, cache);
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
