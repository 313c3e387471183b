//! Application state shared across handlers.

use crate::events::{EventPublisher, TracingEventPublisher};
use crate::metrics::PrometheusObserver;
use keyward_core::config::AppConfig;
use keyward_idempotency::{IdempotencyCoordinator, Interceptor};
use keyward_kv::KeyValueStore;
use keyward_metadata::{IdempotencyRepo, MetadataStore};
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<AppConfig>,
    /// Durable store for idempotency records and articles.
    pub metadata: Arc<dyn MetadataStore>,
    /// Volatile cache in front of the idempotency records.
    pub cache: Arc<dyn KeyValueStore>,
    /// Runs idempotent routes under the coordinator.
    pub interceptor: Interceptor,
    /// Destination for domain events.
    pub events: Arc<dyn EventPublisher>,
}

impl AppState {
    /// Create new application state with the logging event publisher.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_events(config, metadata, cache, Arc::new(TracingEventPublisher))
    }

    /// Create new application state with a specific event publisher.
    pub fn with_events(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<dyn KeyValueStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let records: Arc<dyn IdempotencyRepo> = metadata.clone();
        let coordinator =
            IdempotencyCoordinator::from_config(records, cache.clone(), &config.idempotency);
        let interceptor =
            Interceptor::new(Arc::new(coordinator)).with_observer(Arc::new(PrometheusObserver));

        Self {
            config: Arc::new(config),
            metadata,
            cache,
            interceptor,
            events,
        }
    }

    pub fn coordinator(&self) -> &Arc<IdempotencyCoordinator> {
        self.interceptor.coordinator()
    }
}
