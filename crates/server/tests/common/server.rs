//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use keyward_core::config::AppConfig;
use keyward_kv::{KeyValueStore, MemoryBackend};
use keyward_metadata::{MetadataStore, SqliteStore};
use keyward_server::events::{EventPublisher, TracingEventPublisher};
use keyward_server::{AppState, create_router};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Status, headers and decoded JSON body of a response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server backed by a temporary SQLite file and an in-memory cache.
    pub async fn new() -> Self {
        Self::build(|_| {}, Arc::new(MemoryBackend::new()), Arc::new(TracingEventPublisher))
            .await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, Arc::new(MemoryBackend::new()), Arc::new(TracingEventPublisher))
            .await
    }

    /// Create a test server using the given cache.
    pub async fn with_cache(cache: Arc<dyn KeyValueStore>) -> Self {
        Self::build(|_| {}, cache, Arc::new(TracingEventPublisher)).await
    }

    /// Create a test server using the given event publisher.
    pub async fn with_events(events: Arc<dyn EventPublisher>) -> Self {
        Self::build(|_| {}, Arc::new(MemoryBackend::new()), events).await
    }

    async fn build<F>(
        modifier: F,
        cache: Arc<dyn KeyValueStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing(db_path);
        modifier(&mut config);

        let state = AppState::with_events(config, metadata, cache, events);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Send a request with optional JSON body and extra headers.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        send_request(&self.router, method, uri, body, headers).await
    }

    /// POST a JSON body with an idempotency key.
    pub async fn post_with_key(&self, uri: &str, body: Value, key: &str) -> TestResponse {
        self.send("POST", uri, Some(body), &[("Idempotency-Key", key)])
            .await
    }
}

/// Send a request through the router without a network listener.
#[allow(dead_code)]
pub async fn send_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);

    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
    };

    TestResponse {
        status,
        headers,
        body,
    }
}
