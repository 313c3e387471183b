//! Test fixtures and doubles.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use async_trait::async_trait;
use keyward_kv::{KeyValueStore, KvError, KvResult};
use keyward_server::events::{EventPublisher, NewsCreated, PublishError};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique article links.
static ARTICLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A valid article body with a link no other call returns.
#[allow(dead_code)]
pub fn new_article_json(source: &str) -> Value {
    let n = ARTICLE_COUNTER.fetch_add(1, Ordering::SeqCst);
    json!({
        "title": format!("Headline {n}"),
        "content": "Body text",
        "source": source,
        "author": "Jane Doe",
        "link": format!("https://news.example.com/articles/{n}"),
    })
}

/// Cache that fails every operation, as if the server were unreachable.
#[allow(dead_code)]
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

/// Publisher that records every event it receives.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingPublisher {
    events: Mutex<Vec<NewsCreated>>,
}

#[allow(dead_code)]
impl RecordingPublisher {
    pub fn events(&self) -> Vec<NewsCreated> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &NewsCreated) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Publisher that always fails.
#[allow(dead_code)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: &NewsCreated) -> Result<(), PublishError> {
        Err(PublishError("broker unreachable".to_string()))
    }
}
