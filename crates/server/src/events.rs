//! Domain events emitted after successful writes.
//!
//! Publication is fire-and-forget: a failed publish is logged and never fails
//! the request that produced the event.

use async_trait::async_trait;
use keyward_core::Article;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Event published once an article has been stored.
///
/// Serialized as the versioned envelope downstream consumers read:
/// `{event, version, event_id, data}`. Consumers deduplicate on `event_id`,
/// so every publication of a new article gets a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsCreated {
    pub event: &'static str,
    pub version: u32,
    pub event_id: Uuid,
    pub data: NewsPayload,
}

/// The stored article, as carried in [`NewsCreated`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPayload {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub source: String,
    pub author: String,
    pub link: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl NewsCreated {
    pub const NAME: &'static str = "news.created";
    pub const VERSION: u32 = 1;
}

impl From<&Article> for NewsCreated {
    fn from(article: &Article) -> Self {
        Self {
            event: Self::NAME,
            version: Self::VERSION,
            event_id: Uuid::new_v4(),
            data: NewsPayload {
                id: article.id,
                title: article.title.clone(),
                content: article.content.clone(),
                source: article.source.clone(),
                author: article.author.clone(),
                link: article.link.clone(),
                created_at: article.created_at,
                updated_at: article.updated_at,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Destination for domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &NewsCreated) -> Result<(), PublishError>;
}

/// Publishes events to the log. Used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &NewsCreated) -> Result<(), PublishError> {
        let payload =
            serde_json::to_string(event).map_err(|e| PublishError(e.to_string()))?;
        tracing::info!(
            event = event.event,
            event_id = %event.event_id,
            payload = %payload,
            "Event published"
        );
        Ok(())
    }
}

/// Publish without blocking the caller; failures are only logged.
pub fn publish_detached(publisher: std::sync::Arc<dyn EventPublisher>, event: NewsCreated) {
    tokio::spawn(async move {
        if let Err(e) = publisher.publish(&event).await {
            tracing::warn!(
                event = event.event,
                event_id = %event.event_id,
                article_id = %event.data.id,
                error = %e,
                "Failed to publish event"
            );
        }
    });
}
