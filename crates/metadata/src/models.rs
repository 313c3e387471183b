//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use keyward_core::{Article, IdempotencyScope, IdempotencyStatus, StoredResponse};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Idempotency records
// =============================================================================

/// Durable record of an admitted operation.
///
/// At most one row exists per (idempotency_key, resource_action).
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecordRow {
    pub id: Uuid,
    pub idempotency_key: String,
    pub resource_action: String,
    /// "IN_PROGRESS" or "COMPLETED".
    pub status: String,
    /// Fencing token of the current owner. Replaced when a stale claim is
    /// taken over, so the previous owner can no longer complete or release it.
    pub claim_token: Uuid,
    /// Set only once the record is COMPLETED.
    pub response_code: Option<i32>,
    pub response_body: Option<Json<Value>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl IdempotencyRecordRow {
    /// A fresh IN_PROGRESS row for the given scope.
    pub fn claim(scope: &IdempotencyScope) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            idempotency_key: scope.key.as_str().to_string(),
            resource_action: scope.resource_action.as_str().to_string(),
            status: IdempotencyStatus::InProgress.as_str().to_string(),
            claim_token: Uuid::new_v4(),
            response_code: None,
            response_body: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> MetadataResult<IdempotencyStatus> {
        self.status.parse().map_err(|_| {
            MetadataError::CorruptRow(format!(
                "idempotency record {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }

    /// The stored response snapshot, if this record is completed.
    pub fn stored_response(&self) -> MetadataResult<Option<StoredResponse>> {
        if self.status()? != IdempotencyStatus::Completed {
            return Ok(None);
        }
        let status_code = match self.response_code {
            Some(code) => u16::try_from(code).map_err(|_| {
                MetadataError::CorruptRow(format!(
                    "idempotency record {} has out-of-range response code {}",
                    self.id, code
                ))
            })?,
            None => 200,
        };
        Ok(Some(StoredResponse {
            status_code,
            body: self.response_body.as_ref().map(|body| body.0.clone()),
        }))
    }
}

// =============================================================================
// Articles
// =============================================================================

/// Article record.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub source: String,
    pub author: String,
    /// Unique.
    pub link: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<&Article> for ArticleRow {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            content: article.content.clone(),
            source: article.source.clone(),
            author: article.author.clone(),
            link: article.link.clone(),
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            source: row.source,
            author: row.author,
            link: row.link,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
