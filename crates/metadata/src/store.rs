//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ArticleRepo, IdempotencyRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: IdempotencyRepo + ArticleRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if missing.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers, so the unique index decides
            // every concurrent claim without "database is locked" failures.
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(query_timeout_secs.unwrap_or(30)))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::is_unique_violation;
    use crate::models::*;
    use keyward_core::SortOrder;
    use serde_json::Value;
    use sqlx::types::Json;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl IdempotencyRepo for SqliteStore {
        async fn find_idempotency_record(
            &self,
            idempotency_key: &str,
            resource_action: &str,
        ) -> MetadataResult<Option<IdempotencyRecordRow>> {
            let row = sqlx::query_as::<_, IdempotencyRecordRow>(
                "SELECT * FROM idempotency_keys WHERE idempotency_key = ? AND resource_action = ?",
            )
            .bind(idempotency_key)
            .bind(resource_action)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn insert_idempotency_record(
            &self,
            record: &IdempotencyRecordRow,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO idempotency_keys (
                    id, idempotency_key, resource_action, status, claim_token,
                    response_code, response_body, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.id)
            .bind(&record.idempotency_key)
            .bind(&record.resource_action)
            .bind(&record.status)
            .bind(record.claim_token)
            .bind(record.response_code)
            .bind(&record.response_body)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MetadataError::UniqueViolation(format!(
                        "{}:{}",
                        record.resource_action, record.idempotency_key
                    ))
                } else {
                    MetadataError::Database(e)
                }
            })?;
            Ok(())
        }

        async fn complete_idempotency_record(
            &self,
            idempotency_key: &str,
            resource_action: &str,
            claim_token: Uuid,
            response_code: i32,
            response_body: Option<&Value>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE idempotency_keys
                SET status = 'COMPLETED', response_code = ?, response_body = ?, updated_at = ?
                WHERE idempotency_key = ? AND resource_action = ?
                  AND status = 'IN_PROGRESS' AND claim_token = ?
                "#,
            )
            .bind(response_code)
            .bind(response_body.map(Json))
            .bind(updated_at)
            .bind(idempotency_key)
            .bind(resource_action)
            .bind(claim_token)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn delete_idempotency_record(
            &self,
            idempotency_key: &str,
            resource_action: &str,
            claim_token: Uuid,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                DELETE FROM idempotency_keys
                WHERE idempotency_key = ? AND resource_action = ?
                  AND status = 'IN_PROGRESS' AND claim_token = ?
                "#,
            )
            .bind(idempotency_key)
            .bind(resource_action)
            .bind(claim_token)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn reclaim_stale_idempotency_record(
            &self,
            idempotency_key: &str,
            resource_action: &str,
            observed_updated_at: OffsetDateTime,
            claim_token: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE idempotency_keys
                SET updated_at = ?, claim_token = ?
                WHERE idempotency_key = ? AND resource_action = ?
                  AND status = 'IN_PROGRESS' AND updated_at = ?
                "#,
            )
            .bind(now)
            .bind(claim_token)
            .bind(idempotency_key)
            .bind(resource_action)
            .bind(observed_updated_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    #[async_trait]
    impl ArticleRepo for SqliteStore {
        async fn create_article(&self, article: &ArticleRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO articles (id, title, content, source, author, link, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(article.id)
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.source)
            .bind(&article.author)
            .bind(&article.link)
            .bind(article.created_at)
            .bind(article.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MetadataError::AlreadyExists(format!(
                        "article with link '{}' already exists",
                        article.link
                    ))
                } else {
                    MetadataError::Database(e)
                }
            })?;
            Ok(())
        }

        async fn get_article(&self, id: Uuid) -> MetadataResult<Option<ArticleRow>> {
            let row = sqlx::query_as::<_, ArticleRow>("SELECT * FROM articles WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_article_by_link(&self, link: &str) -> MetadataResult<Option<ArticleRow>> {
            let row = sqlx::query_as::<_, ArticleRow>("SELECT * FROM articles WHERE link = ?")
                .bind(link)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_articles(
            &self,
            source: Option<&str>,
            order: SortOrder,
            limit: u32,
            offset: u32,
        ) -> MetadataResult<Vec<ArticleRow>> {
            let sql = format!(
                "SELECT * FROM articles WHERE (? IS NULL OR source = ?) \
                 ORDER BY created_at {order}, id {order} LIMIT ? OFFSET ?",
                order = order.as_sql()
            );
            let rows = sqlx::query_as::<_, ArticleRow>(&sql)
                .bind(source)
                .bind(source)
                .bind(i64::from(limit))
                .bind(i64::from(offset))
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_articles(&self, source: Option<&str>) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM articles WHERE (? IS NULL OR source = ?)",
            )
            .bind(source)
            .bind(source)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Idempotency records: at most one per (idempotency_key, resource_action)
CREATE TABLE IF NOT EXISTS idempotency_keys (
    id BLOB PRIMARY KEY,
    idempotency_key TEXT NOT NULL,
    resource_action TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('IN_PROGRESS', 'COMPLETED')),
    claim_token BLOB NOT NULL,
    response_code INTEGER,
    response_body TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_idempotency_keys_key_action
    ON idempotency_keys(idempotency_key, resource_action);

-- Articles
CREATE TABLE IF NOT EXISTS articles (
    id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL,
    author TEXT NOT NULL,
    link TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source);
CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at);
"#;
