//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, is_unique_violation};
use crate::models::*;
use crate::repos::{ArticleRepo, IdempotencyRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use keyward_core::SortOrder;
use keyward_core::config::PgSslMode;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
///
/// The store to use when several coordinator instances share one database.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password come from the environment instead of a URL in the
    /// config file.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl IdempotencyRepo for PostgresStore {
    async fn find_idempotency_record(
        &self,
        idempotency_key: &str,
        resource_action: &str,
    ) -> MetadataResult<Option<IdempotencyRecordRow>> {
        let row = sqlx::query_as::<_, IdempotencyRecordRow>(
            "SELECT * FROM idempotency_keys WHERE idempotency_key = $1 AND resource_action = $2",
        )
        .bind(idempotency_key)
        .bind(resource_action)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_idempotency_record(&self, record: &IdempotencyRecordRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (
                id, idempotency_key, resource_action, status, claim_token,
                response_code, response_body, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            SET status = 'COMPLETED', response_code = $1, response_body = $2, updated_at = $3
            WHERE idempotency_key = $4 AND resource_action = $5
              AND status = 'IN_PROGRESS' AND claim_token = $6
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
            WHERE idempotency_key = $1 AND resource_action = $2
              AND status = 'IN_PROGRESS' AND claim_token = $3
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
            SET updated_at = $1, claim_token = $2
            WHERE idempotency_key = $3 AND resource_action = $4
              AND status = 'IN_PROGRESS' AND updated_at = $5
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
impl ArticleRepo for PostgresStore {
    async fn create_article(&self, article: &ArticleRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, content, source, author, link, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        let row = sqlx::query_as::<_, ArticleRow>("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_article_by_link(&self, link: &str) -> MetadataResult<Option<ArticleRow>> {
        let row = sqlx::query_as::<_, ArticleRow>("SELECT * FROM articles WHERE link = $1")
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
            "SELECT * FROM articles WHERE ($1::TEXT IS NULL OR source = $1) \
             ORDER BY created_at {order}, id {order} LIMIT $2 OFFSET $3",
            order = order.as_sql()
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(source)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_articles(&self, source: Option<&str>) -> MetadataResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE ($1::TEXT IS NULL OR source = $1)")
                .bind(source)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
