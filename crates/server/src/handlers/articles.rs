//! Article endpoints.

use crate::error::{ApiError, ApiResult};
use crate::events::{NewsCreated, publish_detached};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use keyward_core::{Article, ArticleQuery, NewArticle};
use keyward_metadata::{ArticleRepo, ArticleRow, MetadataError};
use serde::Serialize;
use uuid::Uuid;

/// Maximum request body size for article writes (1 MiB).
const MAX_ARTICLE_BODY_SIZE: usize = 1024 * 1024;

/// Response body for a created article.
#[derive(Debug, Serialize)]
pub struct CreateArticleResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub id: Uuid,
}

/// One page of articles.
#[derive(Debug, Serialize)]
pub struct ArticlePage {
    pub data: Vec<Article>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// POST {prefix}/articles - Store a new article.
pub async fn create_article(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateArticleResponse>)> {
    let body: NewArticle = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_ARTICLE_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };
    body.validate()?;

    if state.metadata.get_article_by_link(&body.link).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "an article with link '{}' already exists",
            body.link
        )));
    }

    let article = Article::create(body);
    match state.metadata.create_article(&ArticleRow::from(&article)).await {
        Ok(()) => {}
        // Lost a race with a concurrent insert of the same link.
        Err(MetadataError::AlreadyExists(_)) => {
            return Err(ApiError::Conflict(format!(
                "an article with link '{}' already exists",
                article.link
            )));
        }
        Err(e) => return Err(e.into()),
    }

    metrics::ARTICLES_CREATED.inc();
    tracing::info!(article_id = %article.id, source = %article.source, "Article created");

    publish_detached(state.events.clone(), NewsCreated::from(&article));

    Ok((
        StatusCode::CREATED,
        Json(CreateArticleResponse {
            status: "ok",
            message: "News stored and queued",
            id: article.id,
        }),
    ))
}

/// GET {prefix}/articles - List articles, newest first by default.
pub async fn list_articles(
    State(state): State<AppState>,
    query: Result<Query<ArticleQuery>, QueryRejection>,
) -> ApiResult<Json<ArticlePage>> {
    let Query(query) =
        query.map_err(|e| ApiError::BadRequest(format!("invalid query: {e}")))?;
    query.validate()?;

    let source = query.source.as_deref().filter(|s| !s.is_empty());
    let rows = state
        .metadata
        .list_articles(source, query.sort_order, query.limit, query.offset)
        .await?;
    let total = state.metadata.count_articles(source).await?;

    Ok(Json(ArticlePage {
        data: rows.into_iter().map(Article::from).collect(),
        page: query.page(),
        limit: query.limit,
        total,
    }))
}

/// GET {prefix}/articles/{id} - Fetch one article.
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Article>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("invalid article id: {id}")))?;

    let row = state
        .metadata
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("article {id} not found")))?;

    Ok(Json(Article::from(row)))
}
