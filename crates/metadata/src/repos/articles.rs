//! Article repository.

use crate::error::MetadataResult;
use crate::models::ArticleRow;
use async_trait::async_trait;
use keyward_core::SortOrder;
use uuid::Uuid;

/// Repository for article records.
#[async_trait]
pub trait ArticleRepo: Send + Sync {
    /// Create an article. Fails with `AlreadyExists` if the link is taken.
    async fn create_article(&self, article: &ArticleRow) -> MetadataResult<()>;

    async fn get_article(&self, id: Uuid) -> MetadataResult<Option<ArticleRow>>;

    async fn get_article_by_link(&self, link: &str) -> MetadataResult<Option<ArticleRow>>;

    /// List articles ordered by creation time, optionally filtered by source.
    async fn list_articles(
        &self,
        source: Option<&str>,
        order: SortOrder,
        limit: u32,
        offset: u32,
    ) -> MetadataResult<Vec<ArticleRow>>;

    /// Count articles, optionally filtered by source.
    async fn count_articles(&self, source: Option<&str>) -> MetadataResult<u64>;
}
