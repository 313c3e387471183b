//! Article request, query and response types.

use crate::Error;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 500;
const MAX_SOURCE_LEN: usize = 200;
const MAX_AUTHOR_LEN: usize = 200;

/// Default page size for article listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Maximum page size for article listings.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Request body for creating an article.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub source: String,
    pub author: String,
    /// Canonical URL of the article. Unique across all articles.
    pub link: String,
}

impl NewArticle {
    /// Validate field lengths and the link URL.
    pub fn validate(&self) -> crate::Result<()> {
        check_text("title", &self.title, Some(MAX_TITLE_LEN))?;
        check_text("content", &self.content, None)?;
        check_text("source", &self.source, Some(MAX_SOURCE_LEN))?;
        check_text("author", &self.author, Some(MAX_AUTHOR_LEN))?;

        let link = url::Url::parse(&self.link)
            .map_err(|e| Error::validation("link", format!("not a valid URL: {e}")))?;
        if !matches!(link.scheme(), "http" | "https") || link.host_str().is_none() {
            return Err(Error::validation(
                "link",
                "must be an absolute http or https URL",
            ));
        }
        Ok(())
    }
}

fn check_text(field: &'static str, value: &str, max_chars: Option<usize>) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if let Some(max) = max_chars
        && value.chars().count() > max
    {
        return Err(Error::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

/// Sort order on creation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query parameters for listing articles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArticleQuery {
    /// Only return articles from this source.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default, alias = "sortOrder")]
    pub sort_order: SortOrder,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            source: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            sort_order: SortOrder::default(),
        }
    }
}

impl ArticleQuery {
    pub fn validate(&self) -> crate::Result<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(Error::validation(
                "limit",
                format!("must be between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        Ok(())
    }

    /// 1-indexed page number derived from offset and limit.
    pub fn page(&self) -> u32 {
        self.offset / self.limit.max(1) + 1
    }
}

/// A stored article.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Article {
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

impl Article {
    /// Build a new article with a fresh ID and timestamps.
    pub fn create(new: NewArticle) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            source: new.source,
            author: new.author,
            link: new.link,
            created_at: now,
            updated_at: now,
        }
    }
}
