//! Article persistence.
//!
//! The pipeline only talks to the [`ArticleStore`] trait. Articles are
//! identified by their [`NaturalKey`] `(title, source, url)`; upserting the
//! same key twice never creates a second record.
//!
//! [`MemoryStore`] is the provided implementation: a map behind a
//! `tokio::sync::RwLock`, with JSON snapshot load/save so state survives
//! between runs.

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{Article, ArticleFields, NaturalKey, UpsertStatus};
use chrono::{DateTime, Utc};
use itertools::Itertools;

/// Default and maximum number of articles returned by a query.
pub const DEFAULT_QUERY_LIMIT: usize = 200;

/// Storage for canonical articles.
///
/// `upsert` must be atomic per key: concurrent upserts of the same key
/// result in exactly one record, last writer wins.
pub trait ArticleStore {
    /// Create the article identified by `key`, or refresh its fields.
    async fn upsert(&self, key: NaturalKey, fields: ArticleFields) -> Result<(Article, UpsertStatus), StoreError>;

    async fn count(&self) -> usize;

    /// Matching articles, newest first.
    async fn query(&self, query: &ArticleQuery) -> Vec<Article>;

    /// Distinct sources, sorted.
    async fn sources(&self) -> Vec<String>;

    /// Distinct categories, sorted.
    async fn categories(&self) -> Vec<String>;
}

/// Filters for [`ArticleStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleQuery {
    /// Inclusive lower bound on `published_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `published_at`.
    pub to: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub limit: usize,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            source: None,
            category: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl ArticleQuery {
    pub fn matches(&self, article: &Article) -> bool {
        self.from.is_none_or(|from| article.published_at >= from)
            && self.to.is_none_or(|to| article.published_at <= to)
            && self.source.as_deref().is_none_or(|s| article.source == s)
            && self.category.as_deref().is_none_or(|c| article.category == c)
    }

    /// Filter, order newest-first (ties broken by URL) and truncate.
    pub fn apply<'a, I>(&self, articles: I) -> Vec<Article>
    where
        I: IntoIterator<Item = &'a Article>,
    {
        articles
            .into_iter()
            .filter(|a| self.matches(a))
            .sorted_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)))
            .take(self.limit.min(DEFAULT_QUERY_LIMIT))
            .cloned()
            .collect()
    }
}

/// Sorted distinct values of one article field.
pub(crate) fn distinct<'a, I, F>(articles: I, field: F) -> Vec<String>
where
    I: IntoIterator<Item = &'a Article>,
    F: Fn(&Article) -> &str,
{
    articles
        .into_iter()
        .map(|a| field(a).to_string())
        .sorted()
        .dedup()
        .collect()
}
