//! In-memory [`ArticleStore`] with JSON snapshot persistence.

use super::snapshot::{read_snapshot, write_snapshot};
use super::{ArticleQuery, ArticleStore, distinct};
use crate::error::StoreError;
use crate::models::{Article, ArticleFields, NaturalKey, UpsertStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

/// Articles keyed by `(title, source, url)`.
///
/// The write lock is held across lookup and insert/update, which makes each
/// upsert atomic per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: RwLock<HashMap<NaturalKey, Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously saved articles. Later duplicates of a
    /// key replace earlier ones.
    pub fn from_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let map = articles.into_iter().map(|a| (a.key(), a)).collect();
        Self {
            articles: RwLock::new(map),
        }
    }

    /// Load the snapshot at `path`; a missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_articles(read_snapshot(path).await?))
    }

    /// Write every article to `path`, newest first.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let articles = {
            let guard = self.articles.read().await;
            let mut all: Vec<Article> = guard.values().cloned().collect();
            all.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)));
            all
        };
        write_snapshot(path, &articles).await
    }
}

fn validate_url(url: &str) -> Result<(), StoreError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => Ok(()),
        _ => Err(StoreError::InvalidUrl(url.to_string())),
    }
}

/// Apply `fields` to an existing article. Returns whether anything changed.
///
/// A fallback date never replaces a stored date, and absent content leaves
/// stored content alone.
fn refresh(article: &mut Article, fields: ArticleFields) -> bool {
    let mut changed = false;
    if article.summary != fields.summary {
        article.summary = fields.summary;
        changed = true;
    }
    if article.category != fields.category {
        article.category = fields.category;
        changed = true;
    }
    if let Some(content) = fields.content {
        if article.content.as_deref() != Some(content.as_str()) {
            article.content = Some(content);
            changed = true;
        }
    }
    let incoming_fallback = fields.published.is_fallback();
    if !incoming_fallback && (article.published_at != fields.published.instant || article.published_at_is_fallback) {
        article.published_at = fields.published.instant;
        article.published_at_is_fallback = false;
        changed = true;
    }
    changed
}

impl ArticleStore for MemoryStore {
    #[instrument(level = "debug", skip_all, fields(url = %key.url, source = %key.source))]
    async fn upsert(&self, key: NaturalKey, fields: ArticleFields) -> Result<(Article, UpsertStatus), StoreError> {
        validate_url(&key.url)?;
        let now = Utc::now();
        let mut guard = self.articles.write().await;

        if let Some(existing) = guard.get_mut(&key) {
            if refresh(existing, fields) {
                existing.updated_at = now;
                debug!("Updated article");
                return Ok((existing.clone(), UpsertStatus::Updated));
            }
            return Ok((existing.clone(), UpsertStatus::Unchanged));
        }

        let article = Article {
            title: key.title.clone(),
            url: key.url.clone(),
            source: key.source.clone(),
            summary: fields.summary,
            content: fields.content,
            category: fields.category,
            published_at: fields.published.instant,
            published_at_is_fallback: fields.published.is_fallback(),
            created_at: now,
            updated_at: now,
        };
        guard.insert(key, article.clone());
        debug!("Created article");
        Ok((article, UpsertStatus::Created))
    }

    async fn count(&self) -> usize {
        self.articles.read().await.len()
    }

    async fn query(&self, query: &ArticleQuery) -> Vec<Article> {
        query.apply(self.articles.read().await.values())
    }

    async fn sources(&self) -> Vec<String> {
        distinct(self.articles.read().await.values(), |a| a.source.as_str())
    }

    async fn categories(&self) -> Vec<String> {
        distinct(self.articles.read().await.values(), |a| a.category.as_str())
    }
}
