//! Ingestion orchestration.
//!
//! [`IngestionOrchestrator`] drives the whole pipeline for a set of
//! [`FeedSource`]s:
//!
//! 1. Skip inactive sources
//! 2. Fetch and parse every active source, `concurrency` at a time
//! 3. Upsert each normalized entry keyed by `(title, source, url)`
//! 4. Stamp `last_fetched` on every attempted source, success or not
//! 5. Return an [`IngestionReport`]; a failing source never aborts the batch
//!
//! A [`CancellationToken`] aborts in-flight sources promptly. Sources cut
//! short this way are reported as failed with [`IngestError::Cancelled`];
//! articles they already upserted stay upserted.

use crate::error::IngestError;
use crate::feeds::FeedFormatParser;
use crate::fetch::Fetch;
use crate::models::{
    Article, ArticleFields, DEFAULT_CATEGORY, DEFAULT_SUMMARY, FeedItem, FeedSource, IngestionReport, NaturalKey,
    SourceOutcome, SourceStats, UpsertStatus,
};
use crate::store::ArticleStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Tuning for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Sources processed concurrently.
    pub concurrency: usize,
    /// Fetch and extract every entry's page, regardless of per-source flags.
    pub full_content: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            full_content: false,
        }
    }
}

pub struct IngestionOrchestrator<F, S> {
    parser: FeedFormatParser<F>,
    store: S,
    settings: IngestSettings,
    cancel: CancellationToken,
}

impl<F: Fetch, S: ArticleStore> IngestionOrchestrator<F, S> {
    pub fn new(parser: FeedFormatParser<F>, store: S, settings: IngestSettings) -> Self {
        Self {
            parser,
            store,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tied to a deadline or Ctrl-C.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Ingest every active source and report per-source outcomes.
    ///
    /// # Arguments
    ///
    /// * `sources` - Feed sources; `last_fetched` is updated in place for
    ///   every attempted source
    ///
    /// # Returns
    ///
    /// The aggregate [`IngestionReport`]. This call itself never fails.
    #[instrument(level = "info", skip_all, fields(sources = sources.len(), concurrency = self.settings.concurrency))]
    pub async fn run_ingestion(&self, sources: &mut [FeedSource]) -> IngestionReport {
        let t0 = Instant::now();
        let mut report = IngestionReport::default();

        let jobs: Vec<(usize, FeedSource)> = sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active)
            .map(|(idx, s)| (idx, s.clone()))
            .collect();
        report.skipped = sources.len() - jobs.len();
        if report.skipped > 0 {
            info!(skipped = report.skipped, "Skipping inactive sources");
        }

        let outcomes: Vec<(usize, SourceOutcome)> = stream::iter(jobs)
            .map(|(idx, source)| async move { (idx, self.ingest_source(&source).await) })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (idx, outcome) in outcomes {
            sources[idx].last_fetched = Some(outcome.fetched_at);
            report.record(outcome);
        }
        // Completion order is arbitrary; report in configuration order.
        report.outcomes.sort_by_key(|o| {
            sources
                .iter()
                .position(|s| s.url == o.url)
                .unwrap_or(usize::MAX)
        });

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            upserted = report.articles_upserted,
            created = report.articles_created,
            updated = report.articles_updated,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Ingestion finished"
        );
        report
    }

    /// Run one source to completion or cancellation and capture the outcome.
    async fn ingest_source(&self, source: &FeedSource) -> SourceOutcome {
        let name = source.display_name();
        let full_content = self.settings.full_content || source.full_content;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            r = self.fetch_and_store(source, &name, full_content) => r,
        };

        match &result {
            Ok(stats) => info!(
                source = %name,
                url = %source.url,
                entries = stats.entries,
                created = stats.created,
                updated = stats.updated,
                unchanged = stats.unchanged,
                rejected = stats.rejected,
                "Source ingested"
            ),
            Err(IngestError::Cancelled) => warn!(source = %name, url = %source.url, "Source cancelled"),
            Err(e) => error!(source = %name, url = %source.url, error = %e, "Source failed"),
        }

        SourceOutcome {
            url: source.url.clone(),
            name,
            fetched_at: Utc::now(),
            result,
        }
    }

    async fn fetch_and_store(&self, source: &FeedSource, name: &str, full_content: bool) -> Result<SourceStats, IngestError> {
        let items = self.parser.fetch_and_parse(source, full_content).await?;
        let mut stats = SourceStats {
            entries: items.len(),
            ..Default::default()
        };

        for item in items {
            let (key, fields) = into_record(item, name);
            let url = key.url.clone();
            match self.store.upsert(key, fields).await {
                Ok((_, UpsertStatus::Created)) => stats.created += 1,
                Ok((_, UpsertStatus::Updated)) => stats.updated += 1,
                Ok((_, UpsertStatus::Unchanged)) => stats.unchanged += 1,
                Err(e) => {
                    warn!(source = %name, %url, error = %e, "Rejected article");
                    stats.rejected += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Fetch one arbitrary article page, extract it and upsert it under the
    /// page's own site name.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the page has no extractable content.
    #[instrument(level = "info", skip(self))]
    pub async fn ingest_page(&self, url: &str) -> Result<Option<(Article, UpsertStatus)>, IngestError> {
        let extracted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
            r = self.parser.extractor().fetch_and_extract(self.parser.fetcher(), url, self.parser.page_timeout()) => r?,
        };
        let Some(page) = extracted else {
            warn!(%url, "No extractable content");
            return Ok(None);
        };

        let key = NaturalKey {
            title: page.title,
            source: page.source_name,
            url: page.origin_url,
        };
        let fields = ArticleFields {
            summary: DEFAULT_SUMMARY.to_string(),
            content: Some(page.body),
            category: DEFAULT_CATEGORY.to_string(),
            published: page.published_at,
        };
        let (article, status) = self.store.upsert(key, fields).await?;
        info!(title = %article.title, source = %article.source, ?status, "Page ingested");
        Ok(Some((article, status)))
    }
}

fn into_record(item: FeedItem, source: &str) -> (NaturalKey, ArticleFields) {
    let FeedItem {
        title,
        url,
        summary,
        category,
        published,
        content,
    } = item;
    (
        NaturalKey {
            title,
            source: source.to_string(),
            url,
        },
        ArticleFields {
            summary,
            content,
            category,
            published,
        },
    )
}
