//! Data models for feed sources, parsed entries and canonical articles.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`FeedSource`]: a configured feed URL with its declared format
//! - [`RawFeedEntry`]: one item exactly as a feed parser found it
//! - [`FeedItem`]: a normalized entry, ready to be upserted
//! - [`ExtractedContent`]: what the HTML extractor pulled out of a page
//! - [`Article`]: the canonical, persisted record
//! - [`IngestionReport`]: the aggregate outcome of one ingestion run
//!
//! Articles are identified by their [`NaturalKey`] of `(title, source, url)`.

use crate::dates::NormalizedDate;
use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned when a feed entry does not carry one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Summary stored when a feed entry has no description.
pub const DEFAULT_SUMMARY: &str = "No description available";

/// Content stored in full-content mode when the page yielded nothing usable.
pub const CONTENT_PLACEHOLDER: &str = "<p>Content unavailable.</p>";

/// Title used when neither the feed nor the page provides one.
pub const UNTITLED: &str = "Untitled Article";

/// The wire format of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedFormat {
    Rss,
    Atom,
    Xml,
    Json,
    #[default]
    Unknown,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedFormat::Rss => "RSS",
            FeedFormat::Atom => "ATOM",
            FeedFormat::Xml => "XML",
            FeedFormat::Json => "JSON",
            FeedFormat::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

fn default_true() -> bool {
    true
}

/// A configured feed.
///
/// Sources are created by configuration and are read-only to the pipeline,
/// except for `last_fetched`, which the orchestrator stamps after every
/// attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSource {
    /// Human-readable name, also used as the article `source` key component.
    /// When empty, the feed host is used instead.
    #[serde(default)]
    pub name: String,
    /// The feed URL. Unique across a configuration.
    pub url: String,
    /// Declared format; `UNKNOWN` means "detect it".
    #[serde(default)]
    pub format: FeedFormat,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Fetch and extract every entry's linked page.
    #[serde(default)]
    pub full_content: bool,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format: FeedFormat::Unknown,
            active: true,
            full_content: false,
            last_fetched: None,
        }
    }

    pub fn with_format(mut self, format: FeedFormat) -> Self {
        self.format = format;
        self
    }

    /// The name stored as the article `source`: the declared name, or the
    /// feed's host when no name was configured.
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        crate::utils::host_label(&self.url).unwrap_or_else(|| self.url.clone())
    }
}

/// One entry as found in a feed, before any normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeedEntry {
    pub title: String,
    pub link: String,
    pub raw_published: Option<String>,
    pub raw_summary: Option<String>,
    pub raw_category: Option<String>,
}

/// A normalized feed entry.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    /// Absolute http(s) URL.
    pub url: String,
    pub summary: String,
    pub category: String,
    pub published: NormalizedDate,
    /// Extracted page body, only present in full-content mode.
    pub content: Option<String>,
}

/// The result of running the HTML extractor over one page.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub title: String,
    /// Sanitized body: a sequence of `<h3>` and `<p>` blocks.
    pub body: String,
    pub source_name: String,
    pub published_at: NormalizedDate,
    pub origin_url: String,
}

/// The identity of an article for upsert purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub title: String,
    pub source: String,
    pub url: String,
}

/// The refreshable part of an article.
#[derive(Debug, Clone)]
pub struct ArticleFields {
    pub summary: String,
    /// `None` leaves any previously stored content untouched.
    pub content: Option<String>,
    pub category: String,
    pub published: NormalizedDate,
}

/// The canonical, persisted article record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub source: String,
    pub summary: String,
    #[serde(default)]
    pub content: Option<String>,
    pub category: String,
    pub published_at: DateTime<Utc>,
    /// `true` when `published_at` is the ingestion time because the feed or
    /// page carried no parseable date.
    #[serde(default)]
    pub published_at_is_fallback: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn key(&self) -> NaturalKey {
        NaturalKey {
            title: self.title.clone(),
            source: self.source.clone(),
            url: self.url.clone(),
        }
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Created,
    Updated,
    Unchanged,
}

/// Per-source counters for a successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub entries: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl SourceStats {
    pub fn upserted(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// The outcome of ingesting one source.
#[derive(Debug)]
pub struct SourceOutcome {
    pub url: String,
    pub name: String,
    pub fetched_at: DateTime<Utc>,
    pub result: Result<SourceStats, IngestError>,
}

/// Aggregate result of [`crate::ingest::IngestionOrchestrator::run_ingestion`].
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Inactive sources that were not attempted.
    pub skipped: usize,
    pub articles_upserted: usize,
    pub articles_created: usize,
    pub articles_updated: usize,
    pub outcomes: Vec<SourceOutcome>,
}

impl IngestionReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Every attempted source failed (and at least one was attempted).
    pub fn all_failed(&self) -> bool {
        self.attempted() > 0 && self.succeeded == 0
    }

    pub(crate) fn record(&mut self, outcome: SourceOutcome) {
        match &outcome.result {
            Ok(stats) => {
                self.succeeded += 1;
                self.articles_upserted += stats.upserted();
                self.articles_created += stats.created;
                self.articles_updated += stats.updated;
            }
            Err(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}
