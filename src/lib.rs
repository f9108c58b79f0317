//! # news_ingest
//!
//! Resilient, idempotent ingestion of news feeds and article pages.
//!
//! ## Features
//!
//! - Fetches RSS, Atom, generic XML and JSON feeds, detecting the format from
//!   the declared source format, the `Content-Type`, the URL or the payload
//! - Normalizes heterogeneous date strings to UTC, recording when a date had
//!   to be invented
//! - Extracts readable article bodies (`<h3>`/`<p>` blocks) plus title, date
//!   and site name from arbitrary HTML pages
//! - Upserts articles by their natural key `(title, source, url)`, so
//!   repeated runs never duplicate
//! - Ingests sources concurrently with per-fetch timeouts, retry with
//!   backoff and cooperative cancellation
//!
//! ## Architecture
//!
//! 1. **Configuration** ([`config`]): YAML or legacy text list → [`models::FeedSource`]s
//! 2. **Fetching** ([`fetch`]): the [`fetch::Fetch`] trait, `reqwest` client, retry decorator
//! 3. **Parsing** ([`feeds`]): format detection and per-format parsers → [`models::FeedItem`]s
//! 4. **Extraction** ([`extract`]): HTML page → [`models::ExtractedContent`]
//! 5. **Storage** ([`store`]): the [`store::ArticleStore`] trait and [`store::MemoryStore`]
//! 6. **Orchestration** ([`ingest`]): [`ingest::IngestionOrchestrator`] ties it together

pub mod cli;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod feeds;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod store;
pub mod utils;

pub use dates::{DateNormalizer, DateOrigin, NormalizedDate};
pub use error::{ConfigError, FetchError, FormatError, IngestError, StoreError};
pub use extract::HtmlContentExtractor;
pub use feeds::FeedFormatParser;
pub use ingest::{IngestSettings, IngestionOrchestrator};
pub use store::{ArticleQuery, ArticleStore, MemoryStore};
