//! Feed fetching, format detection and entry normalization.
//!
//! # Pipeline
//!
//! ```text
//! fetch ──► feed-rs ──(linked entries)──────────────────────────► normalize
//!              │                                                     ▲
//!              └─(error / nothing)─► hint ─► format parser ──(ok)────┤
//!                                      │          │                  │
//!                                      │          └─(fail)─► sniffed parser
//!                                      └─(none)─► sniff                 │
//!                                                                 (fail)▼
//!                                                               FormatError
//! ```
//!
//! Format → parser is a lookup on [`FeedFormat`]:
//!
//! | Format | Parser |
//! |--------|--------|
//! | `RSS` | [`xml::parse_rss`] |
//! | `ATOM` | [`xml::parse_atom`] |
//! | `XML` | [`xml::parse_generic_xml`] |
//! | `JSON` | [`json::parse_json`] |
//! | `UNKNOWN` | none |
//!
//! In full-content mode every entry's page is fetched and run through the
//! [`HtmlContentExtractor`], a few pages at a time, keeping document order.

pub mod detect;
pub mod json;
pub mod structured;
pub mod xml;

use crate::dates::DateNormalizer;
use crate::error::{FormatError, IngestError};
use crate::extract::HtmlContentExtractor;
use crate::fetch::{Fetch, HttpSettings};
use crate::models::{
    CONTENT_PLACEHOLDER, DEFAULT_CATEGORY, DEFAULT_SUMMARY, ExtractedContent, FeedFormat, FeedItem, FeedSource,
    RawFeedEntry, UNTITLED,
};
use crate::utils::{absolutize_url, collapse_whitespace, truncate_for_log};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Signature shared by the format-specific parsers.
pub type ParseFn = fn(&[u8]) -> Result<Vec<RawFeedEntry>, FormatError>;

/// Pages fetched concurrently per source in full-content mode.
pub const DEFAULT_PAGE_CONCURRENCY: usize = 4;

impl FeedFormat {
    /// The parser for this format; `None` for [`FeedFormat::Unknown`].
    pub fn parser(self) -> Option<ParseFn> {
        match self {
            FeedFormat::Rss => Some(xml::parse_rss),
            FeedFormat::Atom => Some(xml::parse_atom),
            FeedFormat::Xml => Some(xml::parse_generic_xml),
            FeedFormat::Json => Some(json::parse_json),
            FeedFormat::Unknown => None,
        }
    }
}

/// Run the parser for `format`, keeping only entries that carry a link.
fn parse_as(format: FeedFormat, body: &[u8]) -> Result<Vec<RawFeedEntry>, FormatError> {
    let parse = format.parser().ok_or(FormatError::Unrecognized)?;
    let mut entries = parse(body)?;
    entries.retain(|e| !e.link.trim().is_empty());
    Ok(entries)
}

/// Turn a feed payload into raw entries.
///
/// `feed-rs` gets the first attempt. When it fails or finds nothing, the
/// format is taken from `declared` (unless `UNKNOWN`) or detected, and the
/// matching parser runs. If that fails and sniffing the payload names a
/// different format, that format is tried once.
///
/// # Errors
///
/// - [`FormatError::Unrecognized`] when no format could be determined
/// - [`FormatError::NoEntries`] when the payload parsed but held no linked entries
/// - the parser's own error otherwise
pub fn parse_entries(
    body: &[u8],
    declared: FeedFormat,
    content_type: Option<&str>,
    url: &str,
) -> Result<Vec<RawFeedEntry>, FormatError> {
    match structured::parse_structured(body) {
        Ok(entries) if !entries.is_empty() => return Ok(entries),
        Ok(_) => debug!(%url, "Structured parser found no linked entries"),
        Err(e) => debug!(%url, error = %truncate_for_log(&e, 200), "Structured parser failed"),
    }

    let hinted = match declared {
        FeedFormat::Unknown => detect::detect_format(body, content_type, url),
        declared => declared,
    };
    let first_attempt = match parse_as(hinted, body) {
        Ok(entries) if !entries.is_empty() => return Ok(entries),
        other => other,
    };

    let sniffed = detect::sniff_format(body);
    if sniffed != hinted && sniffed != FeedFormat::Unknown {
        debug!(%url, %hinted, %sniffed, "Hinted format failed; retrying with sniffed format");
        if let Ok(entries) = parse_as(sniffed, body) {
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
    }

    match first_attempt {
        Ok(_) => Err(FormatError::NoEntries(hinted)),
        Err(e) => Err(e),
    }
}

/// Normalize raw entries against the feed URL.
///
/// Links are resolved to absolute http(s) URLs; entries whose link cannot be
/// resolved are dropped. Missing fields get their defaults and every date
/// goes through [`DateNormalizer`].
pub fn normalize_entries(feed_url: &str, entries: Vec<RawFeedEntry>) -> Vec<FeedItem> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let Some(url) = absolutize_url(feed_url, &entry.link) else {
                warn!(feed = %feed_url, link = %entry.link, "Dropping entry with unusable link");
                return None;
            };
            Some(FeedItem {
                title: non_empty(&entry.title).unwrap_or_else(|| UNTITLED.to_string()),
                url,
                summary: entry
                    .raw_summary
                    .as_deref()
                    .and_then(non_empty)
                    .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
                category: entry
                    .raw_category
                    .as_deref()
                    .and_then(non_empty)
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                published: DateNormalizer::normalize_opt(entry.raw_published.as_deref()),
                content: None,
            })
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let collapsed = collapse_whitespace(s);
    if collapsed.is_empty() { None } else { Some(collapsed) }
}

/// Fold an extracted page into its feed item.
///
/// The feed's date wins when it was parsed; the page's date is used only
/// when the feed had none. A placeholder feed title is replaced by the
/// page's.
fn merge_page(mut item: FeedItem, page: ExtractedContent) -> FeedItem {
    if item.published.is_fallback() && !page.published_at.is_fallback() {
        item.published = page.published_at;
    }
    if item.title == UNTITLED && page.title != UNTITLED {
        item.title = page.title;
    }
    item.content = Some(page.body);
    item
}

/// Fetches a source, parses it and normalizes its entries.
pub struct FeedFormatParser<F> {
    fetcher: F,
    extractor: HtmlContentExtractor,
    feed_timeout: Duration,
    page_timeout: Duration,
    page_concurrency: usize,
}

impl<F: Fetch> FeedFormatParser<F> {
    pub fn new(fetcher: F, settings: &HttpSettings) -> Self {
        Self {
            fetcher,
            extractor: HtmlContentExtractor::new(),
            feed_timeout: settings.feed_timeout(),
            page_timeout: settings.page_timeout(),
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }

    pub fn with_page_concurrency(mut self, n: usize) -> Self {
        self.page_concurrency = n.max(1);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn extractor(&self) -> &HtmlContentExtractor {
        &self.extractor
    }

    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    /// Fetch `source` and return its normalized entries in document order.
    ///
    /// # Arguments
    ///
    /// * `source` - The feed to fetch; its declared format short-circuits detection
    /// * `full_content` - Also fetch and extract every entry's page
    ///
    /// # Errors
    ///
    /// [`IngestError::Fetch`] when the feed itself cannot be fetched and
    /// [`IngestError::Format`] when it cannot be parsed. Per-entry page
    /// failures never fail the source.
    #[instrument(level = "info", skip(self, source), fields(source = %source.display_name(), url = %source.url))]
    pub async fn fetch_and_parse(&self, source: &FeedSource, full_content: bool) -> Result<Vec<FeedItem>, IngestError> {
        let response = self.fetcher.get(&source.url, self.feed_timeout).await?;
        let entries = parse_entries(&response.body, source.format, response.content_type(), &source.url)?;
        let raw_count = entries.len();
        let items = normalize_entries(&source.url, entries);
        info!(entries = raw_count, kept = items.len(), "Parsed feed");

        if !full_content {
            return Ok(items);
        }
        Ok(self.attach_content(items).await)
    }

    /// Fetch and extract every item's page, `page_concurrency` at a time.
    ///
    /// Fetch failures drop the entry; pages with nothing extractable keep the
    /// entry with [`CONTENT_PLACEHOLDER`].
    async fn attach_content(&self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        let total = items.len();
        let enriched: Vec<FeedItem> = stream::iter(items)
            .map(|mut item| async move {
                match self
                    .extractor
                    .fetch_and_extract(&self.fetcher, &item.url, self.page_timeout)
                    .await
                {
                    Ok(Some(page)) => Some(merge_page(item, page)),
                    Ok(None) => {
                        debug!(url = %item.url, "Nothing extractable; storing placeholder content");
                        item.content = Some(CONTENT_PLACEHOLDER.to_string());
                        Some(item)
                    }
                    Err(e) => {
                        warn!(url = %item.url, error = %e, "Skipping entry; page fetch failed");
                        None
                    }
                }
            })
            .buffered(self.page_concurrency)
            .filter_map(|item| async move { item })
            .collect()
            .await;
        info!(pages = total, kept = enriched.len(), "Extracted page content");
        enriched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::NormalizedDate;
    use crate::error::FetchError;
    use crate::fetch::FetchResponse;
    use chrono::{TimeZone, Utc};
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use std::collections::HashMap;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>World</title>
  <item><title>A</title><link>https://example.com/a</link>
    <pubDate>Mon, 06 May 2024 10:00:00 GMT</pubDate></item>
  <item><title>B</title><link>/b</link>
    <pubDate>garbage</pubDate><category>Markets</category></item>
</channel></rss>"#;

    const GENERIC: &str = r#"<news>
  <article><headline>Local vote</headline><url>https://example.com/vote</url>
    <date>2024-05-06 09:30:00</date><section>Politics</section></article>
</news>"#;

    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, (Option<&'static str>, String)>,
    }

    impl StubFetcher {
        fn with(mut self, url: &str, content_type: Option<&'static str>, body: &str) -> Self {
            self.pages.insert(url.to_string(), (content_type, body.to_string()));
            self
        }
    }

    impl Fetch for StubFetcher {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            let Some((content_type, body)) = self.pages.get(url) else {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            };
            let mut headers = HeaderMap::new();
            if let Some(ct) = content_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            Ok(FetchResponse {
                status: 200,
                headers,
                body: body.as_bytes().to_vec(),
            })
        }
    }

    #[test]
    fn test_parser_lookup() {
        assert!(FeedFormat::Rss.parser().is_some());
        assert!(FeedFormat::Json.parser().is_some());
        assert!(FeedFormat::Unknown.parser().is_none());
    }

    #[test]
    fn test_parse_entries_generic_xml_by_sniffing() {
        let entries = parse_entries(GENERIC.as_bytes(), FeedFormat::Unknown, None, "https://example.com/feed").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Local vote");
        assert_eq!(entries[0].raw_category.as_deref(), Some("Politics"));
    }

    #[test]
    fn test_parse_entries_retries_sniffed_format_after_wrong_hint() {
        let entries = parse_entries(
            GENERIC.as_bytes(),
            FeedFormat::Unknown,
            Some("application/rss+xml"),
            "https://example.com/feed",
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.com/vote");
    }

    #[test]
    fn test_parse_entries_json_items() {
        let body = br#"{"items": [{"title": "J", "link": "https://example.com/j", "date": "2024-05-06"}]}"#;
        let entries = parse_entries(body, FeedFormat::Json, None, "https://example.com/feed").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.com/j");
    }

    #[test]
    fn test_parse_entries_unrecognized() {
        let err = parse_entries(b"just some text", FeedFormat::Unknown, None, "https://example.com/feed").unwrap_err();
        assert!(matches!(err, FormatError::Unrecognized));
    }

    #[test]
    fn test_parse_entries_no_entries() {
        let err = parse_entries(b"<news></news>", FeedFormat::Unknown, None, "https://example.com/feed").unwrap_err();
        assert!(matches!(err, FormatError::NoEntries(FeedFormat::Xml)));
    }

    #[test]
    fn test_normalize_entries_defaults_and_links() {
        let entries = vec![
            RawFeedEntry {
                title: "  ".into(),
                link: "/relative".into(),
                ..Default::default()
            },
            RawFeedEntry {
                title: "Bad".into(),
                link: "mailto:someone@example.com".into(),
                ..Default::default()
            },
        ];
        let items = normalize_entries("https://example.com/feeds/world.xml", entries);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, UNTITLED);
        assert_eq!(items[0].url, "https://example.com/relative");
        assert_eq!(items[0].summary, DEFAULT_SUMMARY);
        assert_eq!(items[0].category, DEFAULT_CATEGORY);
        assert!(items[0].published.is_fallback());
    }

    #[tokio::test]
    async fn test_fetch_and_parse_rss() {
        let fetcher = StubFetcher::default().with("https://example.com/rss", Some("application/rss+xml"), RSS);
        let parser = FeedFormatParser::new(fetcher, &HttpSettings::default());
        let source = FeedSource::new("World", "https://example.com/rss");

        let items = parser.fetch_and_parse(&source, false).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "A");
        assert_eq!(items[0].published.instant, Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        assert_eq!(items[1].url, "https://example.com/b");
        assert_eq!(items[1].category, "Markets");
        assert!(items[1].published.is_fallback());
        assert!(items.iter().all(|i| i.content.is_none()));
    }

    #[tokio::test]
    async fn test_fetch_and_parse_normalizes_loose_dates() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Loose</title>
  <item><title>A</title><link>https://example.com/a</link><pubDate>2024-05-06 10:00:00</pubDate></item>
  <item><title>B</title><link>https://example.com/b</link><pubDate>May 6th, 2024</pubDate></item>
</channel></rss>"#;
        let fetcher = StubFetcher::default().with("https://example.com/loose", Some("application/rss+xml"), rss);
        let parser = FeedFormatParser::new(fetcher, &HttpSettings::default());
        let source = FeedSource::new("Loose", "https://example.com/loose");

        let items = parser.fetch_and_parse(&source, false).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| !i.published.is_fallback()));
        assert_eq!(items[0].published.instant, Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        assert_eq!(items[1].published.instant, Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_and_parse_fetch_failure() {
        let parser = FeedFormatParser::new(StubFetcher::default(), &HttpSettings::default());
        let source = FeedSource::new("Gone", "https://example.com/missing");
        let err = parser.fetch_and_parse(&source, false).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch(FetchError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_full_content_mode() {
        let article = r#"<html><head><meta property="article:published_time" content="2020-01-01T00:00:00Z"></head>
            <body><article><p>The committee approved the new budget after a long and heated debate on Tuesday.</p></article></body></html>"#;
        let empty = "<html><body><nav>Home News Sport</nav></body></html>";
        let fetcher = StubFetcher::default()
            .with("https://example.com/rss", None, RSS)
            .with("https://example.com/a", Some("text/html"), article)
            .with("https://example.com/b", Some("text/html"), empty);
        let parser = FeedFormatParser::new(fetcher, &HttpSettings::default()).with_page_concurrency(2);
        let source = FeedSource::new("World", "https://example.com/rss");

        let items = parser.fetch_and_parse(&source, true).await.unwrap();
        assert_eq!(items.len(), 2);

        // feed date wins over the page date
        assert_eq!(items[0].published.instant, Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());
        assert!(items[0].content.as_deref().unwrap().contains("approved the new budget"));
        assert_eq!(items[1].content.as_deref(), Some(CONTENT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_full_content_skips_unfetchable_pages() {
        let fetcher = StubFetcher::default()
            .with("https://example.com/rss", None, RSS)
            .with("https://example.com/b", None, "<html><body><p>Enough words in this paragraph to be kept as content.</p></body></html>");
        let parser = FeedFormatParser::new(fetcher, &HttpSettings::default());
        let source = FeedSource::new("World", "https://example.com/rss");

        let items = parser.fetch_and_parse(&source, true).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "B");
    }

    #[test]
    fn test_merge_page_uses_page_date_only_as_fallback() {
        let item = FeedItem {
            title: UNTITLED.into(),
            url: "https://example.com/x".into(),
            summary: DEFAULT_SUMMARY.into(),
            category: DEFAULT_CATEGORY.into(),
            published: NormalizedDate::now(),
            content: None,
        };
        let page_date = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let page = ExtractedContent {
            title: "From page".into(),
            body: "<p>x</p>".into(),
            source_name: "example.com".into(),
            published_at: NormalizedDate::parsed(page_date),
            origin_url: "https://example.com/x".into(),
        };
        let merged = merge_page(item, page);
        assert_eq!(merged.title, "From page");
        assert_eq!(merged.published.instant, page_date);
        assert_eq!(merged.content.as_deref(), Some("<p>x</p>"));
    }
}
