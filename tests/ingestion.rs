use chrono::{TimeZone, Utc};
use news_ingest::feeds::detect::detect_format;
use news_ingest::fetch::{Fetch, FetchResponse, HttpSettings};
use news_ingest::models::{FeedFormat, FeedSource};
use news_ingest::store::snapshot::snapshot_path;
use news_ingest::{
    ArticleQuery, ArticleStore, FeedFormatParser, FetchError, IngestError, IngestSettings, IngestionOrchestrator,
    MemoryStore,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;

const RSS_AB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example World</title>
    <link>https://example.com/</link>
    <item>
      <title>A</title>
      <link>https://example.com/a</link>
      <description>First story</description>
      <pubDate>Mon, 06 May 2024 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>B</title>
      <link>https://example.com/b</link>
      <description>Second story</description>
      <pubDate>Tue, 07 May 2024 08:30:00 +0200</pubDate>
    </item>
  </channel>
</rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Tech</title>
  <entry>
    <title>Chips</title>
    <link rel="alternate" href="https://tech.example.com/chips"/>
    <updated>2024-05-06T12:00:00Z</updated>
    <summary>Fabs are busy.</summary>
    <category term="Technology"/>
  </entry>
</feed>"#;

const JSON_FEED: &str = r#"{
  "version": "https://jsonfeed.org/version/1.1",
  "title": "Farm News",
  "items": [
    {
      "id": "harvest",
      "title": "Harvest",
      "url": "https://farm.example.com/harvest",
      "content_text": "Yields are up.",
      "date_published": "2024-05-05T06:00:00Z",
      "tags": ["Agriculture"]
    }
  ]
}"#;

/// Serves canned bodies; unknown URLs fail like an unreachable host.
#[derive(Default)]
struct CannedFetcher {
    responses: HashMap<String, (&'static str, &'static str)>,
}

impl CannedFetcher {
    fn serve(mut self, url: &str, content_type: &'static str, body: &'static str) -> Self {
        self.responses.insert(url.to_string(), (content_type, body));
        self
    }
}

impl Fetch for CannedFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let Some((content_type, body)) = self.responses.get(url) else {
            return Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Ok(FetchResponse {
            status: 200,
            headers,
            body: body.as_bytes().to_vec(),
        })
    }
}

fn orchestrator(fetcher: CannedFetcher, store: MemoryStore) -> IngestionOrchestrator<CannedFetcher, MemoryStore> {
    let parser = FeedFormatParser::new(fetcher, &HttpSettings::default());
    IngestionOrchestrator::new(parser, store, IngestSettings::default())
}

#[tokio::test]
async fn rss_feed_with_two_items_yields_two_articles() {
    let fetcher = CannedFetcher::default().serve("https://example.com/rss", "application/rss+xml", RSS_AB);
    let orch = orchestrator(fetcher, MemoryStore::new());
    let mut sources = vec![FeedSource::new("Example World", "https://example.com/rss")];

    let report = orch.run_ingestion(&mut sources).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.articles_created, 2);

    let articles = orch.store().query(&ArticleQuery::default()).await;
    assert_eq!(articles.len(), 2);

    // newest first
    assert_eq!(articles[0].title, "B");
    assert_eq!(articles[0].url, "https://example.com/b");
    assert_eq!(articles[0].published_at, Utc.with_ymd_and_hms(2024, 5, 7, 6, 30, 0).unwrap());
    assert_eq!(articles[1].title, "A");
    assert_eq!(articles[1].url, "https://example.com/a");
    assert_eq!(articles[1].published_at, Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap());

    assert!(articles.iter().all(|a| a.source == "Example World"));
    assert!(articles.iter().all(|a| a.category == "General"));
    assert!(articles.iter().all(|a| !a.published_at_is_fallback));
}

#[tokio::test]
async fn second_run_against_unchanged_feed_adds_nothing() {
    let fetcher = CannedFetcher::default().serve("https://example.com/rss", "application/rss+xml", RSS_AB);
    let orch = orchestrator(fetcher, MemoryStore::new());
    let mut sources = vec![FeedSource::new("Example World", "https://example.com/rss")];

    orch.run_ingestion(&mut sources).await;
    let before = orch.store().count().await;
    let report = orch.run_ingestion(&mut sources).await;

    assert_eq!(orch.store().count().await, before);
    assert_eq!(report.articles_created, 0);
    assert_eq!(report.articles_upserted, 2);
}

#[tokio::test]
async fn idempotent_across_snapshot_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path());
    let mut sources = vec![FeedSource::new("Example World", "https://example.com/rss")];

    let first = orchestrator(
        CannedFetcher::default().serve("https://example.com/rss", "application/rss+xml", RSS_AB),
        MemoryStore::load(&path).await.unwrap(),
    );
    first.run_ingestion(&mut sources).await;
    first.store().save(&path).await.unwrap();

    let second = orchestrator(
        CannedFetcher::default().serve("https://example.com/rss", "application/rss+xml", RSS_AB),
        MemoryStore::load(&path).await.unwrap(),
    );
    let report = second.run_ingestion(&mut sources).await;
    assert_eq!(report.articles_created, 0);
    assert_eq!(second.store().count().await, 2);
}

#[tokio::test]
async fn unreachable_source_does_not_block_others() {
    let fetcher = CannedFetcher::default()
        .serve("https://example.com/rss", "application/rss+xml", RSS_AB)
        .serve("https://tech.example.com/atom", "application/atom+xml", ATOM)
        .serve("https://farm.example.com/feed", "application/json", JSON_FEED);
    let orch = orchestrator(fetcher, MemoryStore::new());
    let mut sources = vec![
        FeedSource::new("Unreachable", "https://offline.example.net/rss"),
        FeedSource::new("Example World", "https://example.com/rss"),
        FeedSource::new("Example Tech", "https://tech.example.com/atom"),
        FeedSource::new("Farm News", "https://farm.example.com/feed").with_format(FeedFormat::Json),
    ];

    let report = orch.run_ingestion(&mut sources).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 3);
    assert!(!report.all_failed());
    assert!(matches!(
        report.outcomes[0].result,
        Err(IngestError::Fetch(FetchError::Timeout { .. }))
    ));
    assert!(sources.iter().all(|s| s.last_fetched.is_some()));

    assert_eq!(orch.store().count().await, 4);
    assert_eq!(
        orch.store().categories().await,
        ["Agriculture", "General", "Technology"]
    );
    let tech = orch
        .store()
        .query(&ArticleQuery {
            source: Some("Example Tech".into()),
            ..Default::default()
        })
        .await;
    assert_eq!(tech.len(), 1);
    assert_eq!(tech[0].url, "https://tech.example.com/chips");
}

#[test]
fn format_classification() {
    let url = "https://example.com/feed";
    assert_eq!(detect_format(RSS_AB.as_bytes(), None, url), FeedFormat::Rss);
    assert_eq!(detect_format(ATOM.as_bytes(), None, url), FeedFormat::Atom);
    assert_eq!(detect_format(JSON_FEED.as_bytes(), None, url), FeedFormat::Json);
    assert_eq!(detect_format(b"", None, url), FeedFormat::Unknown);
}
