//! # news_ingest
//!
//! Fetches configured news feeds, normalizes their entries and upserts them
//! into an article store snapshot on disk.
//!
//! ## Usage
//!
//! ```sh
//! news_ingest run --config feeds.yaml --store-dir ./store --deadline-secs 300
//! news_ingest page https://example.com/news/story
//! news_ingest list --category World --limit 20
//! ```
//!
//! ## Flow
//!
//! 1. **Load**: read the store snapshot and the source configuration
//! 2. **Ingest**: fetch, parse and upsert every active source (bounded concurrency)
//! 3. **Persist**: write the snapshot back
//! 4. **Report**: log per-source outcomes; if every source failed, list what is already stored

use clap::Parser;
use news_ingest::cli::{Cli, Command, ListArgs, RunArgs};
use news_ingest::config::{AppConfig, load_source_list};
use news_ingest::fetch::{HttpFetcher, HttpSettings, RetryFetch};
use news_ingest::models::Article;
use news_ingest::store::snapshot::snapshot_path;
use news_ingest::utils::{ensure_writable_dir, truncate_for_log};
use news_ingest::{ArticleQuery, ArticleStore, FeedFormatParser, IngestionOrchestrator, MemoryStore};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_ingest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: ensure the store dir is writable
    if let Err(e) = ensure_writable_dir(&args.store_dir).await {
        error!(
            path = %args.store_dir,
            error = %e,
            "Store directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let snapshot = snapshot_path(&args.store_dir);
    let store = MemoryStore::load(&snapshot).await?;

    match args.command {
        Command::Run(run) => run_sources(run, store, &snapshot).await?,
        Command::Page { url, config } => ingest_one_page(&url, config.as_deref(), store, &snapshot).await?,
        Command::List(list) => list_articles(&store, list).await,
    }

    info!(elapsed_ms = start_time.elapsed().as_millis() as u64, "news_ingest finished");
    Ok(())
}

fn build_fetcher(http: &HttpSettings) -> Result<RetryFetch<HttpFetcher>, Box<dyn Error>> {
    let fetcher = HttpFetcher::new(http)?;
    Ok(RetryFetch::new(
        fetcher,
        http.max_retries,
        Duration::from_millis(http.retry_base_delay_ms),
    ))
}

/// Cancel `token` on Ctrl-C or once `deadline_secs` elapse, whichever
/// comes first.
fn spawn_cancel_triggers(token: CancellationToken, deadline_secs: Option<u64>) {
    tokio::spawn(async move {
        let deadline = async {
            match deadline_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::signal::ctrl_c() => warn!("Ctrl-C received; cancelling in-flight sources"),
            _ = deadline => warn!(deadline_secs, "Deadline reached; cancelling in-flight sources"),
        }
        token.cancel();
    });
}

#[instrument(level = "info", skip_all)]
async fn run_sources(run: RunArgs, store: MemoryStore, snapshot: &Path) -> Result<(), Box<dyn Error>> {
    let mut config = match (&run.config, &run.sources_list) {
        (Some(path), _) => AppConfig::load(path)?,
        (None, Some(path)) => load_source_list(path)?,
        (None, None) => {
            error!("No feed sources: pass --config or --sources-list");
            return Err("no feed sources configured".into());
        }
    };
    if let Some(n) = run.concurrency {
        config.concurrency = n;
    }
    config.full_content |= run.full_content;

    let parser = FeedFormatParser::new(build_fetcher(&config.http)?, &config.http);
    let cancel = CancellationToken::new();
    spawn_cancel_triggers(cancel.clone(), run.deadline_secs);

    let orchestrator =
        IngestionOrchestrator::new(parser, store, config.ingest_settings()).with_cancellation(cancel.clone());
    let report = orchestrator.run_ingestion(&mut config.sources).await;
    // stop the trigger task
    cancel.cancel();

    orchestrator.store().save(snapshot).await?;

    for outcome in report.outcomes.iter().filter(|o| o.result.is_err()) {
        if let Err(e) = &outcome.result {
            warn!(source = %outcome.name, url = %outcome.url, error = %e, "Source did not ingest");
        }
    }
    info!(
        attempted = report.attempted(),
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        created = report.articles_created,
        updated = report.articles_updated,
        total = orchestrator.store().count().await,
        "Run complete"
    );

    if report.all_failed() {
        warn!("Every source failed; showing previously stored articles");
        let stored = orchestrator.store().query(&ArticleQuery::default()).await;
        print_articles(&stored);
    }
    Ok(())
}

#[instrument(level = "info", skip(store, snapshot))]
async fn ingest_one_page(
    url: &str,
    config: Option<&str>,
    store: MemoryStore,
    snapshot: &Path,
) -> Result<(), Box<dyn Error>> {
    let http = match config {
        Some(path) => AppConfig::load(path)?.http,
        None => HttpSettings::default(),
    };
    let parser = FeedFormatParser::new(build_fetcher(&http)?, &http);
    let orchestrator = IngestionOrchestrator::new(parser, store, Default::default());

    match orchestrator.ingest_page(url).await? {
        Some((article, status)) => {
            info!(title = %article.title, source = %article.source, ?status, "Stored page");
            orchestrator.store().save(snapshot).await?;
            print_articles(std::slice::from_ref(&article));
        }
        None => warn!(%url, "Page had no extractable content; nothing stored"),
    }
    Ok(())
}

async fn list_articles(store: &MemoryStore, args: ListArgs) {
    let query = ArticleQuery {
        from: args.from,
        to: args.to,
        source: args.source,
        category: args.category,
        limit: args.limit,
    };
    let articles = store.query(&query).await;
    if articles.is_empty() {
        let sources = store.sources().await;
        let categories = store.categories().await;
        warn!(?sources, ?categories, "No stored articles match");
        return;
    }
    print_articles(&articles);
}

fn print_articles(articles: &[Article]) {
    for article in articles {
        let marker = if article.published_at_is_fallback { "~" } else { "" };
        println!(
            "{marker}{} [{}] {} ({})\n    {}\n    {}",
            article.published_at.format("%Y-%m-%d %H:%M"),
            article.source,
            article.title,
            article.category,
            article.url,
            truncate_for_log(&article.summary, 160),
        );
    }
}
