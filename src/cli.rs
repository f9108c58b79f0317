//! Command-line interface definitions for news_ingest.
//!
//! This module defines the CLI subcommands and options using the `clap` crate.
//! Shared options can be provided via command-line flags or environment variables.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the news_ingest application.
///
/// # Examples
///
/// ```sh
/// # Ingest every source in a YAML configuration
/// news_ingest run --config feeds.yaml --store-dir ./store
///
/// # Ingest a legacy "<Country> <Category> <url>" list with page extraction
/// news_ingest run --sources-list rss-urls.txt --full-content
///
/// # Ingest a single article page
/// news_ingest page https://example.com/news/story
///
/// # Show the latest stored articles from one source
/// news_ingest list --source "Kenya Business" --limit 20
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the article snapshot (articles.json)
    #[arg(short, long, global = true, env = "NEWS_INGEST_STORE_DIR", default_value = "./store")]
    pub store_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every active feed source and upsert its articles
    Run(RunArgs),
    /// Fetch and store one article page
    Page {
        /// Absolute http(s) URL of the page
        url: String,

        /// YAML configuration whose `http:` section is used for the fetch
        #[arg(short, long, env = "NEWS_INGEST_CONFIG")]
        config: Option<String>,
    },
    /// Print stored articles, newest first
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML configuration with sources and settings
    #[arg(short, long, env = "NEWS_INGEST_CONFIG", conflicts_with = "sources_list")]
    pub config: Option<String>,

    /// Legacy plain-text source list, one "<Country> <Category> <url>" per line
    #[arg(long, env = "NEWS_INGEST_SOURCES_LIST")]
    pub sources_list: Option<String>,

    /// Sources fetched concurrently (overrides the configuration)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Also fetch and extract every entry's page
    #[arg(long)]
    pub full_content: bool,

    /// Cancel whatever is still in flight after this many seconds
    #[arg(long, env = "NEWS_INGEST_DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// Earliest publication date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_bound)]
    pub from: Option<DateTime<Utc>>,

    /// Latest publication date (YYYY-MM-DD or RFC 3339); a bare date covers the whole day
    #[arg(long, value_parser = parse_upper_bound)]
    pub to: Option<DateTime<Utc>>,

    #[arg(short = 'n', long, default_value_t = crate::store::DEFAULT_QUERY_LIMIT)]
    pub limit: usize,
}

fn parse_bound(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date_arg(s, false)
}

fn parse_upper_bound(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date_arg(s, true)
}

fn parse_date_arg(s: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date {s:?}: {e}"))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid date {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cli_run_parsing() {
        let cli = Cli::parse_from([
            "news_ingest",
            "--store-dir",
            "/tmp/store",
            "run",
            "--config",
            "feeds.yaml",
            "--concurrency",
            "4",
            "--full-content",
        ]);

        assert_eq!(cli.store_dir, "/tmp/store");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config.as_deref(), Some("feeds.yaml"));
        assert_eq!(args.concurrency, Some(4));
        assert!(args.full_content);
        assert_eq!(args.deadline_secs, None);
    }

    #[test]
    fn test_cli_config_conflicts_with_sources_list() {
        let result = Cli::try_parse_from([
            "news_ingest",
            "run",
            "--config",
            "feeds.yaml",
            "--sources-list",
            "rss-urls.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_page_and_global_flag_after_subcommand() {
        let cli = Cli::parse_from(["news_ingest", "page", "https://example.com/a", "-s", "./data"]);
        assert_eq!(cli.store_dir, "./data");
        assert!(matches!(cli.command, Command::Page { url, config: None } if url == "https://example.com/a"));
    }

    #[test]
    fn test_cli_page_accepts_config() {
        let cli = Cli::parse_from(["news_ingest", "page", "https://example.com/a", "--config", "feeds.yaml"]);
        let Command::Page { config, .. } = cli.command else {
            panic!("expected page");
        };
        assert_eq!(config.as_deref(), Some("feeds.yaml"));
    }

    #[test]
    fn test_cli_list_dates() {
        let cli = Cli::parse_from([
            "news_ingest",
            "list",
            "--from",
            "2024-05-01",
            "--to",
            "2024-05-06",
            "-n",
            "10",
        ]);
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.from, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(args.to, Some(Utc.with_ymd_and_hms(2024, 5, 6, 23, 59, 59).unwrap()));
        assert_eq!(args.limit, 10);
        assert!(Cli::try_parse_from(["news_ingest", "list", "--from", "yesterday"]).is_err());
    }
}
