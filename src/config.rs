//! Configuration loading.
//!
//! Two inputs are supported:
//!
//! - a YAML file ([`AppConfig::load`]) carrying tuning knobs, HTTP settings
//!   and the feed sources;
//! - a legacy plain-text source list ([`load_source_list`]), one
//!   `<Country> <Category> <url>` triple per line, `#` for comments.
//!
//! # Example
//!
//! ```yaml
//! concurrency: 8
//! full_content: false
//! http:
//!   feed_timeout_secs: 10
//!   page_timeout_secs: 15
//!   headers:
//!     Accept-Language: "en-US,en;q=0.9"
//! sources:
//!   - name: Example World
//!     url: https://example.com/world/rss.xml
//!     format: RSS
//! ```

use crate::error::ConfigError;
use crate::fetch::HttpSettings;
use crate::ingest::IngestSettings;
use crate::models::FeedSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, instrument, warn};
use url::Url;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Sources ingested concurrently.
    pub concurrency: usize,
    /// Fetch and extract every entry's page, for all sources.
    pub full_content: bool,
    pub http: HttpSettings,
    pub sources: Vec<FeedSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let ingest = IngestSettings::default();
        Self {
            concurrency: ingest.concurrency,
            full_content: ingest.full_content,
            http: HttpSettings::default(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read and validate a YAML configuration file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&text, &path.display().to_string())?;
        info!(sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate YAML. `origin` only labels errors.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Every source URL must be an absolute http(s) URL and unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            check_feed_url(&source.url)?;
            if !seen.insert(source.url.as_str()) {
                return Err(ConfigError::DuplicateUrl(source.url.clone()));
            }
        }
        Ok(())
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            concurrency: self.concurrency.max(1),
            full_content: self.full_content,
        }
    }
}

fn check_feed_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme {:?}", parsed.scheme()),
        });
    }
    Ok(())
}

/// Parse a legacy source list.
///
/// Each non-comment line is `<Country> <Category> <url>`; the source is
/// named `"<Country> <Category>"`. Malformed lines, bad URLs and repeated
/// URLs are skipped with a warning.
pub fn parse_source_list(text: &str) -> Vec<FeedSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [country, category, url, ..] = parts.as_slice() else {
            warn!(line = idx + 1, content = %line, "Skipping malformed source line");
            continue;
        };
        if let Err(e) = check_feed_url(url) {
            warn!(line = idx + 1, error = %e, "Skipping source line");
            continue;
        }
        if !seen.insert(url.to_string()) {
            warn!(line = idx + 1, %url, "Skipping duplicate source URL");
            continue;
        }
        sources.push(FeedSource::new(format!("{country} {category}"), *url));
    }
    sources
}

/// Read a legacy source list into a configuration with default settings.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_source_list(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let sources = parse_source_list(&text);
    info!(sources = sources.len(), "Loaded source list");
    Ok(AppConfig {
        sources,
        ..AppConfig::default()
    })
}
