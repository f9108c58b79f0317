//! Error taxonomy for the ingestion pipeline.
//!
//! Errors are split by where they originate so callers can decide what to
//! swallow and what to surface:
//!
//! | Type | Origin | Typical handling |
//! |------|--------|------------------|
//! | [`FetchError`] | HTTP layer (timeout, non-2xx, connection) | logged, source or entry marked failed |
//! | [`FormatError`] | feed payload (malformed, unrecognized, empty) | logged, source marked failed |
//! | [`StoreError`] | article store (I/O, serialization, bad key) | logged per article |
//! | [`ConfigError`] | source configuration files | fatal for the CLI |
//!
//! [`IngestError`] is the umbrella returned by per-source work. A page with no
//! extractable content is *not* an error; it is `Option::None`.

use crate::models::FeedFormat;
use thiserror::Error;

/// A failed network fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("timed out after {timeout_secs}s fetching {url}")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, `429` and `5xx` are transient; other
    /// statuses and malformed URLs are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, timeout_secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_secs,
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if e.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// A feed payload that could not be turned into entries.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("unrecognized feed format")]
    Unrecognized,

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no entries found in {0} feed")]
    NoEntries(FeedFormat),
}

/// Article store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("article URL is not an absolute http(s) URL: {0}")]
    InvalidUrl(String),
}

/// Problems loading feed source configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("duplicate feed URL in configuration: {0}")]
    DuplicateUrl(String),

    #[error("invalid feed URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Per-source (or per-page) ingestion failure.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ingestion cancelled")]
    Cancelled,
}
