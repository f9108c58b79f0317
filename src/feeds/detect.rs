//! Feed format detection.
//!
//! Cheap hints are consulted first (declared format, `Content-Type`, URL
//! suffix). Only when they are silent is the payload sniffed: parse as XML and
//! look at the root element, then try JSON.

use super::xml::{ATOM_NS, parse_document};
use crate::models::FeedFormat;
use tracing::debug;
use url::Url;

/// Classify a payload using transport hints, falling back to sniffing.
pub fn detect_format(body: &[u8], content_type: Option<&str>, url: &str) -> FeedFormat {
    hint_from_content_type(content_type)
        .or_else(|| hint_from_url(url))
        .unwrap_or_else(|| sniff_format(body))
}

/// Format implied by a `Content-Type` header. Plain `text/xml` and
/// `application/xml` are ambiguous and yield `None`.
pub fn hint_from_content_type(content_type: Option<&str>) -> Option<FeedFormat> {
    let ct = content_type?.to_ascii_lowercase();
    let mime = ct.split(';').next().unwrap_or_default().trim();
    if mime.contains("rss") {
        Some(FeedFormat::Rss)
    } else if mime.contains("atom") {
        Some(FeedFormat::Atom)
    } else if mime.contains("json") {
        Some(FeedFormat::Json)
    } else {
        None
    }
}

/// Format implied by the URL path suffix.
pub fn hint_from_url(url: &str) -> Option<FeedFormat> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    if path.ends_with(".rss") {
        Some(FeedFormat::Rss)
    } else if path.ends_with(".atom") {
        Some(FeedFormat::Atom)
    } else if path.ends_with(".json") {
        Some(FeedFormat::Json)
    } else {
        None
    }
}

/// Classify a payload by its content alone.
pub fn sniff_format(body: &[u8]) -> FeedFormat {
    match parse_document(body) {
        Ok(root) => {
            let format = if root.is("rss") {
                FeedFormat::Rss
            } else if root.namespace.as_deref() == Some(ATOM_NS) || root.is("feed") {
                FeedFormat::Atom
            } else {
                FeedFormat::Xml
            };
            debug!(root = %root.name, %format, "Sniffed XML root");
            format
        }
        Err(_) if serde_json::from_slice::<serde_json::Value>(body).is_ok() => FeedFormat::Json,
        Err(_) => FeedFormat::Unknown,
    }
}
