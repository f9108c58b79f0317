//! First-pass parsing with `feed-rs`.
//!
//! `feed-rs` understands well-formed RSS 0.9x/1.0/2.0, Atom and JSON Feed and
//! handles most of their quirks. Its entries are mapped into
//! [`RawFeedEntry`]s so that every path through the parser funnels through
//! the same normalization. Entries without a link are dropped here; when
//! nothing usable remains the caller falls back to format detection and the
//! hand-written parsers.

use crate::dates::DateNormalizer;
use crate::models::RawFeedEntry;
use feed_rs::model::Entry;
use feed_rs::parser;

/// Parse with `feed-rs`. Errors are returned as strings since the caller only
/// logs them before falling back.
///
/// Timestamps are read with [`DateNormalizer::try_parse`], so dates feed-rs
/// would not understand on its own still reach the entry.
pub fn parse_structured(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, String> {
    let feed = parser::Builder::new()
        .timestamp_parser(DateNormalizer::try_parse)
        .build()
        .parse(bytes)
        .map_err(|e| e.to_string())?;
    Ok(feed
        .entries
        .iter()
        .map(to_raw_entry)
        .filter(|entry| !entry.link.trim().is_empty())
        .collect())
}

fn to_raw_entry(entry: &Entry) -> RawFeedEntry {
    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default();

    RawFeedEntry {
        title: entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default(),
        link,
        // Already parsed by feed-rs; re-serialized so the date normalizer
        // remains the single source of truth.
        raw_published: entry.published.or(entry.updated).map(|d| d.to_rfc3339()),
        raw_summary: entry
            .summary
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|s| !s.is_empty()),
        raw_category: entry
            .categories
            .first()
            .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone())),
    }
}
