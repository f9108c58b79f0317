//! JSON feed parsing.
//!
//! Accepts JSON Feed documents and the looser ad-hoc shapes seen in the wild:
//! the item list may live under `items` or `entries`, and each field has a
//! few accepted spellings.

use crate::error::FormatError;
use crate::models::RawFeedEntry;
use crate::utils::collapse_whitespace;
use serde_json::Value;

const LIST_KEYS: &[&str] = &["items", "entries"];
const TITLE_KEYS: &[&str] = &["title"];
const LINK_KEYS: &[&str] = &["url", "link", "external_url"];
const SUMMARY_KEYS: &[&str] = &["summary", "description", "content_text"];
const PUBLISHED_KEYS: &[&str] = &["published", "date", "date_published", "pubDate"];
const CATEGORY_KEYS: &[&str] = &["category", "categories", "tags"];

/// Entries of a JSON feed.
///
/// An object without an item list parses to zero entries; a payload that is
/// not JSON is a [`FormatError::Json`].
pub fn parse_json(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, FormatError> {
    let doc: Value = serde_json::from_slice(bytes)?;
    let items = LIST_KEYS
        .iter()
        .filter_map(|key| doc.get(key).and_then(Value::as_array))
        .find(|list| !list.is_empty())
        .map(Vec::as_slice)
        .unwrap_or_default();

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| RawFeedEntry {
            title: first_string(item, TITLE_KEYS).unwrap_or_default(),
            link: first_string(item, LINK_KEYS).unwrap_or_default(),
            raw_published: first_string(item, PUBLISHED_KEYS),
            raw_summary: first_string(item, SUMMARY_KEYS),
            raw_category: first_string(item, CATEGORY_KEYS),
        })
        .collect())
}

/// The first non-empty value among `keys`. Arrays contribute their first
/// scalar element; numbers are stringified (epoch timestamps).
fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(key))
        .find_map(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Array(list) => return list.iter().find_map(scalar_text),
        Value::Object(obj) => return obj.get("name").or_else(|| obj.get("term")).and_then(scalar_text),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}
