//! Date normalization for feed and page timestamps.
//!
//! Feeds publish dates in many incompatible shapes. [`DateNormalizer`] tries a
//! fixed list of strict patterns in priority order, then one lenient
//! general-purpose pass, and finally falls back to the current time. The order
//! is part of the contract: a bare ISO date without an offset must never be
//! claimed by an RFC-822 pattern.
//!
//! | Priority | Pattern | Example |
//! |----------|---------|---------|
//! | 1 | RFC-822, numeric offset | `Mon, 06 May 2024 10:00:00 +0200` |
//! | 2 | RFC-822, literal GMT | `Mon, 06 May 2024 10:00:00 GMT` |
//! | 3 | ISO-8601, numeric offset | `2024-05-06T10:00:00+02:00` |
//! | 4 | ISO-8601, UTC designator | `2024-05-06T10:00:00Z` |
//! | 5 | Bare date and time (UTC) | `2024-05-06 10:00:00` |
//! | 6 | Lenient | `May 6th, 2024`, `Mon, 6 May 2024 10:00 EST`, `1714989600` |
//!
//! A miss is never an error. Callers that need to know whether the instant is
//! real get a [`NormalizedDate`] whose [`DateOrigin`] says so.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a normalized instant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateOrigin {
    /// Parsed from the input.
    Parsed,
    /// Input was missing or unparseable; the instant is "now".
    Fallback,
}

/// A timestamp plus its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedDate {
    pub instant: DateTime<Utc>,
    pub origin: DateOrigin,
}

impl NormalizedDate {
    pub fn parsed(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            origin: DateOrigin::Parsed,
        }
    }

    pub fn now() -> Self {
        Self {
            instant: Utc::now(),
            origin: DateOrigin::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == DateOrigin::Fallback
    }
}

type Strategy = fn(&str) -> Option<DateTime<Utc>>;

/// Strict patterns, tried in order.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("rfc822_offset", rfc822_offset),
    ("rfc822_gmt", rfc822_gmt),
    ("iso8601_offset", iso8601_offset),
    ("iso8601_utc", iso8601_utc),
    ("naive_datetime", naive_datetime),
];

/// Extra naive date-time layouts accepted by the lenient pass.
const LENIENT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%B %d, %Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
];

/// Date-only layouts accepted by the lenient pass (midnight UTC).
const LENIENT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%a, %d %b %Y",
    "%A, %B %d, %Y",
];

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"));
static TRAILING_ZONE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(UTC|GMT|Z)$").expect("valid zone regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Parses heterogeneous date strings into UTC instants.
///
/// Stateless; all methods are associated functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateNormalizer;

impl DateNormalizer {
    /// Parse `raw`, falling back to the current time. Never fails.
    pub fn parse(raw: &str) -> DateTime<Utc> {
        Self::normalize(raw).instant
    }

    /// Parse `raw` and record whether the result is real or a fallback.
    pub fn normalize(raw: &str) -> NormalizedDate {
        match Self::try_parse(raw) {
            Some(instant) => NormalizedDate::parsed(instant),
            None => {
                debug!(raw = %crate::utils::truncate_for_log(raw, 80), "Unparseable date; using now");
                NormalizedDate::now()
            }
        }
    }

    /// Like [`normalize`](Self::normalize) but for optional input.
    pub fn normalize_opt(raw: Option<&str>) -> NormalizedDate {
        raw.map(Self::normalize).unwrap_or_else(NormalizedDate::now)
    }

    /// Parse `raw` without any fallback.
    pub fn try_parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        STRATEGIES
            .iter()
            .find_map(|(_, strategy)| strategy(raw))
            .or_else(|| lenient(raw))
    }
}

fn rfc822_offset(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn rfc822_gmt(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

fn iso8601_offset(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn iso8601_utc(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

fn naive_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Last-resort parse of whatever shape is left.
fn lenient(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(epoch) = epoch_seconds(raw) {
        return Some(epoch);
    }

    let cleaned = WHITESPACE.replace_all(raw, " ");
    let cleaned = ORDINAL_SUFFIX.replace_all(&cleaned, "$1");
    let cleaned = cleaned.replace(" at ", " ");
    let cleaned = TRAILING_ZONE_NAME.replace(&cleaned, "");
    let cleaned = cleaned.trim();

    LENIENT_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            LENIENT_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

/// Unix epoch seconds, restricted to a plausible range so that years like
/// `2024` are not read as 1970 timestamps.
fn epoch_seconds(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 9 || raw.len() > 11 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = raw.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}
