//! Title, date and site-name fallback chains.
//!
//! Each chain is a fixed list of strategies evaluated in order; the first one
//! that yields an acceptable value wins. Chains run against the unsanitized
//! document, since sanitization strips `<meta>` and `<header>`.

use super::body::visible_text;
use crate::dates::{DateNormalizer, NormalizedDate};
use crate::models::UNTITLED;
use crate::utils::{collapse_whitespace, host_label};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

pub const MAX_TITLE_CHARS: usize = 200;

/// Where a candidate value lives.
#[derive(Debug, Clone, Copy)]
enum Probe {
    /// `content` attribute of the first element matching the selector.
    MetaContent(&'static str),
    /// Visible text of the first element matching the selector.
    Text(&'static str),
    /// `datetime` attribute of the first match, falling back to its text.
    DatetimeOrText(&'static str),
}

const TITLE_PROBES: &[Probe] = &[
    Probe::MetaContent(r#"meta[property="og:title"]"#),
    Probe::MetaContent(r#"meta[name="twitter:title"]"#),
    Probe::Text("h1"),
    Probe::Text("title"),
];

const DATE_PROBES: &[Probe] = &[
    Probe::MetaContent(r#"meta[property="article:published_time"]"#),
    Probe::MetaContent(r#"meta[property="og:published_time"]"#),
    Probe::DatetimeOrText("time"),
    Probe::MetaContent(r#"meta[name="date"]"#),
];

const SOURCE_PROBES: &[Probe] = &[
    Probe::MetaContent(r#"meta[property="og:site_name"]"#),
    Probe::MetaContent(r#"meta[name="application-name"]"#),
];

struct CompiledProbe {
    probe: Probe,
    selector: Selector,
}

fn compile(probes: &[Probe]) -> Vec<CompiledProbe> {
    probes
        .iter()
        .map(|probe| {
            let css = match probe {
                Probe::MetaContent(s) | Probe::Text(s) | Probe::DatetimeOrText(s) => *s,
            };
            CompiledProbe {
                probe: *probe,
                selector: Selector::parse(css).expect("valid metadata selector"),
            }
        })
        .collect()
}

static TITLE_CHAIN: Lazy<Vec<CompiledProbe>> = Lazy::new(|| compile(TITLE_PROBES));
static DATE_CHAIN: Lazy<Vec<CompiledProbe>> = Lazy::new(|| compile(DATE_PROBES));
static SOURCE_CHAIN: Lazy<Vec<CompiledProbe>> = Lazy::new(|| compile(SOURCE_PROBES));

impl CompiledProbe {
    fn read(&self, doc: &Html) -> Option<String> {
        let el = doc.select(&self.selector).next()?;
        let value = match self.probe {
            Probe::MetaContent(_) => collapse_whitespace(el.value().attr("content")?),
            Probe::Text(_) => visible_text(&el),
            Probe::DatetimeOrText(_) => el
                .value()
                .attr("datetime")
                .map(collapse_whitespace)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| visible_text(&el)),
        };
        if value.is_empty() { None } else { Some(value) }
    }
}

/// First non-empty title candidate under [`MAX_TITLE_CHARS`], else
/// [`UNTITLED`].
pub fn extract_title(doc: &Html) -> String {
    TITLE_CHAIN
        .iter()
        .filter_map(|probe| probe.read(doc))
        .find(|title| title.chars().count() < MAX_TITLE_CHARS)
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// First candidate the date normalizer accepts, else now (as a fallback).
pub fn extract_published(doc: &Html) -> NormalizedDate {
    DATE_CHAIN
        .iter()
        .filter_map(|probe| probe.read(doc))
        .find_map(|raw| DateNormalizer::try_parse(&raw))
        .map(NormalizedDate::parsed)
        .unwrap_or_else(NormalizedDate::now)
}

/// Declared site name, else the page host without `www.`/`feeds.`.
pub fn extract_source_name(doc: &Html, page_url: &str) -> String {
    SOURCE_CHAIN
        .iter()
        .find_map(|probe| probe.read(doc))
        .or_else(|| host_label(page_url))
        .unwrap_or_else(|| page_url.to_string())
}
