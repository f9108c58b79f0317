//! Content container location and body composition.
//!
//! Container search is an ordered list of selectors. The first match whose
//! visible text is long enough wins; otherwise the largest `div`, otherwise
//! `body`. The body is then rebuilt as a flat run of `<h3>` and `<p>` blocks.

use crate::utils::collapse_whitespace;
use html_escape::encode_text;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Candidate containers, most specific first.
const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    ".article-content",
    ".post-content",
    ".entry-content",
    "#content",
    ".content",
    ".story-content",
    ".main-content",
    "[role=main]",
    "main",
];

/// A candidate must carry more visible text than this to be accepted.
pub const MIN_CONTAINER_CHARS: usize = 100;
pub const MAX_HEADING_CHARS: usize = 200;
pub const MIN_PARAGRAPH_CHARS: usize = 30;
pub const MIN_PARAGRAPH_WORDS: usize = 6;

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid container selector"))
        .collect()
});
static DIVS: Lazy<Selector> = Lazy::new(|| Selector::parse("div").expect("valid div selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid body selector"));
static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid heading selector"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, div").expect("valid paragraph selector"));

/// Visible text of an element, whitespace-collapsed.
pub fn visible_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(""))
}

/// Find the element most likely to hold the article text.
///
/// Only the attached tree is searched: `Html::select` also walks subtrees
/// that [`sanitize`](super::sanitize::sanitize) detached.
pub fn locate_container(doc: &Html) -> Option<ElementRef<'_>> {
    let root = doc.root_element();
    CONTAINERS
        .iter()
        .filter_map(|selector| root.select(selector).next())
        .find(|el| visible_text(el).chars().count() > MIN_CONTAINER_CHARS)
        .or_else(|| largest_div(root))
        .or_else(|| root.select(&BODY).next())
}

/// The `div` with the most text; the earliest one wins a tie.
fn largest_div(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut best: Option<(usize, ElementRef<'_>)> = None;
    for div in root.select(&DIVS) {
        let len = visible_text(&div).chars().count();
        if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
            best = Some((len, div));
        }
    }
    best.map(|(_, el)| el)
}

/// Rebuild the container's text as `<h3>`/`<p>` blocks.
///
/// Headings come first, deduplicated and capped in length. Paragraph-like
/// elements follow in document order and are kept only when long enough and
/// not overlapping any paragraph already kept (equal, contained in, or
/// containing it). Returns `None` when nothing survives.
pub fn compose_body(container: ElementRef<'_>) -> Option<String> {
    let mut blocks: Vec<String> = Vec::new();

    let mut seen_headings: HashSet<String> = HashSet::new();
    for heading in container.select(&HEADINGS).filter(|el| el.id() != container.id()) {
        let text = visible_text(&heading);
        if text.is_empty() || text.chars().count() >= MAX_HEADING_CHARS {
            continue;
        }
        if seen_headings.insert(text.clone()) {
            blocks.push(format!("<h3>{}</h3>", encode_text(&text)));
        }
    }

    let mut kept: Vec<String> = Vec::new();
    for element in container.select(&PARAGRAPHS).filter(|el| el.id() != container.id()) {
        let text = visible_text(&element);
        if !is_substantial(&text) || overlaps_any(&text, &kept) {
            continue;
        }
        blocks.push(format!("<p>{}</p>", encode_text(&text)));
        kept.push(text);
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

fn is_substantial(text: &str) -> bool {
    text.chars().count() >= MIN_PARAGRAPH_CHARS && text.split_whitespace().count() >= MIN_PARAGRAPH_WORDS
}

fn overlaps_any(text: &str, kept: &[String]) -> bool {
    kept.iter().any(|p| p.contains(text) || text.contains(p.as_str()))
}
