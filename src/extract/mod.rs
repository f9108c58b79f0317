//! Article content extraction from HTML pages.
//!
//! [`HtmlContentExtractor`] turns a fetched page into an [`ExtractedContent`]:
//!
//! 1. Parse the document and read title, publication date and site name from
//!    the raw markup ([`metadata`])
//! 2. Sanitize a copy: drop scripts, navigation, hidden elements and media,
//!    and flatten links to text ([`sanitize`])
//! 3. Locate the most likely content container and rebuild it as a flat run
//!    of `<h3>` and `<p>` blocks ([`body`])
//!
//! A page with no usable blocks yields `None`, never an error.

pub mod body;
pub mod metadata;
pub mod sanitize;

use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::models::ExtractedContent;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlContentExtractor;

impl HtmlContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract article content from an HTML payload.
    ///
    /// # Arguments
    ///
    /// * `html` - Raw page bytes; invalid UTF-8 is replaced, not rejected
    /// * `source_url` - The page URL, used for the site-name fallback and
    ///   recorded as `origin_url`
    ///
    /// # Returns
    ///
    /// `None` when no heading or paragraph survives filtering.
    pub fn extract(&self, html: &[u8], source_url: &str) -> Option<ExtractedContent> {
        let text = String::from_utf8_lossy(html);
        let raw = Html::parse_document(&text);

        let title = metadata::extract_title(&raw);
        let published_at = metadata::extract_published(&raw);
        let source_name = metadata::extract_source_name(&raw, source_url);

        let mut cleaned = raw;
        sanitize::sanitize(&mut cleaned);
        let container = body::locate_container(&cleaned)?;
        let Some(body) = body::compose_body(container) else {
            debug!(url = %source_url, "No content blocks survived filtering");
            return None;
        };

        Some(ExtractedContent {
            title,
            body,
            source_name,
            published_at,
            origin_url: source_url.to_string(),
        })
    }

    /// Fetch a page and extract it.
    ///
    /// Fetch failures are errors; an unusable page is `Ok(None)`.
    #[instrument(level = "debug", skip(self, fetcher))]
    pub async fn fetch_and_extract<F: Fetch>(
        &self,
        fetcher: &F,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<ExtractedContent>, FetchError> {
        let response = fetcher.get(url, timeout).await?;
        Ok(self.extract(&response.body, url))
    }
}
