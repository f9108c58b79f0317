//! HTTP fetching with timeouts, browser-like headers and retry with backoff.
//!
//! # Architecture
//!
//! The module uses a trait-based design so the pipeline never talks to
//! `reqwest` directly:
//! - [`Fetch`]: core trait, `get(url, timeout) -> FetchResponse`
//! - [`HttpFetcher`]: `reqwest` implementation with a configurable header set
//! - [`RetryFetch`]: decorator that retries transient failures of any [`Fetch`]
//!
//! # Retry Strategy
//!
//! - Only [`FetchError::is_transient`] failures are retried
//! - Each attempt gets the full `timeout`; backoff sleeps are not charged to it
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 10 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Some origins reject non-browser clients outright.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml,application/atom+xml,application/json;q=0.8,*/*;q=0.7";

/// A successful (2xx) HTTP response.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// The `Content-Type` header, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Anything that can GET a URL.
///
/// Implementations must return [`FetchError::Status`] for non-2xx responses
/// and honor `timeout` for each request they send. [`RetryFetch`] applies it
/// per attempt, so a retried call can take longer in total.
pub trait Fetch {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

impl<T: Fetch> Fetch for &T {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        (**self).get(url, timeout).await
    }
}

/// `fetcher.get` bounded by a runtime timer as well as the fetcher's own
/// timeout, so a stalled implementation cannot hang the caller. Used for each
/// attempt inside [`RetryFetch`].
pub async fn fetch_with_deadline<F: Fetch>(
    fetcher: &F,
    url: &str,
    limit: Duration,
) -> Result<FetchResponse, FetchError> {
    match tokio::time::timeout(limit, fetcher.get(url, limit)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout_secs: limit.as_secs(),
        }),
    }
}

/// HTTP settings, loaded from the `http:` section of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub accept: String,
    /// Extra request headers sent with every fetch.
    pub headers: BTreeMap<String, String>,
    pub feed_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            headers: BTreeMap::new(),
            feed_timeout_secs: 10,
            page_timeout_secs: 15,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl HttpSettings {
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Build the default header map. Invalid custom headers are skipped with
    /// a warning rather than failing the whole run.
    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.accept) {
            headers.insert(ACCEPT, v);
        }
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => warn!(header = %name, "Skipping invalid custom header"),
            }
        }
        headers
    }
}

/// [`Fetch`] implementation backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .default_headers(settings.header_map())
            .connect_timeout(settings.feed_timeout())
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let t0 = Instant::now();
        let secs = timeout.as_secs();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, secs, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, secs, e))?;

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(FetchResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match fetch_with_deadline(&self.inner, url, timeout).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            %url,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        %url,
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given error `failures` times, then succeeds.
    struct Flaky {
        failures: usize,
        status: u16,
        calls: AtomicUsize,
    }

    impl Fetch for Flaky {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: self.status,
                })
            } else {
                Ok(FetchResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: b"ok".to_vec(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let flaky = Flaky {
            failures: 2,
            status: 503,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 3, Duration::from_millis(1));
        let resp = retry
            .get("https://example.com", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.body, b"ok");
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let flaky = Flaky {
            failures: 10,
            status: 502,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 2, Duration::from_millis(1));
        let err = retry
            .get("https://example.com", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 502, .. }));
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_client_errors() {
        let flaky = Flaky {
            failures: 10,
            status: 404,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 5, Duration::from_millis(1));
        let err = retry
            .get("https://example.com", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 1);
    }

    struct Stalled;

    impl Fetch for Stalled {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(FetchResponse::default())
        }
    }

    /// Stalls on the first call, answers on every later one.
    struct SlowThenOk {
        calls: AtomicUsize,
    }

    impl Fetch for SlowThenOk {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                sleep(Duration::from_secs(3600)).await;
            }
            Ok(FetchResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: b"ok".to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_timed_out_attempt() {
        let retry = RetryFetch::new(
            SlowThenOk {
                calls: AtomicUsize::new(0),
            },
            2,
            Duration::from_millis(1),
        );
        let resp = retry
            .get("https://example.com/slow", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(resp.body, b"ok");
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_times_out_every_attempt() {
        let retry = RetryFetch::new(Stalled, 1, Duration::from_millis(1));
        let err = retry
            .get("https://example.com/slow", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_deadline_cuts_off_stalled_fetcher() {
        let err = fetch_with_deadline(&Stalled, "https://example.com/slow", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[test]
    fn test_header_map_includes_browser_user_agent_and_custom_headers() {
        let mut settings = HttpSettings::default();
        settings
            .headers
            .insert("Accept-Language".into(), "en-US,en;q=0.9".into());
        settings.headers.insert("bad header".into(), "x".into());

        let headers = settings.header_map();
        assert!(
            headers
                .get(USER_AGENT)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("Mozilla/5.0")
        );
        assert_eq!(headers.get("accept-language").unwrap(), "en-US,en;q=0.9");
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_content_type_accessor() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/rss+xml"));
        let resp = FetchResponse {
            status: 200,
            headers,
            body: Vec::new(),
        };
        assert_eq!(resp.content_type(), Some("application/rss+xml"));
    }
}
