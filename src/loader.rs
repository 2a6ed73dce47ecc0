//! Page loading: the [PageLoader] capability and its direct-HTTP strategy.
//!
//! [HttpLoader] is a blocking client with configurable politeness (delay
//! between requests) and bounded retries with backoff. Retry policy lives
//! entirely here; by the time an error reaches the traversal engine it is
//! already final for that page. A rendered-browser strategy would implement
//! the same trait.

use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; pageturner/0.1; +https://github.com/pageturner)";
/// Default request timeout; the CLI shares these so `--help` text and
/// settings fallbacks agree with the builder.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default delay between requests.
pub const DEFAULT_DELAY_SECS: u64 = 2;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts per page (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// A fetch failure, final for the requested page.
///
/// `Transient` means the class of failure could succeed on a later run
/// (timeouts, connection errors, 5xx, 429 after retries were exhausted).
/// `Permanent` means the server answered definitively (4xx and similar).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("permanent failure fetching {url}: HTTP {status}")]
    Permanent { url: String, status: u16 },
}

impl FetchError {
    fn from_reqwest(url: &str, e: &reqwest::Error) -> Self {
        FetchError::Transient {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Capability consumed by the traversal engine and the cover fetch.
///
/// Implementations own their own retry policy; a returned error is final
/// for that URL.
pub trait PageLoader {
    /// Fetch a page and decode the body as text.
    fn fetch_page(&mut self, url: &str) -> Result<String, FetchError>;

    /// Fetch raw bytes (cover images).
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Direct-fetch strategy: blocking HTTP with politeness delay and retries.
#[derive(Debug)]
pub struct HttpLoader {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl HttpLoader {
    /// Build a loader with default User-Agent, timeout, delay, and retries.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> HttpLoaderBuilder {
        HttpLoaderBuilder::default()
    }

    /// GET with retries for transient failures (timeout, connect, 5xx, 429).
    /// Non-retryable responses are returned as-is for the caller to classify.
    fn get_with_retry(&mut self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let max_attempts = self.retry_count.max(1);
        let mut last_reason = String::new();
        for attempt in 0..max_attempts {
            self.wait_delay();
            match self.inner.get(url).send() {
                Ok(response) => {
                    self.last_request = Some(Instant::now());
                    let status = response.status();
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if retryable && attempt < max_attempts - 1 {
                        last_reason = format!("HTTP {}", status.as_u16());
                        let backoff = if status.as_u16() == 429 {
                            backoff_at(&BACKOFF_429_SECS, attempt)
                        } else {
                            backoff_at(&self.backoff_secs, attempt)
                        };
                        std::thread::sleep(Duration::from_secs(backoff));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    self.last_request = Some(Instant::now());
                    let retryable = e.is_timeout() || e.is_connect();
                    if retryable && attempt < max_attempts - 1 {
                        last_reason = e.to_string();
                        let backoff = backoff_at(&self.backoff_secs, attempt);
                        std::thread::sleep(Duration::from_secs(backoff));
                        continue;
                    }
                    return Err(FetchError::from_reqwest(url, &e));
                }
            }
        }
        Err(FetchError::Transient {
            url: url.to_string(),
            reason: last_reason,
        })
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Classify a final (post-retry) response status. 5xx and 429 surviving the
/// retry loop are transient; other non-success statuses are permanent.
fn classify_status(url: &str, status: reqwest::StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() || status.as_u16() == 429 {
        Err(FetchError::Transient {
            url: url.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        })
    } else {
        Err(FetchError::Permanent {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn backoff_at(secs: &[u64], attempt: u32) -> u64 {
    secs.get(attempt as usize)
        .copied()
        .unwrap_or_else(|| secs.last().copied().unwrap_or(1))
}

impl PageLoader for HttpLoader {
    fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
        let response = self.get_with_retry(url)?;
        classify_status(url, response.status())?;
        response
            .text()
            .map_err(|e| FetchError::from_reqwest(url, &e))
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get_with_retry(url)?;
        classify_status(url, response.status())?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::from_reqwest(url, &e))
    }
}

/// Builder for [HttpLoader] with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct HttpLoaderBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for HttpLoaderBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl HttpLoaderBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 2.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of attempts per page for transient failures. Default 3.
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry. If shorter than
    /// retry_count - 1, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpLoader, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(HttpLoader {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}
