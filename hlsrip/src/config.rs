use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
pub const DEFAULT_ORIGIN: &str = "https://www.miruro.tv";

/// Settings shared by the key resolver and the segment fetcher for one run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of segments downloaded in parallel.
    pub threads: usize,
    /// Extra attempts for a segment after a timeout, connection error or HTTP 5xx.
    pub retries: u8,
    /// Per request timeout.
    pub timeout: Duration,
    /// Linear backoff step, the n-th retry waits `backoff * n`.
    pub backoff: Duration,
    pub headers: HeaderMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            retries: 3,
            timeout: Duration::from_secs(15),
            backoff: Duration::from_secs(1),
            headers: default_headers(),
        }
    }
}

impl PipelineConfig {
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Points `origin` and `referer` at another site.
    pub fn origin(mut self, origin: &str) -> Result<Self, header::InvalidHeaderValue> {
        let origin = origin.trim_end_matches('/');
        self.headers
            .insert(header::ORIGIN, HeaderValue::from_str(origin)?);
        self.headers
            .insert(header::REFERER, HeaderValue::from_str(&format!("{origin}/"))?);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Browser-like headers which get past basic origin and referer checks.
///
/// `accept-encoding` is left out since response bodies are used as is.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::ORIGIN, HeaderValue::from_static(DEFAULT_ORIGIN));
    headers.insert(
        header::REFERER,
        HeaderValue::from_static("https://www.miruro.tv/"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_static(DEFAULT_USER_AGENT),
    );
    headers
}
