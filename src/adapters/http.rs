//! Plain HTTP fetch primitive shared by adapters.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::ContextKind;
use crate::error::{IngestError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const ACCEPT_ANY: &str = "application/json, text/plain, */*";

/// reqwest client scoped to one source: browser-like headers and a shared
/// rate limit.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<DirectLimiter>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            base_url: base_url.into(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Shared client with the service-wide timeouts.
    pub fn build_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to create HTTP client: {}", e)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self, kind: ContextKind) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(kind.profile().user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_ANY));
        if let Ok(origin) = HeaderValue::from_str(&self.base_url) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.base_url)) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    pub async fn get_text(&self, url: &str, kind: ContextKind) -> Result<String> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .headers(self.headers(kind))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(IngestError::Fetch(format!(
                "GET {} returned {}: {}",
                url,
                status,
                truncate(&body, 200)
            )));
        }
        Ok(body)
    }

    pub async fn get_json(&self, url: &str, kind: ContextKind) -> Result<Value> {
        let body = self.get_text(url, kind).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
