//! HTTP client with per-domain rate limiting.
//!
//! Two profiles: a polite client that identifies itself to archives, and a
//! browser-mimic client that sends a full browser header set. Neither keeps
//! cookies.

mod response;
mod user_agent;

pub use response::HttpResponse;
pub use user_agent::{browser_headers, random_user_agent, DOCUMENT_ACCEPT, IMPERSONATE_USER_AGENTS};

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;

use crate::config::FetchConfig;
use crate::rate_limit::{parse_retry_after, RateLimiter};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Polite client: configured user agent, document Accept header,
    /// default redirect handling.
    pub fn polite(config: &FetchConfig, rate_limiter: RateLimiter) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DOCUMENT_ACCEPT));
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Browser-mimic client: real browser user agent and headers, up to
    /// `max_redirects` redirects.
    pub fn browser_mimic(
        config: &FetchConfig,
        rate_limiter: RateLimiter,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(random_user_agent())
            .default_headers(browser_headers())
            .redirect(Policy::limited(config.max_redirects))
            .timeout(config.request_timeout())
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Client for API calls; no politeness delay.
    pub fn api(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            rate_limiter: RateLimiter::disabled(),
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// GET a URL, waiting on the rate limiter first.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;
        let response = self.client.get(url).send().await?;
        self.finish(domain, response).await
    }

    /// POST a JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;
        let response = self.client.post(url).json(body).send().await?;
        self.finish(domain, response).await
    }

    async fn finish(
        &self,
        domain: Option<String>,
        response: reqwest::Response,
    ) -> Result<HttpResponse, reqwest::Error> {
        let status = response.status();
        let final_url = response.url().to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        if let Some(ref domain) = domain {
            let code = status.as_u16();
            if RateLimiter::is_definite_rate_limit(code) {
                let retry_after = parse_retry_after(headers.get("retry-after").map(|s| s.as_str()));
                self.rate_limiter
                    .report_rate_limit(domain, code, retry_after)
                    .await;
            } else if status.is_success() {
                self.rate_limiter.report_success(domain).await;
            }
        }
        debug!("GET {} -> {}", final_url, status);

        Ok(HttpResponse {
            status,
            headers,
            final_url,
            response,
        })
    }
}
