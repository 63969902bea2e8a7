//! Adaptive per-domain rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use super::backend::RateLimitBackend;
use super::config::{DomainStats, RateLimitConfig};
use super::memory::InMemoryRateLimitBackend;

/// Adaptive rate limiter that tracks per-domain request timing.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    backend: Arc<dyn RateLimitBackend>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_backend(config, Arc::new(InMemoryRateLimitBackend::new()))
    }

    pub fn with_backend(config: RateLimitConfig, backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { config, backend }
    }

    /// No waiting at all; used by tests against local servers.
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            base_delay: Duration::ZERO,
            polite_ceiling: Duration::ZERO,
            ..RateLimitConfig::default()
        })
    }

    fn base_delay_ms(&self) -> u64 {
        self.config.base_delay.as_millis() as u64
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark request as started.
    ///
    /// Backend failures never block a fetch; they are logged and skipped.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;
        match self.backend.acquire(&domain, self.base_delay_ms()).await {
            Ok(wait) if wait > Duration::ZERO => {
                debug!("Rate limiting {}: waiting {:?}", domain, wait);
                tokio::time::sleep(wait).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Rate limit backend error for {}: {}", domain, e),
        }
        Some(domain)
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let Ok(mut state) = self
            .backend
            .get_or_create_domain(domain, self.base_delay_ms())
            .await
        else {
            return;
        };
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            let reduced = (state.current_delay_ms as f64 * self.config.recovery_multiplier) as u64;
            let ceiling = self.config.polite_ceiling.as_millis() as u64;
            if reduced <= ceiling {
                state.in_backoff = false;
                state.current_delay_ms = reduced.max(self.base_delay_ms());
                info!("Domain {} recovered from rate limit backoff", domain);
            } else {
                state.current_delay_ms = reduced;
                debug!("Domain {} delay reduced to {}ms", domain, reduced);
            }
            state.consecutive_successes = 0;
        }

        if let Err(e) = self.backend.update_domain(&state).await {
            warn!("Rate limit backend error for {}: {}", domain, e);
        }
    }

    /// Check if a status code is definitely a rate limit.
    pub fn is_definite_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a rate limit hit (429 or 503) - increases delay.
    ///
    /// A Retry-After value raises the delay to at least that long.
    pub async fn report_rate_limit(
        &self,
        domain: &str,
        status_code: u16,
        retry_after: Option<Duration>,
    ) {
        let Ok(mut state) = self
            .backend
            .get_or_create_domain(domain, self.base_delay_ms())
            .await
        else {
            return;
        };
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;

        let max_ms = self.config.max_delay.as_millis() as u64;
        let mut next = ((state.current_delay_ms.max(1) as f64) * self.config.backoff_multiplier) as u64;
        if let Some(ra) = retry_after {
            next = next.max(ra.as_millis() as u64);
        }
        state.current_delay_ms = next.min(max_ms);

        warn!(
            "Rate limited by {} (HTTP {}), backing off to {}ms",
            domain, status_code, state.current_delay_ms
        );
        if let Err(e) = self.backend.update_domain(&state).await {
            warn!("Rate limit backend error for {}: {}", domain, e);
        }
    }

    pub async fn stats(&self, domain: &str) -> Option<DomainStats> {
        let state = self
            .backend
            .get_or_create_domain(domain, self.base_delay_ms())
            .await
            .ok()?;
        Some(DomainStats {
            current_delay: state.current_delay(),
            in_backoff: state.in_backoff,
            total_requests: state.total_requests,
            rate_limit_hits: state.rate_limit_hits,
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(10),
            polite_ceiling: Duration::from_millis(30),
            max_delay: Duration::from_millis(200),
            recovery_threshold: 2,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://www.archives.gov/research/x.pdf"),
            Some("www.archives.gov".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_rate_limit_backs_off_and_caps() {
        let limiter = RateLimiter::new(fast_config());
        let domain = limiter.acquire("https://example.com/a").await.unwrap();

        limiter.report_rate_limit(&domain, 429, None).await;
        let stats = limiter.stats(&domain).await.unwrap();
        assert!(stats.in_backoff);
        assert_eq!(stats.current_delay, Duration::from_millis(20));

        for _ in 0..10 {
            limiter.report_rate_limit(&domain, 503, None).await;
        }
        let stats = limiter.stats(&domain).await.unwrap();
        assert_eq!(stats.current_delay, Duration::from_millis(200));
        assert_eq!(stats.rate_limit_hits, 11);
    }

    #[tokio::test]
    async fn test_retry_after_raises_delay() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_delay: Duration::from_secs(60),
            ..fast_config()
        });
        limiter.report_rate_limit("example.com", 429, Some(Duration::from_secs(5))).await;
        let stats = limiter.stats("example.com").await.unwrap();
        assert_eq!(stats.current_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_recovers_after_successes() {
        let limiter = RateLimiter::new(fast_config());
        limiter.report_rate_limit("example.com", 429, None).await;
        limiter.report_success("example.com").await;
        limiter.report_success("example.com").await;
        let stats = limiter.stats("example.com").await.unwrap();
        assert!(!stats.in_backoff);
        assert_eq!(stats.current_delay, Duration::from_millis(16));
    }

    #[test]
    fn test_definite_rate_limit_codes() {
        assert!(RateLimiter::is_definite_rate_limit(429));
        assert!(RateLimiter::is_definite_rate_limit(503));
        assert!(!RateLimiter::is_definite_rate_limit(403));
    }
}
