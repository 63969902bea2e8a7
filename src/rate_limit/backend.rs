//! Pluggable backend trait for rate limiting storage.

use async_trait::async_trait;
use std::time::Duration;

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// State for a domain's rate limiting.
#[derive(Debug, Clone)]
pub struct DomainRateState {
    pub domain: String,
    pub current_delay_ms: u64,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl DomainRateState {
    pub fn new(domain: String, base_delay_ms: u64) -> Self {
        Self {
            domain,
            current_delay_ms: base_delay_ms,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.current_delay_ms)
    }
}

/// Trait for rate limit storage backends.
///
/// Implementations must be thread-safe and handle concurrent access.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Get or create state for a domain.
    async fn get_or_create_domain(
        &self,
        domain: &str,
        base_delay_ms: u64,
    ) -> RateLimitResult<DomainRateState>;

    /// Update domain state after a request.
    async fn update_domain(&self, state: &DomainRateState) -> RateLimitResult<()>;

    /// Atomically acquire a request slot for a domain.
    /// Returns the wait time (0 if ready now), and marks the request as started.
    async fn acquire(&self, domain: &str, base_delay_ms: u64) -> RateLimitResult<Duration>;
}
