//! Rate limiter configuration and types.

use std::time::Duration;

use crate::config::FetchConfig;

/// Ceiling for backoff after repeated 429/503 responses.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Polite delay between requests to the same domain.
    pub base_delay: Duration,
    /// Upper end of the polite range; recovery settles back below this.
    pub polite_ceiling: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on rate limit.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            polite_ceiling: Duration::from_secs(3),
            max_delay: MAX_BACKOFF,
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 3,
        }
    }
}

impl RateLimitConfig {
    pub fn from_fetch(fetch: &FetchConfig) -> Self {
        Self {
            base_delay: fetch.min_delay(),
            polite_ceiling: fetch.max_delay(),
            ..Self::default()
        }
    }
}

/// Statistics for a domain.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}
