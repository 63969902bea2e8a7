//! Per-domain politeness and backoff for archive requests.
//!
//! The fetcher waits on a [`RateLimiter`] before every request. Delays start
//! at the polite floor, double on 429/503 responses and recover on success.
//! Domain state lives behind a pluggable [`RateLimitBackend`].

mod backend;
mod config;
mod limiter;
mod memory;

pub use backend::{DomainRateState, RateLimitBackend, RateLimitError, RateLimitResult};
pub use config::{DomainStats, RateLimitConfig};
pub use limiter::RateLimiter;
pub use memory::InMemoryRateLimitBackend;

use std::time::Duration;

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Calculate exponential backoff delay for a given attempt.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(60_000))
}
