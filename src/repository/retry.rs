//! Bounded retry for store writes.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::StoreError;
use crate::rate_limit::backoff_delay;

/// Run `op` up to `attempts` times, backing off exponentially from
/// `base_delay` between transient failures. Permanent errors return at once.
pub async fn with_retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = attempts.max(1);
    let base_ms = base_delay.as_millis() as u64;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let wait = backoff_delay(attempt, base_ms);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt + 1,
                    attempts,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
