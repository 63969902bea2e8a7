//! Process-local rate limit state. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{DomainRateState, RateLimitBackend, RateLimitResult};

/// One archive host: its adaptive state plus the next free request slot.
#[derive(Debug)]
struct HostSlot {
    state: DomainRateState,
    ready_at: Option<Instant>,
}

impl HostSlot {
    fn new(host: &str, base_delay_ms: u64) -> Self {
        Self {
            state: DomainRateState::new(host.to_string(), base_delay_ms),
            ready_at: None,
        }
    }

    /// Reserve the next slot and return how long the caller must wait for it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.ready_at.map_or(now, |ready| ready.max(now));
        self.ready_at = Some(start + self.state.current_delay());
        self.state.total_requests += 1;
        start - now
    }
}

/// Host slots behind one lock, so concurrent jobs hitting the same archive
/// queue up behind each other.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    hosts: Arc<Mutex<HashMap<String, HostSlot>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn get_or_create_domain(
        &self,
        domain: &str,
        base_delay_ms: u64,
    ) -> RateLimitResult<DomainRateState> {
        let mut hosts = self.hosts.lock().await;
        let slot = hosts
            .entry(domain.to_string())
            .or_insert_with(|| HostSlot::new(domain, base_delay_ms));
        Ok(slot.state.clone())
    }

    async fn update_domain(&self, state: &DomainRateState) -> RateLimitResult<()> {
        let mut hosts = self.hosts.lock().await;
        if let Some(slot) = hosts.get_mut(&state.domain) {
            // Requests reserved since the caller read its copy still count.
            let total_requests = slot.state.total_requests.max(state.total_requests);
            slot.state = state.clone();
            slot.state.total_requests = total_requests;
        }
        Ok(())
    }

    async fn acquire(&self, domain: &str, base_delay_ms: u64) -> RateLimitResult<Duration> {
        let mut hosts = self.hosts.lock().await;
        let slot = hosts
            .entry(domain.to_string())
            .or_insert_with(|| HostSlot::new(domain, base_delay_ms));
        Ok(slot.reserve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_to_an_archive_goes_immediately() {
        let backend = InMemoryRateLimitBackend::new();
        let wait = backend.acquire("archives.gov", 100).await.unwrap();
        assert_eq!(wait, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_back_to_back_requests_queue_up() {
        let backend = InMemoryRateLimitBackend::new();
        backend.acquire("archives.gov", 100).await.unwrap();
        let second = backend.acquire("archives.gov", 100).await.unwrap();
        let third = backend.acquire("archives.gov", 100).await.unwrap();

        assert!(second > Duration::from_millis(90) && second <= Duration::from_millis(100));
        assert!(third > Duration::from_millis(190) && third <= Duration::from_millis(200));
        // Other hosts are unaffected.
        assert_eq!(backend.acquire("msa.maryland.gov", 100).await.unwrap(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_backoff_state_is_kept() {
        let backend = InMemoryRateLimitBackend::new();
        let mut state = backend.get_or_create_domain("archives.gov", 100).await.unwrap();
        backend.acquire("archives.gov", 100).await.unwrap();

        state.current_delay_ms = 500;
        state.in_backoff = true;
        state.rate_limit_hits = 3;
        backend.update_domain(&state).await.unwrap();

        let loaded = backend.get_or_create_domain("archives.gov", 100).await.unwrap();
        assert_eq!(loaded.current_delay_ms, 500);
        assert!(loaded.in_backoff);
        assert_eq!(loaded.rate_limit_hits, 3);
        assert_eq!(loaded.total_requests, 1);
    }
}
