//! Acquisition cascade.
//!
//! A source is tried against each applicable [`FetchStrategy`] in order:
//! direct download, browser mimicry, PDF-link extraction, and a headless
//! browser screenshot. The first success wins. Callers get the same
//! [`ContentBuffer`] whichever method produced it, plus the attempt history.

mod error;
mod http;
mod pdf_link;
#[cfg(feature = "browser")]
mod screenshot;
mod upload;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use error::{FetchAttempt, FetchError, FetchFailure};
pub use http::HttpStrategy;
pub use pdf_link::{find_pdf_link, PdfLinkStrategy};
#[cfg(feature = "browser")]
pub use screenshot::ScreenshotStrategy;
pub use upload::UploadStrategy;

use crate::config::FetchConfig;
use crate::http_client::HttpClient;
use crate::models::{ContentBuffer, FetchMethod, SourceRequest};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// One way of turning a source reference into bytes.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn method(&self) -> FetchMethod;

    /// Whether this method should be tried for the request at all.
    fn applies(&self, request: &SourceRequest) -> bool;

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError>;
}

/// A successful fetch and every attempt that led to it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub buffer: ContentBuffer,
    pub attempts: Vec<FetchAttempt>,
}

pub struct Fetcher {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    method_timeout: Duration,
}

impl Fetcher {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>) -> Self {
        Self {
            strategies,
            method_timeout: Duration::from_secs(120),
        }
    }

    /// Upper bound for any single method, on top of its own timeouts.
    pub fn with_method_timeout(mut self, timeout: Duration) -> Self {
        self.method_timeout = timeout;
        self
    }

    /// The standard cascade. Both HTTP profiles share one rate limiter so
    /// politeness holds across methods.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let limiter = RateLimiter::new(RateLimitConfig::from_fetch(config));
        let polite = HttpClient::polite(config, limiter.clone())?;
        let mimic = HttpClient::browser_mimic(config, limiter)?;

        #[allow(unused_mut)]
        let mut strategies: Vec<Arc<dyn FetchStrategy>> = vec![
            Arc::new(UploadStrategy),
            Arc::new(HttpStrategy::direct(polite)),
            Arc::new(HttpStrategy::browser_mimic(mimic.clone())),
            Arc::new(PdfLinkStrategy::new(mimic)),
        ];
        #[cfg(feature = "browser")]
        strategies.push(Arc::new(ScreenshotStrategy::new(Arc::new(
            crate::browser::ScreenshotBrowser::new(config.clone()),
        ))));

        let navigation = Duration::from_secs(config.navigation_timeout_secs)
            + Duration::from_millis(config.settle_delay_ms);
        Ok(Self::new(strategies)
            .with_method_timeout(config.request_timeout().max(navigation) * 2))
    }

    pub fn methods(&self) -> Vec<FetchMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Run the cascade, stopping at the first method that succeeds.
    pub async fn fetch(&self, request: &SourceRequest) -> Result<FetchOutcome, FetchFailure> {
        let source_url = request.source_url();
        let mut attempts = Vec::new();

        for strategy in self.strategies.iter().filter(|s| s.applies(request)) {
            let method = strategy.method();
            let started = Instant::now();
            debug!("Trying {} for {}", method, source_url);

            let result = match tokio::time::timeout(self.method_timeout, strategy.fetch(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.method_timeout)),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(buffer) => {
                    info!(
                        "Fetched {} via {} ({} bytes, {})",
                        source_url,
                        method,
                        buffer.len(),
                        buffer.mime()
                    );
                    attempts.push(FetchAttempt {
                        method,
                        error: None,
                        elapsed_ms,
                    });
                    return Ok(FetchOutcome { buffer, attempts });
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", method, source_url, e);
                    attempts.push(FetchAttempt {
                        method,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        Err(FetchFailure {
            source_url,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceReference;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        method: FetchMethod,
        succeed: bool,
        pdf_only: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(method: FetchMethod, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                method,
                succeed,
                pdf_only: false,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        fn method(&self) -> FetchMethod {
            self.method
        }

        fn applies(&self, request: &SourceRequest) -> bool {
            !self.pdf_only || !request.reference.has_pdf_path()
        }

        async fn fetch(&self, _request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(ContentBuffer::new(
                    b"%PDF-1.4".to_vec(),
                    None,
                    self.method,
                    "https://a.test/v.pdf",
                ))
            } else {
                Err(FetchError::Status(403))
            }
        }
    }

    fn request(url: &str) -> SourceRequest {
        SourceRequest::new(SourceReference::Url(url.to_string()))
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let direct = Scripted::new(FetchMethod::DirectHttp, false);
        let mimic = Scripted::new(FetchMethod::BrowserMimic, true);
        let shot = Scripted::new(FetchMethod::BrowserScreenshot, true);
        let fetcher = Fetcher::new(vec![
            direct.clone() as Arc<dyn FetchStrategy>,
            mimic.clone(),
            shot.clone(),
        ]);

        let outcome = fetcher.fetch(&request("https://a.test/page")).await.unwrap();
        assert_eq!(outcome.buffer.method(), FetchMethod::BrowserMimic);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].succeeded());
        assert!(outcome.attempts[1].succeeded());
        assert_eq!(shot.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_cascade_lists_attempts() {
        let fetcher = Fetcher::new(vec![
            Scripted::new(FetchMethod::DirectHttp, false) as Arc<dyn FetchStrategy>,
            Scripted::new(FetchMethod::BrowserMimic, false),
        ]);
        let failure = fetcher.fetch(&request("https://a.test/page")).await.unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        assert_eq!(failure.attempts[1].method, FetchMethod::BrowserMimic);
    }

    #[tokio::test]
    async fn test_pdf_path_skips_browser_methods() {
        let direct = Scripted::new(FetchMethod::DirectHttp, false);
        let shot = Arc::new(Scripted {
            method: FetchMethod::BrowserScreenshot,
            succeed: true,
            pdf_only: true,
            calls: AtomicUsize::new(0),
        });
        let fetcher = Fetcher::new(vec![direct as Arc<dyn FetchStrategy>, shot.clone()]);
        let failure = fetcher
            .fetch(&request("https://a.test/vol/812.pdf"))
            .await
            .unwrap_err();
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(shot.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_real_strategies_respect_pdf_paths() {
        let config = FetchConfig::default();
        let limiter = RateLimiter::disabled();
        let mimic = HttpClient::browser_mimic(&config, limiter).unwrap();
        let strategy = PdfLinkStrategy::new(mimic);
        assert!(!strategy.applies(&request("https://a.test/812.pdf")));
        assert!(strategy.applies(&request("https://a.test/item/812")));

        let file = SourceRequest::new(SourceReference::File("scan.png".into()));
        assert!(UploadStrategy.applies(&file));
        assert!(!strategy.applies(&file));
    }

    #[test]
    fn test_standard_cascade_order() {
        let fetcher = Fetcher::from_config(&FetchConfig::default()).unwrap();
        let methods = fetcher.methods();
        assert_eq!(
            &methods[..4],
            &[
                FetchMethod::Upload,
                FetchMethod::DirectHttp,
                FetchMethod::BrowserMimic,
                FetchMethod::PdfLinkExtract
            ]
        );
    }
}
