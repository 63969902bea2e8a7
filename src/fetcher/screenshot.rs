//! Full-page browser screenshot as a last resort.

use std::sync::Arc;

use async_trait::async_trait;

use super::{FetchError, FetchStrategy};
use crate::browser::ScreenshotBrowser;
use crate::models::{ContentBuffer, FetchMethod, SourceReference, SourceRequest};

pub struct ScreenshotStrategy {
    browser: Arc<ScreenshotBrowser>,
}

impl ScreenshotStrategy {
    pub fn new(browser: Arc<ScreenshotBrowser>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl FetchStrategy for ScreenshotStrategy {
    fn method(&self) -> FetchMethod {
        FetchMethod::BrowserScreenshot
    }

    /// PDFs are never pulled through the browser.
    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::Url(_)) && !request.reference.has_pdf_path()
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        let SourceReference::Url(url) = &request.reference else {
            return Err(FetchError::NotApplicable);
        };
        let shot = self
            .browser
            .screenshot(url)
            .await
            .map_err(|e| FetchError::Browser(format!("{:#}", e)))?;
        if shot.png.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(ContentBuffer::new(
            shot.png,
            Some("image/png"),
            FetchMethod::BrowserScreenshot,
            shot.final_url,
        ))
    }
}
