//! Plain HTTP fetch methods: polite direct download and browser mimicry.

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, FetchStrategy};
use crate::http_client::HttpClient;
use crate::models::{AccessMode, ContentBuffer, FetchMethod, SourceReference, SourceRequest};

/// GET the URL and wrap the body in a content buffer.
pub(crate) async fn download(
    client: &HttpClient,
    url: &str,
    method: FetchMethod,
) -> Result<ContentBuffer, FetchError> {
    let response = client.get(url).await?;
    if !response.is_success() {
        return Err(FetchError::Status(response.status.as_u16()));
    }
    let content_type = response.content_type().map(str::to_string);
    let final_url = response.final_url.clone();
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(FetchError::Empty);
    }
    debug!("{} fetched {} bytes from {}", method, bytes.len(), final_url);
    Ok(ContentBuffer::new(
        bytes,
        content_type.as_deref(),
        method,
        final_url,
    ))
}

/// Direct or browser-mimic download, depending on the client profile.
pub struct HttpStrategy {
    client: HttpClient,
    method: FetchMethod,
}

impl HttpStrategy {
    pub fn direct(client: HttpClient) -> Self {
        Self {
            client,
            method: FetchMethod::DirectHttp,
        }
    }

    pub fn browser_mimic(client: HttpClient) -> Self {
        Self {
            client,
            method: FetchMethod::BrowserMimic,
        }
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn method(&self) -> FetchMethod {
        self.method
    }

    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::Url(_))
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        let SourceReference::Url(url) = &request.reference else {
            return Err(FetchError::NotApplicable);
        };
        let buffer = download(&self.client, url, self.method).await?;

        // A pdf-link archive answers with a viewer page; keep going down the cascade.
        if request.hints.access_mode == AccessMode::PdfLink && buffer.is_html() {
            return Err(FetchError::LandingPage(buffer.mime().to_string()));
        }
        Ok(buffer)
    }
}
