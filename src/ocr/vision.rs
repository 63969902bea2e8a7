//! Google Cloud Vision `DOCUMENT_TEXT_DETECTION` client.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{OcrError, Recognized, VisionService};
use crate::http_client::{HttpClient, HttpResponse};
use crate::rate_limit::{backoff_delay, parse_retry_after};

const MAX_RETRIES: u32 = 5;
const BACKEND: &str = "vision";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
struct Block {
    #[serde(default)]
    confidence: f64,
}

impl AnnotateResponse {
    /// Full text plus the unweighted mean of every block confidence.
    /// Pages without blocks contribute nothing.
    pub(crate) fn into_recognized(self) -> Result<Recognized, OcrError> {
        let response = self.responses.into_iter().next().unwrap_or_default();
        if let Some(status) = response.error {
            return Err(OcrError::OcrFailed(format!("vision: {}", status.message)));
        }
        let Some(annotation) = response.full_text_annotation else {
            return Ok(Recognized::new(String::new(), 0.0, 0));
        };
        let confidences: Vec<f64> = annotation
            .pages
            .iter()
            .flat_map(|p| p.blocks.iter().map(|b| b.confidence))
            .collect();
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Ok(Recognized::new(annotation.text, confidence, confidences.len()))
    }
}

/// Retry a request while it answers 429, honouring `Retry-After`.
pub async fn retry_on_rate_limit<F, Fut>(make_request: F) -> Result<HttpResponse, OcrError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<HttpResponse, OcrError>>,
{
    let mut attempt = 0;
    loop {
        let response = make_request().await?;
        if response.status.as_u16() != 429 {
            return Ok(response);
        }

        let retry_after = response.retry_after();
        let retry_after_secs = retry_after.and_then(|s| s.trim().parse::<u64>().ok());
        if attempt >= MAX_RETRIES {
            return Err(OcrError::RateLimited {
                backend: BACKEND,
                retry_after_secs,
            });
        }

        let wait: Duration =
            parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, 1000));
        warn!(
            "{} rate limited (attempt {}), waiting {:?}",
            BACKEND,
            attempt + 1,
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

pub struct GoogleVision {
    client: HttpClient,
    endpoint: String,
    api_key: String,
}

impl GoogleVision {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OcrError> {
        Ok(Self {
            client: HttpClient::api(crate::config::DEFAULT_USER_AGENT, timeout)?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    fn request_body(image: &[u8], language: &str) -> AnnotateRequest {
        // Vision takes BCP-47 hints; three-letter tesseract codes are left out.
        let image_context = (language.len() == 2).then(|| ImageContext {
            language_hints: vec![language.to_string()],
        });
        AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image),
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context,
            }],
        }
    }
}

#[async_trait]
impl VisionService for GoogleVision {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn recognize(&self, image: &[u8], language: &str) -> Result<Recognized, OcrError> {
        let body = Self::request_body(image, language);
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let response = retry_on_rate_limit(|| async {
            Ok(self.client.post_json(&url, &body).await?)
        })
        .await?;

        if !response.is_success() {
            let status = response.status;
            let text = response.text().await.unwrap_or_default();
            return Err(OcrError::OcrFailed(format!(
                "vision returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        let text = response.text().await?;
        let parsed: AnnotateResponse = serde_json::from_str(&text)
            .map_err(|e| OcrError::OcrFailed(format!("vision response: {}", e)))?;
        parsed.into_recognized()
    }
}
