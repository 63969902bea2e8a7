//! Seams for the external recognition tools.

use async_trait::async_trait;

use super::OcrError;

/// Text recognized from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognized {
    pub text: String,
    /// Normalized to [0, 1].
    pub confidence: f64,
    /// Number of scored units (blocks or words) behind `confidence`.
    pub units: usize,
}

impl Recognized {
    pub fn new(text: impl Into<String>, confidence: f64, units: usize) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            units,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Primary cloud OCR: image bytes in, full text and mean block confidence out.
#[async_trait]
pub trait VisionService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image: &[u8], language: &str) -> Result<Recognized, OcrError>;
}

/// Local fallback OCR.
///
/// Implementations report confidence on a 0-100 scale; the engine
/// normalizes it.
#[async_trait]
pub trait FallbackOcr: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `(text, confidence 0-100, scored words)`.
    async fn recognize(&self, image: &[u8], language: &str)
        -> Result<(String, f64, usize), OcrError>;
}

/// PDF text layer and page rendering.
#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn page_count(&self, pdf: &[u8]) -> Option<u32>;

    /// Text layer per page for the inclusive range.
    async fn extract_text(&self, pdf: &[u8], first: u32, last: u32)
        -> Result<Vec<String>, OcrError>;

    /// Render one page to PNG bytes.
    async fn rasterize(&self, pdf: &[u8], page: u32) -> Result<Vec<u8>, OcrError>;
}
