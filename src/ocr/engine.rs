//! OCR dispatch and arbitration between the two tiers.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Node};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::image_prep::prepare_blocking;
use super::pdf_utils::find_embedded_image;
use super::{
    FallbackOcr, GoogleVision, OcrError, PdfRasterizer, PopplerPdf, Recognized, TesseractCli,
    VisionService,
};
use crate::config::OcrConfig;
use crate::models::{ContentBuffer, OcrOptions, OcrResult, OcrService, PageAnnotation};

const PDF_TEXT_CONFIDENCE: f64 = 0.9;
const DOCUMENT_TEXT_CONFIDENCE: f64 = 0.9;

const BLOCK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "pre", "section",
];

/// One recognized page.
struct PageText {
    page: u32,
    text: Recognized,
    service: OcrService,
}

/// Shared, read-only OCR handle. Built once per process.
pub struct OcrEngine {
    vision: Option<Arc<dyn VisionService>>,
    fallback: Option<Arc<dyn FallbackOcr>>,
    pdf: Arc<dyn PdfRasterizer>,
    config: OcrConfig,
}

impl OcrEngine {
    pub fn new(config: OcrConfig, pdf: Arc<dyn PdfRasterizer>) -> Self {
        Self {
            vision: None,
            fallback: None,
            pdf,
            config,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionService>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackOcr>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Wire up the configured services: Vision when an API key is set,
    /// Tesseract when the binary is installed, poppler for PDFs.
    pub fn from_config(config: &OcrConfig) -> Self {
        let mut engine = Self::new(config.clone(), Arc::new(PopplerPdf::new(config.pdf_dpi)));

        match config.vision_api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                match GoogleVision::new(&config.vision_endpoint, key, config.call_timeout()) {
                    Ok(vision) => engine = engine.with_vision(Arc::new(vision)),
                    Err(e) => warn!("Vision client unavailable: {}", e),
                }
            }
            _ => debug!("No vision API key configured; using fallback OCR only"),
        }

        if TesseractCli::is_available() {
            engine = engine.with_fallback(Arc::new(TesseractCli::new()));
        } else {
            debug!("tesseract not found on PATH");
        }
        engine
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Recognize the text of a content buffer. Never fails: a total failure
    /// is an empty result carrying the error.
    pub async fn ocr(&self, buffer: &ContentBuffer, options: &OcrOptions) -> OcrResult {
        let language = options.language_or(&self.config.language).to_string();

        if buffer.is_html() {
            let text = html_to_text(&String::from_utf8_lossy(buffer.bytes()));
            return OcrResult::new(text, DOCUMENT_TEXT_CONFIDENCE, OcrService::DocumentText, 1);
        }
        if buffer.is_text() {
            let text = String::from_utf8_lossy(buffer.bytes()).into_owned();
            return OcrResult::new(text, DOCUMENT_TEXT_CONFIDENCE, OcrService::DocumentText, 1);
        }
        if buffer.is_pdf() {
            return self.ocr_pdf(buffer.bytes(), options, &language).await;
        }
        if buffer.is_image() {
            let deadline = Instant::now() + self.config.budget_for(1);
            return self
                .ocr_images(vec![(1, buffer.bytes().to_vec())], &language, deadline, false)
                .await;
        }
        OcrResult::empty(format!("unsupported content type {}", buffer.mime()))
    }

    async fn ocr_pdf(&self, bytes: &[u8], options: &OcrOptions, language: &str) -> OcrResult {
        let total = self.pdf.page_count(bytes).await;
        let (first, last) = match (options.page_range(), total) {
            (Some((a, _)), Some(n)) if a > n => {
                return OcrResult::empty(format!("page {} is beyond the document's {} pages", a, n));
            }
            (Some((a, b)), Some(n)) => (a, b.min(n)),
            (Some(range), None) => range,
            (None, Some(n)) => (1, n.max(1)),
            (None, None) => (1, 1),
        };
        let deadline = Instant::now() + self.config.budget_for(last - first + 1);

        match self.pdf.extract_text(bytes, first, last).await {
            Ok(texts) => {
                let length: usize = texts.iter().map(|t| t.trim().len()).sum();
                if length > self.config.min_pdf_text_length {
                    info!("Using PDF text layer ({} chars, pages {}-{})", length, first, last);
                    let pages = texts
                        .iter()
                        .zip(first..)
                        .map(|(text, page)| PageAnnotation {
                            page,
                            text: text.clone(),
                            confidence: if text.trim().is_empty() { 0.0 } else { PDF_TEXT_CONFIDENCE },
                            service: OcrService::PdfText,
                        })
                        .collect();
                    return OcrResult::new(
                        texts.join("\n"),
                        PDF_TEXT_CONFIDENCE,
                        OcrService::PdfText,
                        last - first + 1,
                    )
                    .with_pages(pages);
                }
                debug!("PDF text layer too short ({} chars); using image OCR", length);
            }
            Err(e) => debug!("PDF text extraction failed: {}", e),
        }

        let mut images: Vec<(u32, Vec<u8>)> = Vec::new();
        if total.unwrap_or(1) <= 1 {
            if let Some((kind, image)) = find_embedded_image(bytes) {
                debug!("Isolated embedded {:?} image ({} bytes)", kind, image.len());
                images.push((first, image.to_vec()));
            }
        }
        if images.is_empty() {
            for page in first..=last {
                if Instant::now() >= deadline {
                    warn!("OCR budget exhausted while rasterizing page {}", page);
                    break;
                }
                match self.pdf.rasterize(bytes, page).await {
                    Ok(image) => images.push((page, image)),
                    Err(e) => {
                        warn!("Could not rasterize page {}: {}", page, e);
                        if e.is_unavailable() {
                            break;
                        }
                    }
                }
            }
        }
        if images.is_empty() {
            if let Some((_, image)) = find_embedded_image(bytes) {
                images.push((first, image.to_vec()));
            }
        }
        if images.is_empty() {
            return OcrResult::empty("no page image could be isolated from the PDF");
        }

        self.ocr_images(images, language, deadline, true).await
    }

    async fn ocr_images(
        &self,
        images: Vec<(u32, Vec<u8>)>,
        language: &str,
        deadline: Instant,
        annotate: bool,
    ) -> OcrResult {
        let page_count = images.len() as u32;
        let mut pages = Vec::new();
        let mut last_error: Option<String> = None;

        for (page, raw) in images {
            if Instant::now() >= deadline {
                last_error = Some(format!("OCR budget exhausted before page {}", page));
                warn!("OCR budget exhausted before page {}", page);
                break;
            }
            let image = match prepare_blocking(raw.clone(), self.config.max_image_width).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    debug!("Image preparation failed for page {}: {}; using raw bytes", page, e);
                    raw
                }
            };
            match self.recognize(&image, language, deadline).await {
                Ok((text, service)) => pages.push(PageText {
                    page,
                    text,
                    service,
                }),
                Err(e) => {
                    warn!("OCR failed on page {}: {}", page, e);
                    last_error = Some(format!("page {}: {}", page, e));
                }
            }
        }

        combine(pages, page_count, last_error, annotate)
    }

    /// Primary first; fall back when it is unsure or unavailable and keep
    /// whichever result is more confident. Ties go to the primary.
    async fn recognize(
        &self,
        image: &[u8],
        language: &str,
        deadline: Instant,
    ) -> Result<(Recognized, OcrService), OcrError> {
        let mut last_error = OcrError::BackendNotAvailable("no OCR backend configured".to_string());

        let primary = match &self.vision {
            Some(vision) => {
                let limit = self.call_limit(deadline);
                match timeout(limit, vision.recognize(image, language)).await {
                    Ok(Ok(result)) => Some(result),
                    Ok(Err(e)) => {
                        warn!("{} failed: {}", vision.name(), e);
                        last_error = e;
                        None
                    }
                    Err(_) => {
                        warn!("{} timed out after {:?}", vision.name(), limit);
                        last_error = OcrError::Timeout(limit);
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(p) = &primary {
            if p.confidence >= self.config.accept_threshold {
                return Ok((p.clone(), OcrService::Vision));
            }
            debug!(
                "Primary confidence {:.2} below {:.2}; trying fallback",
                p.confidence, self.config.accept_threshold
            );
        }

        let fallback = match &self.fallback {
            Some(fallback) => {
                let limit = self.call_limit(deadline);
                match timeout(limit, fallback.recognize(image, language)).await {
                    Ok(Ok((text, percent, words))) => {
                        Some(Recognized::new(text, percent / 100.0, words))
                    }
                    Ok(Err(e)) => {
                        warn!("{} failed: {}", fallback.name(), e);
                        last_error = e;
                        None
                    }
                    Err(_) => {
                        warn!("{} timed out after {:?}", fallback.name(), limit);
                        last_error = OcrError::Timeout(limit);
                        None
                    }
                }
            }
            None => None,
        };

        match (primary, fallback) {
            (Some(p), Some(f)) if f.confidence > p.confidence => Ok((f, OcrService::FallbackOcr)),
            (Some(p), _) => Ok((p, OcrService::Vision)),
            (None, Some(f)) => Ok((f, OcrService::FallbackOcr)),
            (None, None) => Err(last_error),
        }
    }

    fn call_limit(&self, deadline: Instant) -> Duration {
        self.config
            .call_timeout()
            .min(deadline.saturating_duration_since(Instant::now()))
    }
}

/// Merge per-page results. Confidence is the mean over every scored unit,
/// so a sparse page weighs less than a dense one.
fn combine(
    pages: Vec<PageText>,
    page_count: u32,
    error: Option<String>,
    annotate: bool,
) -> OcrResult {
    if pages.is_empty() {
        return OcrResult::empty(error.unwrap_or_else(|| "no text recognized".to_string()));
    }

    let units: usize = pages.iter().map(|p| p.text.units).sum();
    let readable: Vec<&PageText> = pages.iter().filter(|p| !p.text.is_empty()).collect();
    let confidence = if units > 0 {
        pages
            .iter()
            .map(|p| p.text.confidence * p.text.units as f64)
            .sum::<f64>()
            / units as f64
    } else if readable.is_empty() {
        0.0
    } else {
        readable.iter().map(|p| p.text.confidence).sum::<f64>() / readable.len() as f64
    };

    let service = if pages.iter().any(|p| p.service == OcrService::Vision) {
        OcrService::Vision
    } else {
        OcrService::FallbackOcr
    };
    let text = readable
        .iter()
        .map(|p| p.text.text.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut result = OcrResult::new(text, confidence, service, page_count);
    if annotate {
        result = result.with_pages(
            pages
                .iter()
                .map(|p| PageAnnotation {
                    page: p.page,
                    text: p.text.text.clone(),
                    confidence: p.text.confidence,
                    service: p.service,
                })
                .collect(),
        );
    }
    result.error = error;
    result
}

/// Visible text of an HTML document with block elements on their own lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name()))
                    .is_some_and(|name| matches!(name, "script" | "style" | "head" | "title"));
                if !hidden {
                    out.push_str(text);
                }
            }
            _ => {}
        }
    }
    out.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
