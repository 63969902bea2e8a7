//! OCR results and options.

use serde::{Deserialize, Serialize};

/// Which service produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrService {
    /// Embedded text layer of a PDF.
    PdfText,
    /// Cloud vision primary service.
    Vision,
    /// Local fallback OCR.
    FallbackOcr,
    /// Text read directly from an HTML or plain-text document.
    DocumentText,
    #[default]
    None,
}

impl OcrService {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfText => "pdf-text",
            Self::Vision => "vision",
            Self::FallbackOcr => "fallback-ocr",
            Self::DocumentText => "document-text",
            Self::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pdf-text" => Some(Self::PdfText),
            "vision" => Some(Self::Vision),
            "fallback-ocr" => Some(Self::FallbackOcr),
            "document-text" => Some(Self::DocumentText),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnnotation {
    pub page: u32,
    pub text: String,
    pub confidence: f64,
    pub service: OcrService,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
    pub service: OcrService,
    pub page_count: u32,
    #[serde(default)]
    pub pages: Vec<PageAnnotation>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrResult {
    /// Build a result, forcing confidence to 0 when the text is empty.
    pub fn new(text: String, confidence: f64, service: OcrService, page_count: u32) -> Self {
        let confidence = if text.trim().is_empty() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text,
            confidence,
            service,
            page_count,
            pages: Vec::new(),
            error: None,
        }
    }

    /// The total-failure result.
    pub fn empty(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            service: OcrService::None,
            page_count: 0,
            pages: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_pages(mut self, pages: Vec<PageAnnotation>) -> Self {
        self.pages = pages;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Page selection and language for a job's OCR pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Inclusive 1-based page range, e.g. `"1-3"` or `"5"`.
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl OcrOptions {
    /// Parse the page range. `None` means all pages.
    pub fn page_range(&self) -> Option<(u32, u32)> {
        let spec = self.pages.as_deref()?.trim();
        if spec.is_empty() {
            return None;
        }
        match spec.split_once('-') {
            Some((a, b)) => {
                let start: u32 = a.trim().parse().ok()?;
                let end: u32 = b.trim().parse().ok()?;
                (start >= 1 && end >= start).then_some((start, end))
            }
            None => {
                let page: u32 = spec.parse().ok()?;
                (page >= 1).then_some((page, page))
            }
        }
    }

    pub fn language_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.language.as_deref().unwrap_or(default)
    }
}
