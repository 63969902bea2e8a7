//! Content buffers produced by the fetcher.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How a content buffer was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    DirectHttp,
    BrowserMimic,
    PdfLinkExtract,
    BrowserScreenshot,
    /// File handed to the pipeline directly.
    Upload,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectHttp => "direct_http",
            Self::BrowserMimic => "browser_mimic",
            Self::PdfLinkExtract => "pdf_link_extract",
            Self::BrowserScreenshot => "browser_screenshot",
            Self::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct_http" => Some(Self::DirectHttp),
            "browser_mimic" => Some(Self::BrowserMimic),
            "pdf_link_extract" => Some(Self::PdfLinkExtract),
            "browser_screenshot" => Some(Self::BrowserScreenshot),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bytes plus detected MIME type and origin. Immutable once built.
#[derive(Debug, Clone)]
pub struct ContentBuffer {
    bytes: Arc<[u8]>,
    mime: String,
    method: FetchMethod,
    final_url: String,
}

impl ContentBuffer {
    /// Build a buffer, sniffing the MIME type from the bytes first and
    /// falling back to the declared type.
    pub fn new(
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
        method: FetchMethod,
        final_url: impl Into<String>,
    ) -> Self {
        let mime = detect_mime(&bytes, declared_mime, None);
        Self {
            bytes: Arc::from(bytes),
            mime,
            method,
            final_url: final_url.into(),
        }
    }

    /// Build a buffer from a local file's contents.
    pub fn from_file(bytes: Vec<u8>, path: &Path) -> Self {
        let mime = detect_mime(&bytes, None, Some(path));
        Self {
            bytes: Arc::from(bytes),
            mime,
            method: FetchMethod::Upload,
            final_url: format!("file://{}", path.display()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn method(&self) -> FetchMethod {
        self.method
    }

    pub fn final_url(&self) -> &str {
        &self.final_url
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_pdf(&self) -> bool {
        self.mime == "application/pdf"
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn is_html(&self) -> bool {
        self.mime == "text/html" || self.mime == "application/xhtml+xml"
    }

    pub fn is_text(&self) -> bool {
        self.mime.starts_with("text/") && !self.is_html()
    }
}

/// Detect a MIME type: magic bytes, then the declared header, then the file extension.
pub fn detect_mime(bytes: &[u8], declared: Option<&str>, path: Option<&Path>) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    if let Some(declared) = declared {
        let base = declared
            .split(';')
            .next()
            .unwrap_or(declared)
            .trim()
            .to_lowercase();
        if !base.is_empty() && base != "application/octet-stream" {
            return base;
        }
    }

    if let Some(path) = path {
        if let Some(guess) = mime_guess::from_path(path).first() {
            return guess.essence_str().to_string();
        }
    }

    if looks_like_html(bytes) {
        return "text/html".to_string();
    }

    if std::str::from_utf8(bytes).is_ok() {
        return "text/plain".to_string();
    }

    "application/octet-stream".to_string()
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head).to_lowercase();
    head.contains("<!doctype html") || head.contains("<html")
}
