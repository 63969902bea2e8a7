//! Two-tier text recognition.
//!
//! The [`OcrEngine`] turns a content buffer into an [`OcrResult`](crate::models::OcrResult):
//! - PDFs try their embedded text layer first and fall through to image OCR
//! - images go to the primary vision service, then the local fallback when
//!   the primary is unsure or unavailable
//! - HTML and plain text are read directly
//!
//! The external tools sit behind traits so tests can swap them out.

mod backend;
mod engine;
pub mod image_prep;
pub mod pdf_utils;
pub mod tesseract;
pub mod vision;

use std::time::Duration;

use thiserror::Error;

pub use backend::{FallbackOcr, PdfRasterizer, Recognized, VisionService};
pub use engine::OcrEngine;
pub use pdf_utils::PopplerPdf;
pub use tesseract::TesseractCli;
pub use vision::GoogleVision;

/// Errors from a single OCR call.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("{backend} rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited {
        backend: &'static str,
        retry_after_secs: Option<u64>,
    },

    #[error("OCR call timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

impl OcrError {
    /// Unavailable backends are skipped rather than compared.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendNotAvailable(_))
    }
}

impl From<reqwest::Error> for OcrError {
    fn from(err: reqwest::Error) -> Self {
        Self::OcrFailed(format!("request failed: {}", err))
    }
}

impl From<image::ImageError> for OcrError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
