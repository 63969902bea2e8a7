//! PDF helpers: poppler command-line tools and embedded image isolation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::{OcrError, PdfRasterizer};

const PDFTOTEXT_NOT_FOUND: &str = "pdftotext not found (install poppler-utils)";
const PDFTOPPM_NOT_FOUND: &str = "pdftoppm not found (install poppler-utils)";

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_IEND: &[u8] = b"IEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedKind {
    Jpeg,
    Png,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn jpeg_span(bytes: &[u8]) -> Option<(usize, usize)> {
    let start = find(bytes, &JPEG_SOI, 0)?;
    let end = find(bytes, &JPEG_EOI, start + JPEG_SOI.len())?;
    Some((start, end + JPEG_EOI.len()))
}

fn png_span(bytes: &[u8]) -> Option<(usize, usize)> {
    let start = find(bytes, &PNG_SIGNATURE, 0)?;
    let iend = find(bytes, PNG_IEND, start + PNG_SIGNATURE.len())?;
    // chunk type plus its CRC
    let end = (iend + PNG_IEND.len() + 4).min(bytes.len());
    Some((start, end))
}

/// Find the first complete JPEG or PNG stream inside a PDF byte stream.
pub fn find_embedded_image(bytes: &[u8]) -> Option<(EmbeddedKind, &[u8])> {
    let jpeg = jpeg_span(bytes).map(|s| (EmbeddedKind::Jpeg, s));
    let png = png_span(bytes).map(|s| (EmbeddedKind::Png, s));
    let (kind, (start, end)) = match (jpeg, png) {
        (Some(j), Some(p)) => {
            if j.1 .0 <= p.1 .0 {
                j
            } else {
                p
            }
        }
        (Some(j), None) => j,
        (None, Some(p)) => p,
        (None, None) => return None,
    };
    Some((kind, &bytes[start..end]))
}

/// Find the image file for a specific page number.
///
/// pdftoppm pads the page number to the width of the total page count.
pub fn find_page_image(dir: &Path, page: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let path = dir.join(format!("page-{:0width$}.png", page, width = digits));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Split pdftotext output into per-page texts.
pub fn split_pages(output: &str, expected: usize) -> Vec<String> {
    let mut pages: Vec<String> = output.split('\x0c').map(|p| p.to_string()).collect();
    if pages.len() > expected && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages.resize(expected, String::new());
    pages
}

/// Parse the `Pages:` line of pdfinfo output.
pub fn parse_pdfinfo_pages(output: &str) -> Option<u32> {
    output
        .lines()
        .find(|l| l.starts_with("Pages:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|n| n.parse().ok())
}

/// PDF tooling backed by poppler-utils.
pub struct PopplerPdf {
    dpi: u32,
}

impl PopplerPdf {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    async fn stage(pdf: &[u8]) -> Result<(TempDir, PathBuf), OcrError> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.pdf");
        tokio::fs::write(&path, pdf).await?;
        Ok((dir, path))
    }
}

impl Default for PopplerPdf {
    fn default() -> Self {
        Self::new(300)
    }
}

fn not_found(err: std::io::Error, message: &str) -> OcrError {
    if err.kind() == std::io::ErrorKind::NotFound {
        OcrError::BackendNotAvailable(message.to_string())
    } else {
        OcrError::Io(err)
    }
}

#[async_trait]
impl PdfRasterizer for PopplerPdf {
    async fn page_count(&self, pdf: &[u8]) -> Option<u32> {
        let (_dir, path) = Self::stage(pdf).await.ok()?;
        let output = Command::new("pdfinfo").arg(&path).output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract_text(
        &self,
        pdf: &[u8],
        first: u32,
        last: u32,
    ) -> Result<Vec<String>, OcrError> {
        let (_dir, path) = Self::stage(pdf).await?;
        let (first_arg, last_arg) = (first.to_string(), last.to_string());
        let output = Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8", "-f", &first_arg, "-l", &last_arg])
            .arg(&path)
            .arg("-")
            .output()
            .await
            .map_err(|e| not_found(e, PDFTOTEXT_NOT_FOUND))?;

        if !output.status.success() {
            return Err(OcrError::OcrFailed(format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let expected = (last - first + 1) as usize;
        Ok(split_pages(&String::from_utf8_lossy(&output.stdout), expected))
    }

    async fn rasterize(&self, pdf: &[u8], page: u32) -> Result<Vec<u8>, OcrError> {
        let (dir, path) = Self::stage(pdf).await?;
        let page_arg = page.to_string();
        let dpi = self.dpi.to_string();
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi, "-f", &page_arg, "-l", &page_arg])
            .arg(&path)
            .arg(dir.path().join("page"))
            .status()
            .await
            .map_err(|e| not_found(e, PDFTOPPM_NOT_FOUND))?;

        if !status.success() {
            return Err(OcrError::OcrFailed(format!(
                "pdftoppm failed to convert page {}",
                page
            )));
        }
        let image = find_page_image(dir.path(), page)
            .ok_or_else(|| OcrError::OcrFailed(format!("No image generated for page {}", page)))?;
        debug!("Rasterized page {} to {}", page, image.display());
        Ok(tokio::fs::read(image).await?)
    }
}
