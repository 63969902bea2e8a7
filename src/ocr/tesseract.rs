//! Tesseract fallback through its command-line interface.

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{FallbackOcr, OcrError};

const TESSERACT_NOT_FOUND: &str = "tesseract not found (install tesseract-ocr)";

/// Text and mean word confidence (0-100) rebuilt from `tsv` output.
///
/// Words keep their line grouping; lines from different blocks or
/// paragraphs are separated by newlines as well.
pub fn parse_tsv(tsv: &str) -> (String, f64, usize) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32, u32)> = None;
    let mut current: Vec<&str> = Vec::new();
    let mut conf_sum = 0.0;
    let mut words = 0usize;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        let key = |i: usize| fields[i].parse::<u32>().unwrap_or(0);
        let line_key = (key(1), key(2), key(3), key(4));
        if current_key != Some(line_key) {
            if !current.is_empty() {
                lines.push(current.join(" "));
                current.clear();
            }
            current_key = Some(line_key);
        }
        current.push(text);

        if let Ok(conf) = fields[10].trim().parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                words += 1;
            }
        }
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }

    let confidence = if words == 0 {
        0.0
    } else {
        conf_sum / words as f64
    };
    (lines.join("\n"), confidence, words)
}

/// Runs `tesseract <image> stdout -l <lang> tsv`.
#[derive(Default)]
pub struct TesseractCli;

impl TesseractCli {
    pub fn new() -> Self {
        Self
    }

    /// Whether the binary is on PATH.
    pub fn is_available() -> bool {
        which::which("tesseract").is_ok()
    }
}

#[async_trait]
impl FallbackOcr for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &[u8],
        language: &str,
    ) -> Result<(String, f64, usize), OcrError> {
        let dir = TempDir::new()?;
        let path = dir.path().join("page.png");
        tokio::fs::write(&path, image).await?;

        let output = Command::new("tesseract")
            .arg(&path)
            .arg("stdout")
            .args(["-l", language, "tsv"])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OcrError::BackendNotAvailable(TESSERACT_NOT_FOUND.to_string())
                } else {
                    OcrError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(OcrError::OcrFailed(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}
