//! Per-page coverage accounting.

use serde::{Deserialize, Serialize};

use super::ocr::OcrService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub source_url: String,
    pub volume_id: String,
    pub page_number: u32,
    pub ocr_service: OcrService,
    pub ocr_confidence: f64,
    pub ocr_text_length: usize,
    pub detected_rows: usize,
    /// Entity records actually inserted during this pass.
    pub emitted_persons: usize,
    pub named_persons: usize,
    pub placeholder_persons: usize,
    pub owner_candidates: Vec<String>,
    pub owner_assigned: Option<String>,
    /// Set when rows exist but no owner candidate was found.
    #[serde(default)]
    pub owner_warning: Option<String>,
}

impl CoverageRecord {
    pub fn empty(source_url: impl Into<String>, volume_id: impl Into<String>, page: u32) -> Self {
        Self {
            source_url: source_url.into(),
            volume_id: volume_id.into(),
            page_number: page,
            ocr_service: OcrService::None,
            ocr_confidence: 0.0,
            ocr_text_length: 0,
            detected_rows: 0,
            emitted_persons: 0,
            named_persons: 0,
            placeholder_persons: 0,
            owner_candidates: Vec::new(),
            owner_assigned: None,
            owner_warning: None,
        }
    }

    /// Named plus placeholder must account for every detected row, and a page
    /// with rows needs either an owner or a warning.
    pub fn is_consistent(&self) -> bool {
        let accounted = self.named_persons + self.placeholder_persons == self.detected_rows;
        let owner_ok = self.detected_rows == 0
            || self.owner_assigned.is_some()
            || self.owner_warning.is_some();
        accounted && owner_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_consistent() {
        assert!(CoverageRecord::empty("u", "812", 47).is_consistent());
    }

    #[test]
    fn test_rows_without_owner_need_warning() {
        let mut c = CoverageRecord::empty("u", "812", 47);
        c.detected_rows = 2;
        c.named_persons = 1;
        c.placeholder_persons = 1;
        assert!(!c.is_consistent());
        c.owner_warning = Some("no owner".to_string());
        assert!(c.is_consistent());
    }
}
