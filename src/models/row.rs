//! Rows: the common output of the table parser and the narrative extractor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionType {
    Table,
    FixedWidth,
    Narrative,
    NarrativeSupplement,
    TableCount,
    Placeholder,
}

impl ExtractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::FixedWidth => "fixed-width",
            Self::Narrative => "narrative",
            Self::NarrativeSupplement => "narrative-supplement",
            Self::TableCount => "table-count",
            Self::Placeholder => "placeholder",
        }
    }

    /// Method string recorded on emitted entity records.
    pub fn extraction_method(&self) -> &'static str {
        match self {
            Self::Table | Self::TableCount => "table_parser",
            Self::FixedWidth => "fixed_width_parser",
            Self::Narrative | Self::NarrativeSupplement => "narrative_extractor",
            Self::Placeholder => "placeholder",
        }
    }

    pub fn is_narrative(&self) -> bool {
        matches!(self, Self::Narrative | Self::NarrativeSupplement)
    }
}

/// One header/value pair. Order follows the declared columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub header: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Index of the originating line in the page's line list.
    pub row_index: usize,
    pub columns: Vec<Cell>,
    pub confidence: f64,
    pub raw_text: String,
    pub extraction_type: ExtractionType,
}

impl Row {
    pub fn new(
        row_index: usize,
        columns: Vec<Cell>,
        raw_text: impl Into<String>,
        extraction_type: ExtractionType,
    ) -> Self {
        let mut row = Self {
            row_index,
            columns,
            confidence: 0.0,
            raw_text: raw_text.into(),
            extraction_type,
        };
        row.confidence = row.fill_ratio();
        row
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.header.eq_ignore_ascii_case(header))
            .map(|c| c.value.as_str())
    }

    /// Number of non-empty cells.
    pub fn filled_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| !c.value.trim().is_empty())
            .count()
    }

    /// Fraction of cells with a value.
    pub fn fill_ratio(&self) -> f64 {
        if self.columns.is_empty() {
            return 0.0;
        }
        self.filled_count() as f64 / self.columns.len() as f64
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Mean row confidence, 0 for no rows.
pub fn mean_confidence(rows: &[Row]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|r| r.confidence).sum::<f64>() / rows.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(h: &str, v: &str) -> Cell {
        Cell {
            header: h.to_string(),
            value: v.to_string(),
        }
    }

    #[test]
    fn test_confidence_is_fill_ratio() {
        let row = Row::new(
            0,
            vec![cell("Name", "Clara"), cell("Sex", ""), cell("Age", "2")],
            "Clara  2",
            ExtractionType::Table,
        );
        assert_eq!(row.filled_count(), 2);
        assert!((row.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(row.get("name"), Some("Clara"));
    }

    #[test]
    fn test_with_confidence_clamps() {
        let row = Row::new(0, vec![], "", ExtractionType::Narrative).with_confidence(1.7);
        assert_eq!(row.confidence, 1.0);
    }

    #[test]
    fn test_method_strings() {
        assert_eq!(ExtractionType::FixedWidth.extraction_method(), "fixed_width_parser");
        assert_eq!(
            ExtractionType::NarrativeSupplement.extraction_method(),
            "narrative_extractor"
        );
        assert_eq!(mean_confidence(&[]), 0.0);
    }
}
