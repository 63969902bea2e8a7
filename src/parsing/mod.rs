//! Structure detection and table parsing.

mod detector;
mod ditto;
mod noise;
mod table;
mod typed;

use std::collections::BTreeMap;

pub use detector::{fixed_width_boundaries, Detection, StructureDetector};
pub use ditto::CarryForward;
pub use noise::{is_header_line, is_noise_line};
pub use table::{slice_fixed, TableParser};
pub use typed::{extract_typed, guess_data_type};

use crate::models::{ColumnDefinition, Row};

/// A line of OCR text with its position in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub index: usize,
    pub text: String,
}

impl SourceLine {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Noise,
    Header,
    /// Dropped; the class names what was wrong with the line.
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub rows: Vec<Row>,
    pub skipped: Vec<SkippedLine>,
    /// Columns the rows were keyed by (declared or inferred).
    pub columns: Vec<ColumnDefinition>,
}

impl ParseOutput {
    fn skip(&mut self, line: &SourceLine, reason: SkipReason) {
        self.skipped.push(SkippedLine {
            index: line.index,
            reason,
        });
    }

    /// Indices of lines skipped as headers.
    pub fn header_indices(&self) -> Vec<usize> {
        self.skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Header)
            .map(|s| s.index)
            .collect()
    }

    /// Malformed line classes with their counts, sorted by class.
    pub fn malformed_classes(&self) -> Vec<(&'static str, usize)> {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for s in &self.skipped {
            if let SkipReason::Malformed(class) = s.reason {
                *counts.entry(class).or_default() += 1;
            }
        }
        counts.into_iter().collect()
    }
}
