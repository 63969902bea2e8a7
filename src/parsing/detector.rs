//! Structure detection over OCR text.
//!
//! Rules are applied in a fixed order and the first match wins, so the
//! same text always yields the same structure.

use std::sync::Arc;

use tracing::debug;

use super::noise::{is_header_line, is_noise_line};
use super::SourceLine;
use crate::models::{ColumnDefinition, DetectedStructure, Layout, StructureKind};
use crate::rules::CompiledRules;

/// Lines sampled for detection.
const SAMPLE_SIZE: usize = 20;
/// Share of sampled lines that must contain a delimiter.
const DELIMITER_SHARE: f64 = 0.5;
/// Share of sampled lines that must end a token at a position.
const BOUNDARY_SHARE: f64 = 0.4;
/// Boundaries closer than this are merged.
const BOUNDARY_MERGE_DISTANCE: usize = 3;
/// Prose: sampled lines with a run of 2+ spaces must stay under this share.
const PROSE_GAP_SHARE: f64 = 0.2;
const PROSE_MIN_WORDS: f64 = 6.0;

/// Detector output: the structure and the ink-bearing lines it was read from.
#[derive(Debug, Clone)]
pub struct Detection {
    pub structure: DetectedStructure,
    /// Non-noise lines, minus lines matching the declared headers.
    pub lines: Vec<SourceLine>,
}

pub struct StructureDetector {
    rules: Arc<CompiledRules>,
}

impl StructureDetector {
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        Self { rules }
    }

    /// Split text into the ink-bearing lines the parsers and emitter work on.
    pub fn ink_lines(&self, text: &str, columns: &[ColumnDefinition]) -> Vec<SourceLine> {
        let headers: Vec<String> = columns.iter().map(|c| c.header()).collect();
        text.lines()
            .enumerate()
            .filter(|(_, line)| !is_noise_line(line, &self.rules))
            .filter(|(_, line)| !is_header_line(line, &headers))
            .map(|(index, line)| SourceLine::new(index, line.trim_end()))
            .collect()
    }

    pub fn detect(&self, text: &str, columns: &[ColumnDefinition], layout: Layout) -> Detection {
        let lines = self.ink_lines(text, columns);
        let structure = self.classify(&lines, columns.len(), layout);
        debug!(
            "Detected {} (confidence {:.2}) over {} lines",
            structure.kind.as_str(),
            structure.confidence,
            lines.len()
        );
        Detection { structure, lines }
    }

    fn classify(&self, lines: &[SourceLine], declared: usize, layout: Layout) -> DetectedStructure {
        if layout == Layout::Prose {
            return DetectedStructure::new(StructureKind::Narrative, 0.8);
        }

        let sample: Vec<&str> = lines
            .iter()
            .take(SAMPLE_SIZE)
            .map(|l| l.text.as_str())
            .collect();
        if sample.is_empty() {
            return DetectedStructure::new(StructureKind::WhitespaceTable, 0.5);
        }
        let n = sample.len() as f64;

        let tabs = sample.iter().filter(|l| l.contains('\t')).count() as f64;
        if tabs / n >= DELIMITER_SHARE {
            let mut s = DetectedStructure::new(StructureKind::TabDelimited, 0.9);
            s.delimiter = Some('\t');
            return s;
        }

        let pipes = sample.iter().filter(|l| l.contains('|')).count() as f64;
        if pipes / n >= DELIMITER_SHARE {
            let mut s = DetectedStructure::new(StructureKind::PipeDelimited, 0.9);
            s.delimiter = Some('|');
            return s;
        }

        if declared == 0 && layout != Layout::Table && looks_like_prose(&sample) {
            return DetectedStructure::new(StructureKind::Narrative, 0.6);
        }

        let boundaries = fixed_width_boundaries(&sample);
        let required = declared.saturating_sub(1).max(1);
        if boundaries.len() >= required {
            let mut s = DetectedStructure::new(StructureKind::FixedWidth, 0.7);
            s.column_positions = boundaries;
            return s;
        }

        DetectedStructure::new(StructureKind::WhitespaceTable, 0.5)
    }
}

/// Positions where at least 40% of lines end a token, merged within 3 characters.
pub fn fixed_width_boundaries(sample: &[&str]) -> Vec<usize> {
    let mut counts: Vec<usize> = Vec::new();
    for line in sample {
        let chars: Vec<char> = line.chars().collect();
        for i in 1..chars.len() {
            if chars[i] == ' ' && chars[i - 1] != ' ' {
                if counts.len() <= i {
                    counts.resize(i + 1, 0);
                }
                counts[i] += 1;
            }
        }
    }

    let threshold = sample.len() as f64 * BOUNDARY_SHARE;
    let mut boundaries: Vec<usize> = Vec::new();
    for (pos, &count) in counts.iter().enumerate() {
        if count == 0 || (count as f64) < threshold {
            continue;
        }
        match boundaries.last() {
            Some(&last) if pos - last <= BOUNDARY_MERGE_DISTANCE => {}
            _ => boundaries.push(pos),
        }
    }
    boundaries
}

fn looks_like_prose(sample: &[&str]) -> bool {
    let n = sample.len() as f64;
    let gapped = sample.iter().filter(|l| l.trim().contains("  ")).count() as f64;
    let words: usize = sample.iter().map(|l| l.split_whitespace().count()).sum();
    gapped / n < PROSE_GAP_SHARE && words as f64 / n >= PROSE_MIN_WORDS
}
