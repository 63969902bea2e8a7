//! Table parser: turns ink lines into rows keyed by column headers.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::ditto::CarryForward;
use super::noise::{is_header_line, is_noise_line};
use super::typed::{extract_typed, guess_data_type};
use super::{ParseOutput, SkipReason, SourceLine};
use crate::models::{
    Cell, ColumnDefinition, DataType, DetectedStructure, ExtractionType, Row, StructureKind,
};
use crate::rules::CompiledRules;

static GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("gap regex should compile"));

/// Lines inspected when sizing undeclared columns.
const SIZING_SAMPLE: usize = 20;

pub struct TableParser {
    rules: Arc<CompiledRules>,
}

impl TableParser {
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        Self { rules }
    }

    /// Parse lines into rows. Declared columns drive the row keys; without
    /// them headers are inferred from the first header-like line.
    pub fn parse(
        &self,
        lines: &[SourceLine],
        declared: &[ColumnDefinition],
        structure: &DetectedStructure,
    ) -> ParseOutput {
        let mut output = ParseOutput::default();

        let (columns, inferred_header) = self.resolve_columns(lines, declared, structure);
        let headers: Vec<String> = columns.iter().map(|c| c.header()).collect();
        let extraction_type = match structure.kind {
            StructureKind::FixedWidth => ExtractionType::FixedWidth,
            _ => ExtractionType::Table,
        };

        let mut carry = CarryForward::new();
        for line in lines {
            if Some(line.index) == inferred_header {
                output.skip(line, SkipReason::Header);
                continue;
            }
            if is_noise_line(&line.text, &self.rules) {
                output.skip(line, SkipReason::Noise);
                continue;
            }
            if is_header_line(&line.text, &headers) {
                output.skip(line, SkipReason::Header);
                continue;
            }

            let cells = match self.split_line(&line.text, &columns, structure) {
                Ok(cells) => cells,
                Err(class) => {
                    output.skip(line, SkipReason::Malformed(class));
                    continue;
                }
            };

            let values = carry.resolve(cells, &self.rules);
            let row_cells = headers
                .iter()
                .zip(values)
                .map(|(header, value)| Cell {
                    header: header.clone(),
                    value,
                })
                .collect();
            output
                .rows
                .push(Row::new(line.index, row_cells, line.text.trim(), extraction_type));
        }

        debug!(
            "Parsed {} rows ({} skipped) as {}",
            output.rows.len(),
            output.skipped.len(),
            structure.kind.as_str()
        );
        output.columns = columns;
        output
    }

    /// Split one line into exactly `columns.len()` cells.
    fn split_line(
        &self,
        line: &str,
        columns: &[ColumnDefinition],
        structure: &DetectedStructure,
    ) -> Result<Vec<String>, &'static str> {
        let width = columns.len();
        let tokens = match structure.kind {
            StructureKind::TabDelimited => {
                if width > 1 && !line.contains('\t') {
                    return Err("missing-tab");
                }
                line.trim().split('\t').map(|t| t.trim().to_string()).collect()
            }
            StructureKind::PipeDelimited => {
                if width > 1 && !line.contains('|') {
                    return Err("missing-pipe");
                }
                split_pipes(line)
            }
            StructureKind::FixedWidth => slice_fixed(line, &structure.column_positions),
            StructureKind::WhitespaceTable | StructureKind::Narrative => {
                let tokens = split_gaps(line);
                if tokens.len() >= 2 || width <= 1 {
                    tokens
                } else {
                    let typed = extract_typed(line, columns);
                    if typed.iter().all(|v| v.is_empty()) {
                        return Err("no-typed-match");
                    }
                    typed
                }
            }
        };
        Ok(fit_to_width(tokens, width))
    }

    fn resolve_columns(
        &self,
        lines: &[SourceLine],
        declared: &[ColumnDefinition],
        structure: &DetectedStructure,
    ) -> (Vec<ColumnDefinition>, Option<usize>) {
        if !declared.is_empty() {
            let mut cols = declared.to_vec();
            cols.sort_by_key(|c| c.position);
            return (cols, None);
        }

        for line in lines.iter().filter(|l| !is_noise_line(&l.text, &self.rules)) {
            if line.text.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            let mut tokens = self.header_tokens(&line.text, structure);
            if tokens.len() < 2 {
                tokens = line.text.split_whitespace().map(str::to_string).collect();
            }
            let header_like = tokens
                .iter()
                .flat_map(|t| t.split_whitespace())
                .any(|w| self.rules.is_header_token(w));
            if header_like {
                let cols = tokens
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ColumnDefinition {
                        position: i as u32 + 1,
                        header_exact: None,
                        header_guess: Some(t.clone()),
                        data_type: guess_data_type(t),
                        human_provided: false,
                    })
                    .collect();
                return (cols, Some(line.index));
            }
        }

        let width = lines
            .iter()
            .take(SIZING_SAMPLE)
            .map(|l| self.header_tokens(&l.text, structure).len())
            .max()
            .unwrap_or(1)
            .max(1);
        let cols = (1..=width)
            .map(|i| ColumnDefinition {
                position: i as u32,
                header_exact: None,
                header_guess: None,
                data_type: DataType::Unknown,
                human_provided: false,
            })
            .collect();
        (cols, None)
    }

    fn header_tokens(&self, line: &str, structure: &DetectedStructure) -> Vec<String> {
        match structure.kind {
            StructureKind::TabDelimited => line
                .trim()
                .split('\t')
                .map(|t| t.trim().to_string())
                .collect(),
            StructureKind::PipeDelimited => split_pipes(line),
            StructureKind::FixedWidth => slice_fixed(line, &structure.column_positions),
            _ => split_gaps(line),
        }
    }
}

fn split_pipes(line: &str) -> Vec<String> {
    line.split('|')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_gaps(line: &str) -> Vec<String> {
    GAP.split(line.trim())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Slice a line at character boundaries.
pub fn slice_fixed(line: &str, boundaries: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut cells = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for &b in boundaries {
        let end = b.min(chars.len());
        let from = start.min(end);
        cells.push(chars[from..end].iter().collect::<String>().trim().to_string());
        start = end;
    }
    let from = start.min(chars.len());
    cells.push(chars[from..].iter().collect::<String>().trim().to_string());
    cells
}

/// Pad with empty cells or fold overflow into the last cell.
fn fit_to_width(mut tokens: Vec<String>, width: usize) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    if tokens.len() > width {
        let overflow = tokens.split_off(width - 1);
        tokens.push(overflow.join(" "));
    }
    tokens.resize(width, String::new());
    tokens
}
