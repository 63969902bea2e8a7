//! Choosing between table rows and narrative rows for a page.

use crate::models::{mean_confidence, ExtractionType, Row};
use crate::narrative::NarrativeResult;

/// Table rows must beat this mean confidence to be accepted outright.
pub const ACCEPT_MEAN_CONFIDENCE: f64 = 0.5;
/// Share of rows that must be well filled for the table to be accepted.
pub const WELL_FILLED_SHARE: f64 = 0.3;
/// A row with at least this many non-empty cells is well filled.
pub const WELL_FILLED_CELLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationChoice {
    /// Table rows only.
    Table,
    /// Narrative rows only; the parser produced nothing.
    Narrative,
    /// Narrative rows first, well-filled table rows as supplement.
    NarrativeOverTable,
    /// Table rows first, narrative rows as supplement.
    TableWithNarrative,
}

impl ArbitrationChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Narrative => "narrative",
            Self::NarrativeOverTable => "narrative-over-table",
            Self::TableWithNarrative => "table-with-narrative",
        }
    }

    /// Whether narrative rows lead the page.
    pub fn narrative_leads(&self) -> bool {
        matches!(self, Self::Narrative | Self::NarrativeOverTable)
    }
}

#[derive(Debug, Clone)]
pub struct Arbitration {
    pub choice: ArbitrationChoice,
    /// Surviving table rows.
    pub table_rows: Vec<Row>,
    /// Surviving narrative rows, tagged narrative or narrative-supplement.
    pub narrative_rows: Vec<Row>,
    pub table_confidence: f64,
    pub narrative_confidence: f64,
}

impl Arbitration {
    /// Final row list in page order of preference.
    pub fn rows(&self) -> Vec<Row> {
        let (first, second) = if self.choice.narrative_leads() {
            (&self.narrative_rows, &self.table_rows)
        } else {
            (&self.table_rows, &self.narrative_rows)
        };
        first.iter().chain(second.iter()).cloned().collect()
    }
}

fn well_filled(row: &Row) -> bool {
    row.filled_count() >= WELL_FILLED_CELLS
}

/// Mean confidence above 0.5 and at least 30% of rows well filled.
pub fn table_accepted(rows: &[Row]) -> bool {
    if rows.is_empty() {
        return false;
    }
    let filled = rows.iter().filter(|r| well_filled(r)).count() as f64;
    mean_confidence(rows) > ACCEPT_MEAN_CONFIDENCE && filled / rows.len() as f64 >= WELL_FILLED_SHARE
}

/// Decide which rows a page keeps. `narrative` is `None` when the extractor
/// did not run.
pub fn arbitrate(table: Vec<Row>, narrative: Option<&NarrativeResult>) -> Arbitration {
    let table_confidence = mean_confidence(&table);
    let narrative_confidence = narrative.map(|n| n.confidence).unwrap_or(0.0);
    let outcome = |choice: ArbitrationChoice, table_rows: Vec<Row>, narrative_rows: Vec<Row>| Arbitration {
        choice,
        table_rows,
        narrative_rows,
        table_confidence,
        narrative_confidence,
    };

    let Some(narrative) = narrative else {
        return outcome(ArbitrationChoice::Table, table, Vec::new());
    };
    if table_accepted(&table) {
        return outcome(ArbitrationChoice::Table, table, Vec::new());
    }

    let narrative_rows = narrative.to_rows();
    if table.is_empty() {
        return outcome(ArbitrationChoice::Narrative, Vec::new(), narrative_rows);
    }

    if narrative_confidence > table_confidence {
        let kept = table.into_iter().filter(well_filled).collect();
        outcome(ArbitrationChoice::NarrativeOverTable, kept, narrative_rows)
    } else {
        let supplement = narrative_rows
            .into_iter()
            .map(|mut r| {
                r.extraction_type = ExtractionType::NarrativeSupplement;
                r
            })
            .collect();
        outcome(ArbitrationChoice::TableWithNarrative, table, supplement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, PersonType};
    use crate::narrative::NarrativePerson;

    fn row(index: usize, filled: usize, confidence: f64) -> Row {
        let cells = (0..5)
            .map(|i| Cell {
                header: format!("c{}", i),
                value: if i < filled { "x".to_string() } else { String::new() },
            })
            .collect();
        Row::new(index, cells, format!("line {}", index), ExtractionType::Table)
            .with_confidence(confidence)
    }

    fn narrative(confidence: f64) -> NarrativeResult {
        NarrativeResult {
            enslaved: vec![
                NarrativePerson::new("Robin", PersonType::Enslaved, 0.7, "freed Robin"),
                NarrativePerson::new("Nanny", PersonType::Enslaved, 0.7, "and Nanny"),
            ],
            slaveholders: vec![NarrativePerson::new(
                "Richard Marsham",
                PersonType::Slaveholder,
                0.8,
                "Richard Marsham owned 36 slaves",
            )],
            confidence,
            ..NarrativeResult::default()
        }
    }

    #[test]
    fn test_accepts_confident_filled_table() {
        let rows: Vec<Row> = (0..10).map(|i| row(i, if i < 3 { 4 } else { 2 }, 0.6)).collect();
        assert!(table_accepted(&rows));
        let a = arbitrate(rows, Some(&narrative(0.9)));
        assert_eq!(a.choice, ArbitrationChoice::Table);
        assert_eq!(a.rows().len(), 10);
    }

    #[test]
    fn test_sparse_table_is_not_accepted() {
        let rows: Vec<Row> = (0..10).map(|i| row(i, if i < 2 { 4 } else { 1 }, 0.9)).collect();
        assert!(!table_accepted(&rows));
        assert!(!table_accepted(&[]));
    }

    #[test]
    fn test_narrative_wins_and_keeps_filled_table_rows() {
        // 20 rows at 0.4, five of them with three filled cells
        let rows: Vec<Row> = (0..20).map(|i| row(i, if i % 4 == 0 { 3 } else { 1 }, 0.4)).collect();
        let a = arbitrate(rows, Some(&narrative(0.7)));
        assert_eq!(a.choice, ArbitrationChoice::NarrativeOverTable);
        assert_eq!(a.table_rows.len(), 5);
        assert!(a.table_rows.iter().all(|r| r.filled_count() >= 3));

        let all = a.rows();
        assert_eq!(all.len(), 3 + 5);
        assert_eq!(all[0].extraction_type, ExtractionType::Narrative);
        assert_eq!(all[7].extraction_type, ExtractionType::Table);
    }

    #[test]
    fn test_weak_narrative_becomes_supplement() {
        let rows: Vec<Row> = (0..4).map(|i| row(i, 1, 0.45)).collect();
        let a = arbitrate(rows, Some(&narrative(0.3)));
        assert_eq!(a.choice, ArbitrationChoice::TableWithNarrative);
        let all = a.rows();
        assert_eq!(all.len(), 4 + 3);
        assert_eq!(all[0].extraction_type, ExtractionType::Table);
        assert!(all[4..]
            .iter()
            .all(|r| r.extraction_type == ExtractionType::NarrativeSupplement));
    }

    #[test]
    fn test_no_table_rows_means_narrative_only() {
        let a = arbitrate(Vec::new(), Some(&narrative(0.8)));
        assert_eq!(a.choice, ArbitrationChoice::Narrative);
        assert_eq!(a.rows().len(), 3);
    }

    #[test]
    fn test_without_narrative_table_stands() {
        let rows = vec![row(0, 1, 0.2)];
        let a = arbitrate(rows, None);
        assert_eq!(a.choice, ArbitrationChoice::Table);
        assert_eq!(a.narrative_confidence, 0.0);
    }
}
