//! Ditto-mark and blank-cell carry-forward.
//!
//! Hand-copied ledgers repeat a value with `"` or `do` instead of writing it
//! out again. The state is the last row that had at least one real value.

use crate::rules::CompiledRules;

#[derive(Debug, Default)]
pub struct CarryForward {
    prev_row: Option<Vec<String>>,
}

impl CarryForward {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve ditto and blank cells against the previous filled row.
    ///
    /// The carry state advances only when the row has a non-ditto,
    /// non-blank cell.
    pub fn resolve(&mut self, cells: Vec<String>, rules: &CompiledRules) -> Vec<String> {
        let has_real_value = cells
            .iter()
            .any(|c| !c.trim().is_empty() && !rules.is_ditto(c));

        let resolved: Vec<String> = cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                if cell.trim().is_empty() || rules.is_ditto(&cell) {
                    self.prev_row
                        .as_ref()
                        .and_then(|prev| prev.get(i))
                        .cloned()
                        .unwrap_or_default()
                } else {
                    cell.trim().to_string()
                }
            })
            .collect();

        if has_real_value {
            self.prev_row = Some(resolved.clone());
        }
        resolved
    }
}
