//! Type-directed cell extraction for lines separated by single spaces.
//!
//! Each declared column peels a prefix off the remaining text using a
//! pattern tied to its data type.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ColumnDefinition, DataType};

const MONTH: &str = r"(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sept?(?:ember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?";

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:\d{{1,2}}[/-]\d{{1,2}}[/-]\d{{2,4}}|{m}\s+\d{{1,2}},?\s+\d{{4}}|{m}\s+\d{{4}}|\d{{4}})\b",
        m = MONTH
    ))
    .expect("date regex should compile")
});

static AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?:\s*(?:-|to)\s*\d{1,3})?(?:\s*(?:years|yrs|mos|months)\.?)?\.?")
        .expect("age regex should compile")
});

static GENDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:female|male|woman|man|boy|girl|f|m)\b").expect("gender regex should compile")
});

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z]+(?:\s+(?:Jr\.|Sr\.|[A-Z][a-z]+))*(?:,?\s+(?:IV|V|I{1,3})\b)?")
        .expect("name regex should compile")
});

static COMPENSATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\$\s?\d[\d,]*(?:\.\d+)?|\d[\d,]*(?:\.\d+)?\s+(?i:dollars|cents)|\d[\d,]*(?:\.\d+)?)")
        .expect("compensation regex should compile")
});

/// Tokens a column without a typed pattern may take.
const DEFAULT_TOKEN_LIMIT: usize = 6;

fn pattern_for(data_type: DataType) -> Option<&'static Regex> {
    match data_type {
        DataType::Date => Some(&DATE),
        DataType::Age => Some(&AGE),
        DataType::Gender => Some(&GENDER),
        DataType::OwnerName | DataType::EnslavedName | DataType::Witness => Some(&NAME),
        DataType::Compensation => Some(&COMPENSATION),
        _ => None,
    }
}

/// Split `line` into one value per column by peeling typed prefixes.
pub fn extract_typed(line: &str, columns: &[ColumnDefinition]) -> Vec<String> {
    let mut rest = line.trim();
    let mut values = Vec::with_capacity(columns.len());

    for (i, col) in columns.iter().enumerate() {
        let is_last = i + 1 == columns.len();
        let value = match pattern_for(col.data_type) {
            Some(re) => match re.find(rest) {
                Some(m) => {
                    let v = m.as_str().trim().to_string();
                    rest = rest[m.end()..].trim_start();
                    v
                }
                None => String::new(),
            },
            None if is_last => std::mem::take(&mut rest).trim().to_string(),
            None => {
                let next = columns.get(i + 1).and_then(|c| pattern_for(c.data_type));
                let (v, remaining) = take_default(rest, next);
                rest = remaining;
                v
            }
        };
        values.push(value);
    }

    values
}

/// Take tokens until the next column's pattern matches, at most six.
fn take_default<'a>(text: &'a str, next: Option<&Regex>) -> (String, &'a str) {
    let mut taken = Vec::new();
    let mut rest = text;
    while taken.len() < DEFAULT_TOKEN_LIMIT && !rest.is_empty() {
        if !taken.is_empty() && next.is_some_and(|re| re.is_match(rest)) {
            break;
        }
        let (token, remaining) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
            None => (rest, ""),
        };
        taken.push(token);
        rest = remaining;
    }
    (taken.join(" "), rest)
}

/// Guess a column's data type from its header text.
pub fn guess_data_type(header: &str) -> DataType {
    let h = header.to_lowercase();
    if h.contains("owner") || h.contains("whom") || h.contains("petitioner") {
        DataType::OwnerName
    } else if h.contains("name") {
        DataType::EnslavedName
    } else if h.contains("sex") || h.contains("gender") {
        DataType::Gender
    } else if h.contains("age") {
        DataType::Age
    } else if h.contains("date") || h.contains("year") {
        DataType::Date
    } else if h.contains("value") || h.contains("compensation") || h.contains("price") {
        DataType::Compensation
    } else if h.contains("residence") || h.contains("county") || h.contains("place") {
        DataType::Location
    } else if h.contains("witness") {
        DataType::Witness
    } else if h.contains("remark") || h.contains("description") {
        DataType::Remarks
    } else {
        DataType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(pos: u32, header: &str, dt: DataType) -> ColumnDefinition {
        ColumnDefinition::new(pos, header, dt)
    }

    #[test]
    fn test_peels_typed_prefixes() {
        let cols = vec![
            col(1, "Name", DataType::EnslavedName),
            col(2, "Sex", DataType::Gender),
            col(3, "Age", DataType::Age),
            col(4, "Value", DataType::Compensation),
            col(5, "Remarks", DataType::Remarks),
        ];
        let values = extract_typed("Jacob Allen Jr. M 34 years $450 sound and healthy", &cols);
        assert_eq!(
            values,
            vec!["Jacob Allen Jr.", "M", "34 years", "$450", "sound and healthy"]
        );
    }

    #[test]
    fn test_missing_typed_value_leaves_cell_empty() {
        let cols = vec![
            col(1, "Name", DataType::EnslavedName),
            col(2, "Date", DataType::Date),
            col(3, "Remarks", DataType::Remarks),
        ];
        let values = extract_typed("Phillis sold to Mr. Dorsey", &cols);
        assert_eq!(values, vec!["Phillis", "", "sold to Mr. Dorsey"]);
    }

    #[test]
    fn test_dates() {
        for s in ["12/3/1851", "March 4, 1862", "Sept 1799", "1713"] {
            assert!(DATE.is_match(s), "{s}");
        }
    }

    #[test]
    fn test_default_column_stops_at_next_pattern() {
        let cols = vec![
            col(1, "Residence", DataType::Unknown),
            col(2, "Age", DataType::Age),
        ];
        let values = extract_typed("Prince George County 40", &cols);
        assert_eq!(values, vec!["Prince George County", "40"]);
    }

    #[test]
    fn test_guess_data_type() {
        assert_eq!(guess_data_type("By whom owned"), DataType::OwnerName);
        assert_eq!(guess_data_type("Name"), DataType::EnslavedName);
        assert_eq!(guess_data_type("Sex"), DataType::Gender);
        assert_eq!(guess_data_type("Particular description"), DataType::Remarks);
        assert_eq!(guess_data_type("no."), DataType::Unknown);
    }
}
