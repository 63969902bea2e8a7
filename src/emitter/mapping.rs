//! Mapping rows to entity records.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ColumnDefinition, DataType, EntityRecord, PersonType, Row};
use crate::narrative::{
    CONTEXT_COLUMN, LOCATIONS_COLUMN, LOCATION_SEPARATOR, NAME_COLUMN, OWNER_COLUMN, ROLE_COLUMN,
};
use crate::rules::CompiledRules;

static LEGIT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z]{2,}(\s+[A-Z][a-z]{2,}){0,2}$").expect("name regex should compile")
});

static GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}|\t|\|").expect("gap regex should compile"));

pub const PLACEHOLDER_CONFIDENCE: f64 = 0.2;

/// Extraction method of named records read straight off an ink line.
pub const LINE_TOKEN_METHOD: &str = "line_token";

/// `Unknown Enslaved Person (Vol V p.P row R)`.
pub fn placeholder_name(volume_id: &str, page: u32, ordinal: usize) -> String {
    format!(
        "Unknown Enslaved Person (Vol {} p.{} row {})",
        volume_id, page, ordinal
    )
}

/// A token names a person when it is one to three capitalized words of three
/// or more letters and none of them is a column header word.
pub fn is_legit_name(token: &str, rules: &CompiledRules) -> bool {
    let token = token.trim();
    LEGIT_NAME.is_match(token) && !token.split_whitespace().any(|w| rules.is_header_token(w))
}

fn data_type_of(header: &str, columns: &[ColumnDefinition]) -> DataType {
    columns
        .iter()
        .find(|c| c.header().eq_ignore_ascii_case(header))
        .map(|c| c.data_type)
        .unwrap_or(DataType::Unknown)
}

fn is_narrative_row(row: &Row) -> bool {
    row.extraction_type.is_narrative()
}

/// Tentative name for a unit: the Name cell of narrative rows, the
/// enslaved-name column (else first name column, else first cell) of table
/// rows, and the leading segment of a line no parser understood.
pub fn name_token(row: Option<&Row>, columns: &[ColumnDefinition], raw_line: &str) -> String {
    let Some(row) = row else {
        return GAP
            .split(raw_line.trim())
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
    };

    if is_narrative_row(row) {
        return row.get(NAME_COLUMN).unwrap_or_default().trim().to_string();
    }

    let by_type = |wanted: fn(&DataType) -> bool| {
        row.columns
            .iter()
            .find(|c| wanted(&data_type_of(&c.header, columns)))
            .map(|c| c.value.trim().to_string())
    };
    by_type(|t| *t == DataType::EnslavedName)
        .or_else(|| by_type(|t| t.is_name() && *t != DataType::OwnerName))
        .or_else(|| row.columns.first().map(|c| c.value.trim().to_string()))
        .unwrap_or_default()
}

/// Owner named on the row itself: the owner-name column of a table row or
/// the Owner cell of a narrative row.
pub fn row_owner(row: &Row, columns: &[ColumnDefinition]) -> Option<String> {
    let value = if is_narrative_row(row) {
        row.get(OWNER_COLUMN).map(|v| v.to_string())
    } else {
        row.columns
            .iter()
            .find(|c| data_type_of(&c.header, columns) == DataType::OwnerName)
            .map(|c| c.value.clone())
    };
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Role carried by a narrative row.
pub fn narrative_role(row: &Row) -> Option<PersonType> {
    row.get(ROLE_COLUMN).and_then(PersonType::from_str)
}

/// Entity for a named table row. Typed columns fill the optional fields and
/// everything else lands in the context text.
pub fn table_entity(
    row: &Row,
    columns: &[ColumnDefinition],
    name: &str,
    source_url: &str,
) -> EntityRecord {
    let mut entity = EntityRecord::new(
        name,
        PersonType::Enslaved,
        source_url,
        row.extraction_type.extraction_method(),
    )
    .with_confidence(row.confidence);

    let mut context = Vec::new();
    for cell in &row.columns {
        let value = cell.value.trim();
        if value.is_empty() || value == name {
            continue;
        }
        match data_type_of(&cell.header, columns) {
            DataType::Gender => entity.gender = Some(normalize_gender(value)),
            DataType::Age => entity.age = Some(value.to_string()),
            DataType::Location => entity.locations.push(value.to_string()),
            DataType::OwnerName => {}
            _ => context.push(format!("{}: {}", cell.header, value)),
        }
    }
    entity.context_text = if context.is_empty() {
        row.raw_text.clone()
    } else {
        context.join("; ")
    };
    entity
}

/// Entity for a line no parser understood but whose leading segment reads
/// as a name. Confidence is the page's OCR confidence.
pub fn line_entity(name: &str, raw_line: &str, source_url: &str, confidence: f64) -> EntityRecord {
    EntityRecord::new(name, PersonType::Enslaved, source_url, LINE_TOKEN_METHOD)
        .with_confidence(confidence)
        .with_context(raw_line.trim())
}

/// Entity for a narrative row, typed by its Role cell.
pub fn narrative_entity(row: &Row, source_url: &str) -> EntityRecord {
    let name = row.get(NAME_COLUMN).unwrap_or_default();
    let role = narrative_role(row).unwrap_or(PersonType::Other);
    let mut entity = EntityRecord::new(
        name,
        role,
        source_url,
        row.extraction_type.extraction_method(),
    )
    .with_confidence(row.confidence)
    .with_context(row.get(CONTEXT_COLUMN).unwrap_or_default());
    entity.locations = row
        .get(LOCATIONS_COLUMN)
        .unwrap_or_default()
        .split(LOCATION_SEPARATOR)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    entity
}

/// Slaveholder entities named in owner-name columns.
pub fn owner_entities(
    rows: &[Row],
    columns: &[ColumnDefinition],
    source_url: &str,
    rules: &CompiledRules,
) -> Vec<EntityRecord> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for row in rows.iter().filter(|r| !is_narrative_row(r)) {
        let Some(owner) = row_owner(row, columns) else {
            continue;
        };
        if !is_legit_name(&owner, rules) || seen.iter().any(|s| s.eq_ignore_ascii_case(&owner)) {
            continue;
        }
        seen.push(owner.clone());
        out.push(
            EntityRecord::new(
                owner.as_str(),
                PersonType::Slaveholder,
                source_url,
                row.extraction_type.extraction_method(),
            )
            .with_confidence(row.confidence)
            .with_context(row.raw_text.clone()),
        );
    }
    out
}

fn normalize_gender(value: &str) -> String {
    match value.to_lowercase().as_str() {
        "m" | "male" | "man" | "boy" => "male".to_string(),
        "f" | "female" | "woman" | "girl" => "female".to_string(),
        other => other.to_string(),
    }
}
