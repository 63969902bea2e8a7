//! Named entity recognition for historical records.
//!
//! Provides a `NerBackend` trait for pluggable extraction backends and a
//! built-in `RegexNerBackend` tuned for wills, inventories, shipping and
//! insurance ledgers of the slavery era.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single extracted entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NerEntity {
    pub text: String,
    pub entity_type: NerEntityType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NerEntityType {
    Person,
    Location,
    Vessel,
    /// Banks, insurers, trading houses.
    FinancialActor,
}

impl NerEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Location => "location",
            Self::Vessel => "vessel",
            Self::FinancialActor => "financial_actor",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NerResult {
    pub entities: Vec<NerEntity>,
    pub counts: HashMap<String, usize>,
}

impl NerResult {
    pub fn of_type(&self, entity_type: NerEntityType) -> impl Iterator<Item = &NerEntity> {
        self.entities
            .iter()
            .filter(move |e| e.entity_type == entity_type)
    }
}

/// Trait for pluggable NER backends.
///
/// The built-in `RegexNerBackend` uses pattern matching. A tokenizer-based
/// collaborator can implement this trait and be handed to the extractor.
pub trait NerBackend: Send + Sync {
    /// Human-readable backend identifier (e.g. "regex").
    fn backend_id(&self) -> &str;

    fn extract(&self, text: &str) -> NerResult;
}

/// Regex-based NER backend.
pub struct RegexNerBackend;

impl RegexNerBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RegexNerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NerBackend for RegexNerBackend {
    fn backend_id(&self) -> &str {
        "regex"
    }

    fn extract(&self, text: &str) -> NerResult {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        extract_persons(text, &mut entities, &mut seen);
        extract_vessels(text, &mut entities, &mut seen);
        extract_financial_actors(text, &mut entities, &mut seen);
        extract_locations(text, &mut entities, &mut seen);

        let mut counts = HashMap::new();
        for entity in &entities {
            *counts
                .entry(entity.entity_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        NerResult { entities, counts }
    }
}

static TITLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:Colonel|Col\.|Captain|Capt\.|Major|General|Gen\.|Judge|Reverend|Rev\.|Doctor|Dr\.|Mr\.|Mrs\.|Widow|Squire)\s+)([A-Z][a-z]+(?:\s+[A-Z]\.?)?(?:\s+[A-Z][a-z]+)?)",
    )
    .expect("title pattern should compile")
});

static CAPITALIZED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]{2,}(?:\s+[A-Z]\.?\s+|\s+)[A-Z][a-z]{2,})\b")
        .expect("capitalized name pattern should compile")
});

static VESSEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:ship|brig|schooner|sloop|snow|bark|barque|vessel)\s+(?:the\s+)?([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("vessel pattern should compile")
});

static FINANCIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][a-z]+\s+)*(?:Bank|Insurance Company|Assurance Company|Trust Company)(?:\s+of\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)?|[A-Z][a-z]+(?:,?\s+[A-Z][a-z]+)*\s+(?:&|and)\s+Co\.)",
    )
    .expect("financial actor pattern should compile")
});

static COUNTY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+(?:County|Parish)|(?:County|Parish)\s+of\s+[A-Z][a-z]+)\b")
        .expect("county pattern should compile")
});

static SLAVE_STATES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Alabama",
        "Arkansas",
        "Delaware",
        "Florida",
        "Georgia",
        "Kentucky",
        "Louisiana",
        "Maryland",
        "Mississippi",
        "Missouri",
        "North Carolina",
        "South Carolina",
        "Tennessee",
        "Texas",
        "Virginia",
        "District of Columbia",
    ]
    .into_iter()
    .collect()
});

// Capitalized pairs that are not people.
static NAME_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "United States",
        "North Carolina",
        "South Carolina",
        "West Virginia",
        "District Columbia",
        "Last Will",
        "Personal Estate",
        "Orphans Court",
        "County Court",
        "Slave Schedule",
        "Free Inhabitants",
    ]
    .into_iter()
    .collect()
});

fn push(
    entities: &mut Vec<NerEntity>,
    seen: &mut HashSet<String>,
    text: &str,
    entity_type: NerEntityType,
) {
    let key = format!("{}:{}", entity_type.as_str(), text);
    if seen.insert(key) {
        entities.push(NerEntity {
            text: text.to_string(),
            entity_type,
        });
    }
}

fn extract_persons(text: &str, entities: &mut Vec<NerEntity>, seen: &mut HashSet<String>) {
    for cap in TITLE_PATTERN.captures_iter(text) {
        if let Some(m) = cap.get(0) {
            let name = m.as_str().trim();
            if name.split_whitespace().count() >= 2 {
                push(entities, seen, name, NerEntityType::Person);
            }
        }
    }

    for cap in CAPITALIZED_NAME.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            let name = m.as_str().trim();
            let already_titled = entities.iter().any(|e| e.text.ends_with(name));
            if is_plausible_name(name) && !is_stopword_name(name) && !already_titled {
                push(entities, seen, name, NerEntityType::Person);
            }
        }
    }
}

fn extract_vessels(text: &str, entities: &mut Vec<NerEntity>, seen: &mut HashSet<String>) {
    for cap in VESSEL_PATTERN.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            push(entities, seen, m.as_str().trim(), NerEntityType::Vessel);
        }
    }
}

fn extract_financial_actors(text: &str, entities: &mut Vec<NerEntity>, seen: &mut HashSet<String>) {
    for cap in FINANCIAL_PATTERN.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            push(entities, seen, m.as_str().trim(), NerEntityType::FinancialActor);
        }
    }
}

fn extract_locations(text: &str, entities: &mut Vec<NerEntity>, seen: &mut HashSet<String>) {
    for cap in COUNTY_PATTERN.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            push(entities, seen, m.as_str().trim(), NerEntityType::Location);
        }
    }
    let mut states: Vec<&&str> = SLAVE_STATES.iter().collect();
    states.sort();
    for state in states {
        let pattern = format!(r"\b{}\b", regex::escape(state));
        if let Ok(re) = Regex::new(&pattern) {
            if re.is_match(text) {
                push(entities, seen, state, NerEntityType::Location);
            }
        }
    }
}

fn is_plausible_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.len() < 2 || parts.len() > 4 {
        return false;
    }
    parts.iter().all(|p| {
        let first = p.chars().next().unwrap_or('a');
        first.is_uppercase() && p.len() >= 2
    })
}

fn is_stopword_name(name: &str) -> bool {
    NAME_STOPWORDS.contains(name)
        || name
            .split_whitespace()
            .any(|w| matches!(w, "County" | "Parish" | "Court" | "Bank" | "Company"))
}
