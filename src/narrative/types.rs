//! Narrative extraction results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Cell, ExtractionType, PersonType, Relationship, RelationshipKind, Row};

/// Column headers of rows produced from prose.
pub const NAME_COLUMN: &str = "Name";
pub const ROLE_COLUMN: &str = "Role";
pub const OWNER_COLUMN: &str = "Owner";
pub const CONTEXT_COLUMN: &str = "Context";
pub const LOCATIONS_COLUMN: &str = "Locations";

/// Separator for several places in one `Locations` cell.
pub const LOCATION_SEPARATOR: &str = "; ";

/// A person (or vessel, firm) found in prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePerson {
    pub name: String,
    pub role: PersonType,
    pub confidence: f64,
    /// Sentences the name was read from, in text order.
    pub contexts: Vec<String>,
    #[serde(default)]
    pub slave_count: Option<u32>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    /// Places named in the same sentences as the person.
    #[serde(default)]
    pub locations: Vec<String>,
}

impl NarrativePerson {
    pub fn new(name: impl Into<String>, role: PersonType, confidence: f64, context: &str) -> Self {
        Self {
            name: name.into(),
            role,
            confidence: confidence.clamp(0.0, 1.0),
            contexts: vec![context.to_string()],
            slave_count: None,
            age: None,
            gender: None,
            locations: Vec::new(),
        }
    }

    pub fn add_location(&mut self, place: &str) {
        if !self.locations.iter().any(|l| l.eq_ignore_ascii_case(place)) {
            self.locations.push(place.to_string());
        }
    }

    /// Fold another sighting of the same name into this one.
    pub fn merge(&mut self, other: NarrativePerson) {
        self.confidence = self.confidence.max(other.confidence);
        for ctx in other.contexts {
            if !self.contexts.contains(&ctx) {
                self.contexts.push(ctx);
            }
        }
        self.slave_count = self.slave_count.or(other.slave_count);
        self.age = self.age.take().or(other.age);
        self.gender = self.gender.take().or(other.gender);
        for place in &other.locations {
            self.add_location(place);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Manumission,
    Inheritance,
    Compensation,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Manumission => "manumission",
            Self::Inheritance => "inheritance",
            Self::Compensation => "compensation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(Self::Sale),
            "manumission" => Some(Self::Manumission),
            "inheritance" => Some(Self::Inheritance),
            "compensation" => Some(Self::Compensation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Full,
    MonthYear,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateMention {
    pub text: String,
    pub year: u16,
    pub precision: DatePrecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Pounds,
    Dollars,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyAmount {
    pub text: String,
    pub value: f64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    /// Keyword that identified the transaction.
    pub keyword: String,
    /// Up to 200 characters around the keyword.
    pub window: String,
    pub dates: Vec<DateMention>,
    pub amounts: Vec<MoneyAmount>,
}

/// One occurrence of a caller-supplied name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMention {
    pub name: String,
    pub window: String,
    pub slaveholder_hits: usize,
    pub enslaved_hits: usize,
    /// `None` when the indicator counts tie.
    pub role: Option<PersonType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeStatistics {
    pub total_sentences: usize,
    pub relevant_sentences: usize,
    pub category_hits: BTreeMap<String, usize>,
    pub slave_count_total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeResult {
    pub slaveholders: Vec<NarrativePerson>,
    pub enslaved: Vec<NarrativePerson>,
    /// Vessels and financial actors.
    pub other_entities: Vec<NarrativePerson>,
    pub transactions: Vec<Transaction>,
    pub dates: Vec<DateMention>,
    pub relationships: Vec<Relationship>,
    pub target_mentions: Vec<TargetMention>,
    pub statistics: NarrativeStatistics,
    pub confidence: f64,
}

impl NarrativeResult {
    pub fn is_empty(&self) -> bool {
        self.slaveholders.is_empty() && self.enslaved.is_empty() && self.other_entities.is_empty()
    }

    /// First slaveholder linked to `enslaved` by an ownership relationship.
    pub fn owner_of(&self, enslaved: &str) -> Option<&str> {
        self.relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::Ownership && r.object.eq_ignore_ascii_case(enslaved))
            .map(|r| r.subject.as_str())
    }

    /// Flatten into rows for arbitration and emission.
    ///
    /// Enslaved persons come first so their row ordinals are stable across
    /// reruns; slaveholders and other entities follow.
    pub fn to_rows(&self) -> Vec<Row> {
        let people = self
            .enslaved
            .iter()
            .chain(self.slaveholders.iter())
            .chain(self.other_entities.iter());

        people
            .enumerate()
            .map(|(i, person)| {
                let owner = match person.role {
                    PersonType::Enslaved => self.owner_of(&person.name).unwrap_or_default(),
                    _ => "",
                };
                let context = person.contexts.first().cloned().unwrap_or_default();
                let columns = vec![
                    Cell {
                        header: NAME_COLUMN.to_string(),
                        value: person.name.clone(),
                    },
                    Cell {
                        header: ROLE_COLUMN.to_string(),
                        value: person.role.as_str().to_string(),
                    },
                    Cell {
                        header: OWNER_COLUMN.to_string(),
                        value: owner.to_string(),
                    },
                    Cell {
                        header: CONTEXT_COLUMN.to_string(),
                        value: context.clone(),
                    },
                    Cell {
                        header: LOCATIONS_COLUMN.to_string(),
                        value: person.locations.join(LOCATION_SEPARATOR),
                    },
                ];
                Row::new(
                    i,
                    columns,
                    format!("{} | {}", person.name, context),
                    ExtractionType::Narrative,
                )
                .with_confidence(person.confidence)
            })
            .collect()
    }
}
