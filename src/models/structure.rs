//! Human-described content structure and the detector's view of the text.

use serde::{Deserialize, Serialize};

/// What kind of data a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    OwnerName,
    EnslavedName,
    Date,
    Age,
    Gender,
    Location,
    PhysicalCondition,
    TermOfService,
    Military,
    Compensation,
    Witness,
    Remarks,
    #[default]
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnerName => "owner-name",
            Self::EnslavedName => "enslaved-name",
            Self::Date => "date",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Location => "location",
            Self::PhysicalCondition => "physical-condition",
            Self::TermOfService => "term-of-service",
            Self::Military => "military",
            Self::Compensation => "compensation",
            Self::Witness => "witness",
            Self::Remarks => "remarks",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "owner-name" => Some(Self::OwnerName),
            "enslaved-name" => Some(Self::EnslavedName),
            "date" => Some(Self::Date),
            "age" => Some(Self::Age),
            "gender" => Some(Self::Gender),
            "location" => Some(Self::Location),
            "physical-condition" => Some(Self::PhysicalCondition),
            "term-of-service" => Some(Self::TermOfService),
            "military" => Some(Self::Military),
            "compensation" => Some(Self::Compensation),
            "witness" => Some(Self::Witness),
            "remarks" => Some(Self::Remarks),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Whether the column holds a person's name.
    pub fn is_name(&self) -> bool {
        matches!(self, Self::OwnerName | Self::EnslavedName | Self::Witness)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// 1-based position on the page.
    pub position: u32,
    /// Verbatim human reading of the header, if any.
    #[serde(default)]
    pub header_exact: Option<String>,
    #[serde(default)]
    pub header_guess: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub human_provided: bool,
}

impl ColumnDefinition {
    pub fn new(position: u32, header: impl Into<String>, data_type: DataType) -> Self {
        Self {
            position,
            header_exact: Some(header.into()),
            header_guess: None,
            data_type,
            human_provided: true,
        }
    }

    /// Header used as the row key: exact, else guess, else `Column N`.
    pub fn header(&self) -> String {
        self.header_exact
            .as_deref()
            .or(self.header_guess.as_deref())
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string())
            .unwrap_or_else(|| format!("Column {}", self.position))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Table,
    List,
    Prose,
    Form,
    ImageOnly,
    Mixed,
    #[default]
    Unknown,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::List => "list",
            Self::Prose => "prose",
            Self::Form => "form",
            Self::ImageOnly => "image-only",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Handwriting {
    Printed,
    Cursive,
    PrintHand,
    Mixed,
    #[default]
    Unknown,
}

/// Optional human hint describing the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentStructure {
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub scan_quality: ScanQuality,
    #[serde(default)]
    pub handwriting: Handwriting,
}

impl ContentStructure {
    /// Columns sorted by position.
    pub fn ordered_columns(&self) -> Vec<ColumnDefinition> {
        let mut cols = self.columns.clone();
        cols.sort_by_key(|c| c.position);
        cols
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn has_human_headers(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.human_provided && c.header_exact.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureKind {
    TabDelimited,
    PipeDelimited,
    FixedWidth,
    WhitespaceTable,
    Narrative,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TabDelimited => "tab-delimited",
            Self::PipeDelimited => "pipe-delimited",
            Self::FixedWidth => "fixed-width",
            Self::WhitespaceTable => "whitespace-table",
            Self::Narrative => "narrative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tab-delimited" => Some(Self::TabDelimited),
            "pipe-delimited" => Some(Self::PipeDelimited),
            "fixed-width" => Some(Self::FixedWidth),
            "whitespace-table" => Some(Self::WhitespaceTable),
            "narrative" => Some(Self::Narrative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedStructure {
    pub kind: StructureKind,
    /// Character offsets where fixed-width columns start (excluding 0).
    #[serde(default)]
    pub column_positions: Vec<usize>,
    #[serde(default)]
    pub delimiter: Option<char>,
    pub confidence: f64,
}

impl DetectedStructure {
    pub fn new(kind: StructureKind, confidence: f64) -> Self {
        Self {
            kind,
            column_positions: Vec::new(),
            delimiter: None,
            confidence,
        }
    }

    pub fn is_tabular(&self) -> bool {
        self.kind != StructureKind::Narrative
    }
}
