//! Entity records written to the provenance store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
    Enslaved,
    Slaveholder,
    Vessel,
    FinancialActor,
    DocumentReference,
    Other,
}

impl PersonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enslaved => "enslaved",
            Self::Slaveholder => "slaveholder",
            Self::Vessel => "vessel",
            Self::FinancialActor => "financial_actor",
            Self::DocumentReference => "document_reference",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "enslaved" => Some(Self::Enslaved),
            "slaveholder" => Some(Self::Slaveholder),
            "vessel" => Some(Self::Vessel),
            "financial_actor" => Some(Self::FinancialActor),
            "document_reference" => Some(Self::DocumentReference),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A person (or vessel, firm, ...) extracted from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Store-assigned id; `None` until inserted.
    #[serde(default)]
    pub id: Option<String>,
    pub full_name: String,
    pub person_type: PersonType,
    pub source_url: String,
    pub extraction_method: String,
    pub context_text: String,
    pub confidence: f64,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub relationships: Option<serde_json::Value>,
}

impl EntityRecord {
    pub fn new(
        full_name: impl Into<String>,
        person_type: PersonType,
        source_url: impl Into<String>,
        extraction_method: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            full_name: full_name.into(),
            person_type,
            source_url: source_url.into(),
            extraction_method: extraction_method.into(),
            context_text: String::new(),
            confidence: 0.0,
            gender: None,
            age: None,
            locations: Vec::new(),
            relationships: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_text = context.into();
        self
    }

    pub fn with_owner(mut self, owner: Option<&str>) -> Self {
        self.relationships = Some(serde_json::json!({ "owner": owner }));
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.extraction_method == "placeholder"
    }
}

/// A directed relationship between two extracted names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub subject: String,
    pub object: String,
    pub confidence: f64,
    /// Sentence the relationship was read from.
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Subject is the slaveholder, object the enslaved person.
    Ownership,
    /// Both enslaved; subject is the named relative.
    Family,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ownership => "ownership",
            Self::Family => "family",
        }
    }
}

/// Mechanisms that can raise an entity's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationChannel {
    HumanTranscription,
    OcrHumanReview,
    HighConfidenceOcr,
    PageMetadata,
    CrossReference,
}

impl ConfirmationChannel {
    pub fn value(&self) -> f64 {
        match self {
            Self::HumanTranscription => 0.95,
            Self::OcrHumanReview => 0.90,
            Self::HighConfidenceOcr => 0.75,
            Self::PageMetadata => 0.60,
            Self::CrossReference => 0.70,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HumanTranscription => "human_transcription",
            Self::OcrHumanReview => "ocr_human_review",
            Self::HighConfidenceOcr => "high_confidence_ocr",
            Self::PageMetadata => "page_metadata",
            Self::CrossReference => "cross_reference",
        }
    }

    /// Pick the channel a page qualifies for, if any.
    ///
    /// Human-provided headers with OCR at or above 0.8 count as reviewed OCR;
    /// OCR at or above 0.9 on its own is high-confidence OCR.
    pub fn for_page(human_headers: bool, ocr_confidence: f64) -> Option<Self> {
        if human_headers && ocr_confidence >= 0.8 {
            Some(Self::OcrHumanReview)
        } else if ocr_confidence >= 0.9 {
            Some(Self::HighConfidenceOcr)
        } else {
            None
        }
    }
}

/// Raise a confidence to the channel's floor. Never lowers it.
pub fn apply_confirmation(confidence: f64, channel: ConfirmationChannel) -> f64 {
    confidence.max(channel.value()).clamp(0.0, 1.0)
}
