//! Extraction jobs and their debug log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ocr::OcrOptions;
use super::row::Row;
use super::source::SourceRequest;
use super::structure::ContentStructure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    AwaitingManualInput,
    AwaitingUpload,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::AwaitingManualInput => "awaiting-manual-input",
            Self::AwaitingUpload => "awaiting-upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "awaiting-manual-input" => Some(Self::AwaitingManualInput),
            "awaiting-upload" => Some(Self::AwaitingUpload),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

/// Progress checkpoints a job moves through.
pub mod progress {
    pub const QUEUED: u8 = 5;
    pub const FETCHING: u8 = 10;
    pub const FETCHED: u8 = 15;
    pub const OCR_DONE: u8 = 40;
    pub const DETECTED: u8 = 60;
    pub const PARSED: u8 = 70;
    pub const ARBITRATED: u8 = 80;
    pub const EMITTED: u8 = 90;
    pub const DONE: u8 = 100;
}

/// What the caller asks the pipeline to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub source: SourceRequest,
    #[serde(default)]
    pub structure: Option<ContentStructure>,
    #[serde(default)]
    pub ocr: OcrOptions,
    /// Names drawn from human context for the narrative target-name pass.
    #[serde(default)]
    pub target_names: Vec<String>,
}

impl ExtractionRequest {
    pub fn new(source: SourceRequest) -> Self {
        Self {
            source,
            structure: None,
            ocr: OcrOptions::default(),
            target_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub message: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The persisted job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: String,
    pub request: ExtractionRequest,
    pub status: JobStatus,
    pub progress: u8,
    pub status_message: String,
    #[serde(default)]
    pub raw_ocr_text: Option<String>,
    #[serde(default)]
    pub parsed_rows: Vec<Row>,
    pub row_count: usize,
    pub avg_confidence: f64,
    #[serde(default)]
    pub debug_log: Vec<DebugEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExtractionJob {
    pub fn new(request: ExtractionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            status: JobStatus::Pending,
            progress: 0,
            status_message: "queued".to_string(),
            raw_ocr_text: None,
            parsed_rows: Vec::new(),
            row_count: 0,
            avg_confidence: 0.0,
            debug_log: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Advance progress; never moves backwards.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) {
        self.progress = self.progress.max(progress.min(100));
        self.status_message = message.into();
        self.updated_at = Utc::now();
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: JobStatus, message: impl Into<String>) {
        self.status = status;
        self.status_message = message.into();
        let now = Utc::now();
        self.updated_at = now;
        if status == JobStatus::Completed {
            self.progress = progress::DONE;
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
    }
}
