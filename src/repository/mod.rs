//! Provenance store: the narrow contract the pipeline writes through.
//!
//! Every write is an idempotent upsert keyed by `(full_name, source_url)`,
//! the row fingerprint, or `(volume_id, page_number)`, so a pipeline run can
//! resume after a failure without bookkeeping.

pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_store;
pub mod memory;
pub mod retry;
pub mod util;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CoverageRecord, DebugEntry, EntityRecord, ExtractionJob, Relationship};

pub use diesel_pool::{AsyncSqlitePool, DieselError};
pub use diesel_store::DieselStore;
pub use memory::MemoryStore;
pub use retry::with_retry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying the same write can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("locked") || msg.contains("busy") || msg.contains("unable to open")
            }
            Self::Serialization(_) | Self::NotFound(_) => false,
        }
    }
}

/// Outcome of an entity insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityInsert {
    Inserted(String),
    /// A record with the same `(full_name, source_url)` already exists.
    Existing(String),
}

impl EntityInsert {
    pub fn id(&self) -> &str {
        match self {
            Self::Inserted(id) | Self::Existing(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// One entry of the per-document row log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLogEntry {
    pub fingerprint: String,
    pub source_url: String,
    pub volume_id: String,
    pub page_number: u32,
    pub row_index: usize,
    pub entity_id: Option<String>,
    pub extraction_type: String,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// A fetched source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub source_url: String,
    pub final_url: String,
    pub mime_type: String,
    pub fetch_method: String,
    /// SHA-256 of the content, hex encoded.
    pub content_hash: String,
    pub size_bytes: u64,
    pub page_count: u32,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    /// Create tables if needed.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert keyed on `(full_name, source_url)`; does nothing on conflict.
    async fn insert_entity(&self, entity: &EntityRecord) -> Result<EntityInsert, StoreError>;

    /// Re-assert type and context of an existing record.
    async fn update_entity(&self, id: &str, entity: &EntityRecord) -> Result<(), StoreError>;

    async fn entities_for_source(&self, source_url: &str) -> Result<Vec<EntityRecord>, StoreError>;

    async fn has_row(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// Returns true when the fingerprint was new.
    async fn insert_row_log(&self, entry: &RowLogEntry) -> Result<bool, StoreError>;

    async fn row_log_count(&self, source_url: &str) -> Result<usize, StoreError>;

    /// Insert or replace the record keyed on `(volume_id, page_number)`.
    async fn upsert_coverage(&self, record: &CoverageRecord) -> Result<(), StoreError>;

    async fn coverage(&self, volume_id: &str, page: u32) -> Result<Option<CoverageRecord>, StoreError>;

    /// Slaveholder names already extracted for this source by a method other
    /// than `exclude_method`, oldest first.
    async fn slaveholders_for_source(
        &self,
        source_url: &str,
        exclude_method: &str,
    ) -> Result<Vec<String>, StoreError>;

    async fn insert_relationship(
        &self,
        source_url: &str,
        relationship: &Relationship,
    ) -> Result<(), StoreError>;

    async fn relationships_for_source(&self, source_url: &str) -> Result<Vec<Relationship>, StoreError>;

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<(), StoreError>;

    async fn save_job(&self, job: &ExtractionJob) -> Result<(), StoreError>;

    async fn load_job(&self, id: &str) -> Result<Option<ExtractionJob>, StoreError>;

    async fn save_debug_log(&self, job_id: &str, log: &[DebugEntry]) -> Result<(), StoreError>;
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
