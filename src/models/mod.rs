//! Data models for the extraction pipeline.

mod content;
mod coverage;
mod entity;
mod job;
mod ocr;
mod row;
mod source;
mod structure;

pub use content::{detect_mime, ContentBuffer, FetchMethod};
pub use coverage::CoverageRecord;
pub use entity::{
    apply_confirmation, ConfirmationChannel, EntityRecord, PersonType, Relationship,
    RelationshipKind,
};
pub use job::{progress, DebugEntry, ExtractionJob, ExtractionRequest, JobStatus};
pub use ocr::{OcrOptions, OcrResult, OcrService, PageAnnotation};
pub use row::{mean_confidence, Cell, ExtractionType, Row};
pub use source::{AccessMode, ArchiveHints, SourceReference, SourceRequest, SourceTier};
pub use structure::{
    ColumnDefinition, ContentStructure, DataType, DetectedStructure, Handwriting, Layout,
    ScanQuality, StructureKind,
};
