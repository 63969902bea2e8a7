//! SQLite-backed provenance store.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! while keeping Diesel's compile-time query checking.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use super::diesel_models::{
    CoverageRow, EntityRow, JobRecord, NewCoverage, NewDocument, NewEntity, NewJob, NewRelationship,
    NewRowLog, RelationshipRow,
};
use super::diesel_pool::AsyncSqlitePool;
use super::{
    parse_datetime, parse_datetime_opt, DocumentRecord, EntityInsert, ProvenanceStore, RowLogEntry,
    StoreError,
};
use crate::models::{
    CoverageRecord, DebugEntry, EntityRecord, ExtractionJob, JobStatus, OcrService, PersonType,
    Relationship, RelationshipKind,
};
use crate::schema::{coverage, documents, entities, extraction_jobs, relationships, row_log};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS extraction_jobs (
        id TEXT PRIMARY KEY,
        request TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        status_message TEXT NOT NULL DEFAULT '',
        raw_ocr_text TEXT,
        parsed_rows TEXT NOT NULL DEFAULT '[]',
        row_count INTEGER NOT NULL DEFAULT 0,
        avg_confidence REAL NOT NULL DEFAULT 0,
        debug_log TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        full_name TEXT NOT NULL,
        person_type TEXT NOT NULL,
        source_url TEXT NOT NULL,
        extraction_method TEXT NOT NULL,
        context_text TEXT NOT NULL DEFAULT '',
        confidence REAL NOT NULL,
        gender TEXT,
        age TEXT,
        locations TEXT NOT NULL DEFAULT '[]',
        relationships TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(full_name, source_url)
    );

    CREATE TABLE IF NOT EXISTS row_log (
        fingerprint TEXT PRIMARY KEY,
        source_url TEXT NOT NULL,
        volume_id TEXT NOT NULL,
        page_number INTEGER NOT NULL,
        row_index INTEGER NOT NULL,
        entity_id TEXT,
        extraction_type TEXT NOT NULL,
        raw_text TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS coverage (
        volume_id TEXT NOT NULL,
        page_number INTEGER NOT NULL,
        source_url TEXT NOT NULL,
        ocr_service TEXT NOT NULL,
        ocr_confidence REAL NOT NULL,
        ocr_text_length INTEGER NOT NULL,
        detected_rows INTEGER NOT NULL,
        emitted_persons INTEGER NOT NULL,
        named_persons INTEGER NOT NULL,
        placeholder_persons INTEGER NOT NULL,
        owner_candidates TEXT NOT NULL DEFAULT '[]',
        owner_assigned TEXT,
        owner_warning TEXT,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (volume_id, page_number)
    );

    CREATE TABLE IF NOT EXISTS relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_url TEXT NOT NULL,
        kind TEXT NOT NULL,
        subject TEXT NOT NULL,
        object TEXT NOT NULL,
        confidence REAL NOT NULL,
        evidence TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(source_url, kind, subject, object)
    );

    CREATE TABLE IF NOT EXISTS documents (
        source_url TEXT PRIMARY KEY,
        final_url TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        fetch_method TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        page_count INTEGER NOT NULL,
        fetched_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_source ON entities(source_url, person_type);
    CREATE INDEX IF NOT EXISTS idx_row_log_source ON row_log(source_url);
    CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_url);
"#;

impl From<EntityRow> for EntityRecord {
    fn from(row: EntityRow) -> Self {
        EntityRecord {
            id: Some(row.id),
            full_name: row.full_name,
            person_type: PersonType::from_str(&row.person_type).unwrap_or(PersonType::Other),
            source_url: row.source_url,
            extraction_method: row.extraction_method,
            context_text: row.context_text,
            confidence: row.confidence,
            gender: row.gender,
            age: row.age,
            locations: serde_json::from_str(&row.locations).unwrap_or_default(),
            relationships: row
                .relationships
                .and_then(|r| serde_json::from_str(&r).ok()),
        }
    }
}

impl From<CoverageRow> for CoverageRecord {
    fn from(row: CoverageRow) -> Self {
        CoverageRecord {
            source_url: row.source_url,
            volume_id: row.volume_id,
            page_number: row.page_number.max(0) as u32,
            ocr_service: OcrService::from_str(&row.ocr_service).unwrap_or(OcrService::None),
            ocr_confidence: row.ocr_confidence,
            ocr_text_length: row.ocr_text_length.max(0) as usize,
            detected_rows: row.detected_rows.max(0) as usize,
            emitted_persons: row.emitted_persons.max(0) as usize,
            named_persons: row.named_persons.max(0) as usize,
            placeholder_persons: row.placeholder_persons.max(0) as usize,
            owner_candidates: serde_json::from_str(&row.owner_candidates).unwrap_or_default(),
            owner_assigned: row.owner_assigned,
            owner_warning: row.owner_warning,
        }
    }
}

impl TryFrom<JobRecord> for ExtractionJob {
    type Error = StoreError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        Ok(ExtractionJob {
            id: record.id,
            request: serde_json::from_str(&record.request)?,
            status: JobStatus::from_str(&record.status).unwrap_or(JobStatus::Failed),
            progress: record.progress.clamp(0, 100) as u8,
            status_message: record.status_message,
            raw_ocr_text: record.raw_ocr_text,
            parsed_rows: serde_json::from_str(&record.parsed_rows).unwrap_or_default(),
            row_count: record.row_count.max(0) as usize,
            avg_confidence: record.avg_confidence,
            debug_log: serde_json::from_str(&record.debug_log).unwrap_or_default(),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            completed_at: parse_datetime_opt(record.completed_at),
        })
    }
}

fn relationship_from_row(row: RelationshipRow) -> Option<Relationship> {
    let kind = match row.kind.as_str() {
        "ownership" => RelationshipKind::Ownership,
        "family" => RelationshipKind::Family,
        _ => return None,
    };
    Some(Relationship {
        kind,
        subject: row.subject,
        object: row.object,
        confidence: row.confidence,
        evidence: row.evidence,
    })
}

#[derive(Clone)]
pub struct DieselStore {
    pool: AsyncSqlitePool,
}

impl DieselStore {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    pub fn from_path(db_path: &Path) -> Self {
        Self::new(AsyncSqlitePool::from_path(db_path))
    }
}

#[async_trait]
impl ProvenanceStore for DieselStore {
    async fn init(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        Ok(())
    }

    async fn insert_entity(&self, entity: &EntityRecord) -> Result<EntityInsert, StoreError> {
        let mut conn = self.pool.get().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let locations = serde_json::to_string(&entity.locations)?;
        let relationships_json = entity
            .relationships
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let inserted = diesel::insert_or_ignore_into(entities::table)
            .values(&NewEntity {
                id: &id,
                full_name: &entity.full_name,
                person_type: entity.person_type.as_str(),
                source_url: &entity.source_url,
                extraction_method: &entity.extraction_method,
                context_text: &entity.context_text,
                confidence: entity.confidence,
                gender: entity.gender.as_deref(),
                age: entity.age.as_deref(),
                locations: &locations,
                relationships: relationships_json.as_deref(),
                created_at: &now,
                updated_at: &now,
            })
            .execute(&mut conn)
            .await?;

        if inserted > 0 {
            return Ok(EntityInsert::Inserted(id));
        }

        let existing: String = entities::table
            .filter(entities::full_name.eq(&entity.full_name))
            .filter(entities::source_url.eq(&entity.source_url))
            .select(entities::id)
            .first(&mut conn)
            .await?;
        Ok(EntityInsert::Existing(existing))
    }

    async fn update_entity(&self, id: &str, entity: &EntityRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        let relationships_json = entity
            .relationships
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows = diesel::update(entities::table.find(id))
            .set((
                entities::person_type.eq(entity.person_type.as_str()),
                entities::context_text.eq(&entity.context_text),
                entities::confidence.eq(entity.confidence),
                entities::relationships.eq(relationships_json.as_deref()),
                entities::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }
        Ok(())
    }

    async fn entities_for_source(&self, source_url: &str) -> Result<Vec<EntityRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = entities::table
            .filter(entities::source_url.eq(source_url))
            .order(entities::created_at.asc())
            .select(EntityRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(EntityRecord::from).collect())
    }

    async fn has_row(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let found: Option<String> = row_log::table
            .find(fingerprint)
            .select(row_log::fingerprint)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert_row_log(&self, entry: &RowLogEntry) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let created_at = entry.created_at.to_rfc3339();
        let inserted = diesel::insert_or_ignore_into(row_log::table)
            .values(&NewRowLog {
                fingerprint: &entry.fingerprint,
                source_url: &entry.source_url,
                volume_id: &entry.volume_id,
                page_number: entry.page_number as i32,
                row_index: entry.row_index as i32,
                entity_id: entry.entity_id.as_deref(),
                extraction_type: &entry.extraction_type,
                raw_text: &entry.raw_text,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;
        Ok(inserted > 0)
    }

    async fn row_log_count(&self, source_url: &str) -> Result<usize, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = row_log::table
            .filter(row_log::source_url.eq(source_url))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn upsert_coverage(&self, record: &CoverageRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let candidates = serde_json::to_string(&record.owner_candidates)?;
        let now = Utc::now().to_rfc3339();

        // Use replace_into for SQLite upsert
        diesel::replace_into(coverage::table)
            .values(&NewCoverage {
                volume_id: &record.volume_id,
                page_number: record.page_number as i32,
                source_url: &record.source_url,
                ocr_service: record.ocr_service.as_str(),
                ocr_confidence: record.ocr_confidence,
                ocr_text_length: record.ocr_text_length as i32,
                detected_rows: record.detected_rows as i32,
                emitted_persons: record.emitted_persons as i32,
                named_persons: record.named_persons as i32,
                placeholder_persons: record.placeholder_persons as i32,
                owner_candidates: &candidates,
                owner_assigned: record.owner_assigned.as_deref(),
                owner_warning: record.owner_warning.as_deref(),
                updated_at: &now,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn coverage(&self, volume_id: &str, page: u32) -> Result<Option<CoverageRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = coverage::table
            .find((volume_id, page as i32))
            .select(CoverageRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(CoverageRecord::from))
    }

    async fn slaveholders_for_source(
        &self,
        source_url: &str,
        exclude_method: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let names = entities::table
            .filter(entities::source_url.eq(source_url))
            .filter(entities::person_type.eq(PersonType::Slaveholder.as_str()))
            .filter(entities::extraction_method.ne(exclude_method))
            .order(entities::created_at.asc())
            .select(entities::full_name)
            .load::<String>(&mut conn)
            .await?;
        Ok(names)
    }

    async fn insert_relationship(
        &self,
        source_url: &str,
        relationship: &Relationship,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        diesel::insert_or_ignore_into(relationships::table)
            .values(&NewRelationship {
                source_url,
                kind: relationship.kind.as_str(),
                subject: &relationship.subject,
                object: &relationship.object,
                confidence: relationship.confidence,
                evidence: &relationship.evidence,
                created_at: &now,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn relationships_for_source(&self, source_url: &str) -> Result<Vec<Relationship>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = relationships::table
            .filter(relationships::source_url.eq(source_url))
            .order(relationships::id.asc())
            .select(RelationshipRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().filter_map(relationship_from_row).collect())
    }

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let fetched_at = document.fetched_at.to_rfc3339();
        diesel::replace_into(documents::table)
            .values(&NewDocument {
                source_url: &document.source_url,
                final_url: &document.final_url,
                mime_type: &document.mime_type,
                fetch_method: &document.fetch_method,
                content_hash: &document.content_hash,
                size_bytes: document.size_bytes as i64,
                page_count: document.page_count as i32,
                fetched_at: &fetched_at,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn save_job(&self, job: &ExtractionJob) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let request = serde_json::to_string(&job.request)?;
        let parsed_rows = serde_json::to_string(&job.parsed_rows)?;
        let debug_log = serde_json::to_string(&job.debug_log)?;
        let created_at = job.created_at.to_rfc3339();
        let updated_at = job.updated_at.to_rfc3339();
        let completed_at = job.completed_at.map(|dt| dt.to_rfc3339());

        diesel::replace_into(extraction_jobs::table)
            .values(&NewJob {
                id: &job.id,
                request: &request,
                status: job.status.as_str(),
                progress: job.progress as i32,
                status_message: &job.status_message,
                raw_ocr_text: job.raw_ocr_text.as_deref(),
                parsed_rows: &parsed_rows,
                row_count: job.row_count as i32,
                avg_confidence: job.avg_confidence,
                debug_log: &debug_log,
                created_at: &created_at,
                updated_at: &updated_at,
                completed_at: completed_at.as_deref(),
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_job(&self, id: &str) -> Result<Option<ExtractionJob>, StoreError> {
        let mut conn = self.pool.get().await?;
        let record = extraction_jobs::table
            .find(id)
            .select(JobRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        record.map(ExtractionJob::try_from).transpose()
    }

    async fn save_debug_log(&self, job_id: &str, log: &[DebugEntry]) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let debug_log = serde_json::to_string(log)?;
        let rows = diesel::update(extraction_jobs::table.find(job_id))
            .set((
                extraction_jobs::debug_log.eq(&debug_log),
                extraction_jobs::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("job {}", job_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionRequest, SourceReference, SourceRequest};
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = DieselStore::from_path(&dir.path().join("test.db"));
        store.init().await.unwrap();
        (store, dir)
    }

    fn entity(name: &str, person_type: PersonType, method: &str) -> EntityRecord {
        EntityRecord::new(name, person_type, "https://example.org/vol812.pdf", method)
            .with_confidence(0.7)
    }

    #[tokio::test]
    async fn test_entity_insert_is_idempotent() {
        let (store, _dir) = setup_test_db().await;
        let e = entity("Clara Washington", PersonType::Enslaved, "table_parser");

        let first = store.insert_entity(&e).await.unwrap();
        assert!(first.is_new());
        let second = store.insert_entity(&e).await.unwrap();
        assert_eq!(second, EntityInsert::Existing(first.id().to_string()));

        let all = store
            .entities_for_source("https://example.org/vol812.pdf")
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].person_type, PersonType::Enslaved);
    }

    #[tokio::test]
    async fn test_update_entity() {
        let (store, _dir) = setup_test_db().await;
        let e = entity("Thomas Addison", PersonType::Other, "narrative_extractor");
        let id = store.insert_entity(&e).await.unwrap().id().to_string();

        let updated = EntityRecord {
            person_type: PersonType::Slaveholder,
            ..e.clone()
        }
        .with_context("owner of the page");
        store.update_entity(&id, &updated).await.unwrap();

        let all = store.entities_for_source(&e.source_url).await.unwrap();
        assert_eq!(all[0].person_type, PersonType::Slaveholder);
        assert_eq!(all[0].context_text, "owner of the page");

        assert!(matches!(
            store.update_entity("missing", &updated).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_row_log_first_insert_wins() {
        let (store, _dir) = setup_test_db().await;
        let entry = RowLogEntry {
            fingerprint: "abc".into(),
            source_url: "u".into(),
            volume_id: "812".into(),
            page_number: 47,
            row_index: 3,
            entity_id: None,
            extraction_type: "table".into(),
            raw_text: "Tom M 34".into(),
            created_at: Utc::now(),
        };
        assert!(!store.has_row("abc").await.unwrap());
        assert!(store.insert_row_log(&entry).await.unwrap());
        assert!(!store.insert_row_log(&entry).await.unwrap());
        assert!(store.has_row("abc").await.unwrap());
        assert_eq!(store.row_log_count("u").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_coverage_updated_in_place() {
        let (store, _dir) = setup_test_db().await;
        let mut record = CoverageRecord::empty("u", "812", 47);
        record.detected_rows = 32;
        record.named_persons = 3;
        record.placeholder_persons = 29;
        record.owner_warning = Some("no owner".into());
        store.upsert_coverage(&record).await.unwrap();

        record.emitted_persons = 0;
        record.owner_candidates = vec!["John Hall".into()];
        store.upsert_coverage(&record).await.unwrap();

        let loaded = store.coverage("812", 47).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.coverage("812", 48).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slaveholder_fallback_excludes_method() {
        let (store, _dir) = setup_test_db().await;
        store
            .insert_entity(&entity("John Hall", PersonType::Slaveholder, "narrative_extractor"))
            .await
            .unwrap();
        store
            .insert_entity(&entity("Ann Dorsey", PersonType::Slaveholder, "table_parser"))
            .await
            .unwrap();

        let owners = store
            .slaveholders_for_source("https://example.org/vol812.pdf", "table_parser")
            .await
            .unwrap();
        assert_eq!(owners, vec!["John Hall"]);
    }

    #[tokio::test]
    async fn test_relationships_deduplicated() {
        let (store, _dir) = setup_test_db().await;
        let rel = Relationship {
            kind: RelationshipKind::Family,
            subject: "Sarah".into(),
            object: "Jacob".into(),
            confidence: 0.5,
            evidence: "Sarah, the mother of Jacob".into(),
        };
        store.insert_relationship("u", &rel).await.unwrap();
        store.insert_relationship("u", &rel).await.unwrap();
        assert_eq!(store.relationships_for_source("u").await.unwrap(), vec![rel]);
    }

    #[tokio::test]
    async fn test_job_round_trip_and_debug_log() {
        let (store, _dir) = setup_test_db().await;
        let mut job = ExtractionJob::new(ExtractionRequest::new(SourceRequest::new(
            SourceReference::Url("https://example.org/a.pdf".into()),
        )));
        store.save_job(&job).await.unwrap();

        job.debug_log.push(DebugEntry {
            timestamp: Utc::now(),
            stage: "fetch".into(),
            message: "direct_http ok".into(),
            elapsed_ms: 12,
            data: serde_json::Value::Null,
        });
        store.save_debug_log(&job.id, &job.debug_log).await.unwrap();

        let loaded = store.load_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.debug_log.len(), 1);
        assert_eq!(loaded.request, job.request);
        assert!(store.load_job("nope").await.unwrap().is_none());
    }
}
