//! In-memory provenance store with the same semantics as the SQLite one.
//!
//! Used by tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentRecord, EntityInsert, ProvenanceStore, RowLogEntry, StoreError};
use crate::models::{
    CoverageRecord, DebugEntry, EntityRecord, ExtractionJob, PersonType, Relationship,
};

#[derive(Default)]
struct State {
    /// Insertion order is the creation order.
    entities: Vec<EntityRecord>,
    row_log: HashMap<String, RowLogEntry>,
    coverage: HashMap<(String, u32), CoverageRecord>,
    relationships: Vec<(String, Relationship)>,
    documents: HashMap<String, DocumentRecord>,
    jobs: HashMap<String, ExtractionJob>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a transient error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Number of entity records across all sources.
    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn document(&self, source_url: &str) -> Option<DocumentRecord> {
        self.state.read().await.documents.get(source_url).cloned()
    }
}

#[async_trait]
impl ProvenanceStore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_entity(&self, entity: &EntityRecord) -> Result<EntityInsert, StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .entities
            .iter()
            .find(|e| e.full_name == entity.full_name && e.source_url == entity.source_url)
        {
            return Ok(EntityInsert::Existing(existing.id.clone().unwrap_or_default()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let mut record = entity.clone();
        record.id = Some(id.clone());
        state.entities.push(record);
        Ok(EntityInsert::Inserted(id))
    }

    async fn update_entity(&self, id: &str, entity: &EntityRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let record = state
            .entities
            .iter_mut()
            .find(|e| e.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        record.person_type = entity.person_type;
        record.context_text = entity.context_text.clone();
        record.confidence = entity.confidence;
        record.relationships = entity.relationships.clone();
        Ok(())
    }

    async fn entities_for_source(&self, source_url: &str) -> Result<Vec<EntityRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .iter()
            .filter(|e| e.source_url == source_url)
            .cloned()
            .collect())
    }

    async fn has_row(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.state.read().await.row_log.contains_key(fingerprint))
    }

    async fn insert_row_log(&self, entry: &RowLogEntry) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if state.row_log.contains_key(&entry.fingerprint) {
            return Ok(false);
        }
        state
            .row_log
            .insert(entry.fingerprint.clone(), entry.clone());
        Ok(true)
    }

    async fn row_log_count(&self, source_url: &str) -> Result<usize, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .row_log
            .values()
            .filter(|r| r.source_url == source_url)
            .count())
    }

    async fn upsert_coverage(&self, record: &CoverageRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        state.coverage.insert(
            (record.volume_id.clone(), record.page_number),
            record.clone(),
        );
        Ok(())
    }

    async fn coverage(&self, volume_id: &str, page: u32) -> Result<Option<CoverageRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.coverage.get(&(volume_id.to_string(), page)).cloned())
    }

    async fn slaveholders_for_source(
        &self,
        source_url: &str,
        exclude_method: &str,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .iter()
            .filter(|e| {
                e.source_url == source_url
                    && e.person_type == PersonType::Slaveholder
                    && e.extraction_method != exclude_method
            })
            .map(|e| e.full_name.clone())
            .collect())
    }

    async fn insert_relationship(
        &self,
        source_url: &str,
        relationship: &Relationship,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let exists = state.relationships.iter().any(|(url, r)| {
            url == source_url
                && r.kind == relationship.kind
                && r.subject == relationship.subject
                && r.object == relationship.object
        });
        if !exists {
            state
                .relationships
                .push((source_url.to_string(), relationship.clone()));
        }
        Ok(())
    }

    async fn relationships_for_source(&self, source_url: &str) -> Result<Vec<Relationship>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .relationships
            .iter()
            .filter(|(url, _)| url == source_url)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        state
            .documents
            .insert(document.source_url.clone(), document.clone());
        Ok(())
    }

    async fn save_job(&self, job: &ExtractionJob) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load_job(&self, id: &str) -> Result<Option<ExtractionJob>, StoreError> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn save_debug_log(&self, job_id: &str, log: &[DebugEntry]) -> Result<(), StoreError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        job.debug_log = log.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_entity_conflict_returns_existing() {
        let store = MemoryStore::new();
        let e = EntityRecord::new("Tom", PersonType::Enslaved, "u", "table_parser");
        let first = store.insert_entity(&e).await.unwrap();
        let second = store.insert_entity(&e).await.unwrap();
        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.id(), second.id());
        assert_eq!(store.entity_count().await, 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        let e = EntityRecord::new("Tom", PersonType::Enslaved, "u", "table_parser");
        let err = store.insert_entity(&e).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.insert_entity(&e).await.is_ok());
    }

    #[tokio::test]
    async fn test_fallback_excludes_current_method() {
        let store = MemoryStore::new();
        for (name, method) in [("John Hall", "narrative_extractor"), ("Ann Dorsey", "table_parser")] {
            store
                .insert_entity(&EntityRecord::new(name, PersonType::Slaveholder, "u", method))
                .await
                .unwrap();
        }
        let owners = store.slaveholders_for_source("u", "table_parser").await.unwrap();
        assert_eq!(owners, vec!["John Hall"]);
    }
}
