//! Row emitter: every ink-bearing row becomes a person record.
//!
//! Rows with a legible name become named records; everything else becomes a
//! placeholder so OCR garbage still yields a person. Each row is keyed by a
//! fingerprint in the store's row log, which makes re-runs emit nothing new.

mod fingerprint;
mod mapping;

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

pub use fingerprint::{normalize_line, row_fingerprint};
pub use mapping::{
    is_legit_name, line_entity, name_token, narrative_entity, narrative_role, owner_entities,
    placeholder_name, row_owner, table_entity, LINE_TOKEN_METHOD, PLACEHOLDER_CONFIDENCE,
};

use crate::config::PipelineConfig;
use crate::models::{
    apply_confirmation, ColumnDefinition, ConfirmationChannel, CoverageRecord, EntityRecord,
    ExtractionType, OcrService, PersonType, Relationship, Row,
};
use crate::parsing::SourceLine;
use crate::repository::{with_retry, EntityInsert, ProvenanceStore, RowLogEntry, StoreError};
use crate::rules::CompiledRules;

/// Where the rows came from.
#[derive(Debug, Clone)]
pub struct PageScope {
    pub source_url: String,
    pub volume_id: String,
    pub page_number: u32,
    pub ocr_service: OcrService,
    pub ocr_confidence: f64,
    pub ocr_text_length: usize,
    /// Column headers were supplied by a person.
    pub human_headers: bool,
    /// Extraction method of the page's primary rows; the owner fallback
    /// ignores records this method produced.
    pub method: &'static str,
}

/// One detected row: the originating line plus the parsed row, if any parser
/// understood it.
#[derive(Debug, Clone)]
pub struct EmitUnit {
    pub row_index: usize,
    pub raw_text: String,
    pub row: Option<Row>,
}

#[derive(Debug, Clone)]
pub struct EmitRequest {
    pub scope: PageScope,
    pub units: Vec<EmitUnit>,
    pub columns: Vec<ColumnDefinition>,
    /// Entities that are not rows: narrative slaveholders, vessels, firms,
    /// and owners named in table columns.
    pub supplementary: Vec<EntityRecord>,
    pub relationships: Vec<Relationship>,
    /// Owners read from labels on the page itself.
    pub owner_candidates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EmitReport {
    pub coverage: CoverageRecord,
    /// Rows whose fingerprint was new but whose name already had a record.
    pub updated_entities: usize,
    /// Rows already in the row log.
    pub skipped_rows: usize,
    pub supplementary_inserted: usize,
    pub relationships_written: usize,
}

/// Units for a tabular page: every ink line except header lines, paired
/// with the row parsed from it.
pub fn plan_units(lines: &[SourceLine], header_indices: &[usize], rows: &[Row]) -> Vec<EmitUnit> {
    lines
        .iter()
        .filter(|l| !header_indices.contains(&l.index))
        .map(|line| EmitUnit {
            row_index: line.index,
            raw_text: line.text.trim().to_string(),
            row: rows
                .iter()
                .find(|r| !r.extraction_type.is_narrative() && r.row_index == line.index)
                .cloned(),
        })
        .collect()
}

/// Units for narrative rows: enslaved persons only. Slaveholders and other
/// entities are written as supplementary records.
pub fn narrative_units(rows: &[Row]) -> Vec<EmitUnit> {
    rows.iter()
        .filter(|r| r.extraction_type.is_narrative())
        .filter(|r| narrative_role(r) == Some(PersonType::Enslaved))
        .map(|r| EmitUnit {
            row_index: r.row_index,
            raw_text: r.raw_text.clone(),
            row: Some(r.clone()),
        })
        .collect()
}

/// Owner names from labels such as `By whom owned:` or `Petitioner:`,
/// in order of appearance, without duplicates.
pub fn owner_candidates_from_text(text: &str, rules: &CompiledRules) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for label in &rules.owner_labels {
        for caps in label.captures_iter(text) {
            if let Some(m) = caps.name("name") {
                let name = m.as_str().trim().trim_end_matches('.').trim().to_string();
                if !name.is_empty() {
                    found.push((m.start(), name));
                }
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut out: Vec<String> = Vec::new();
    for (_, name) in found {
        if !out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
    out
}

struct PlannedRow {
    fingerprint: String,
    row_index: usize,
    raw_text: String,
    extraction_type: String,
    entity: EntityRecord,
}

enum RowWrite {
    Inserted,
    Updated,
    AlreadyLogged,
}

pub struct RowEmitter {
    store: Arc<dyn ProvenanceStore>,
    rules: Arc<CompiledRules>,
    batch_size: usize,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl RowEmitter {
    pub fn new(
        store: Arc<dyn ProvenanceStore>,
        rules: Arc<CompiledRules>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            rules,
            batch_size: config.row_batch_size.max(1),
            retry_attempts: config.store_retry_attempts,
            retry_base_delay: config.retry_base_delay(),
        }
    }

    pub async fn emit(&self, request: EmitRequest) -> Result<EmitReport, StoreError> {
        let scope = &request.scope;
        let mut coverage =
            CoverageRecord::empty(&scope.source_url, &scope.volume_id, scope.page_number);
        coverage.ocr_service = scope.ocr_service;
        coverage.ocr_confidence = scope.ocr_confidence;
        coverage.ocr_text_length = scope.ocr_text_length;
        coverage.detected_rows = request.units.len();

        let mut report = EmitReport {
            coverage: coverage.clone(),
            updated_entities: 0,
            skipped_rows: 0,
            supplementary_inserted: 0,
            relationships_written: 0,
        };

        // Supplementary records first so a table page can fall back to
        // slaveholders the narrative pass found in the same text.
        for entity in &request.supplementary {
            if self.upsert_entity(entity).await?.is_new() {
                report.supplementary_inserted += 1;
            }
        }

        let candidates = self
            .owner_candidates(scope, request.owner_candidates.clone(), !request.units.is_empty())
            .await?;
        coverage.owner_candidates = candidates.clone();
        coverage.owner_assigned = candidates.first().cloned();
        if !request.units.is_empty() && coverage.owner_assigned.is_none() {
            let msg = format!(
                "{} rows on vol {} p.{} but no owner candidate found",
                request.units.len(),
                scope.volume_id,
                scope.page_number
            );
            warn!("{} ({})", msg, scope.source_url);
            coverage.owner_warning = Some(msg);
        }

        let channel = ConfirmationChannel::for_page(scope.human_headers, scope.ocr_confidence);
        let planned: Vec<PlannedRow> = request
            .units
            .iter()
            .enumerate()
            .map(|(i, unit)| {
                self.plan_row(
                    scope,
                    unit,
                    i + 1,
                    &request.columns,
                    coverage.owner_assigned.as_deref(),
                    channel,
                )
            })
            .collect();

        coverage.placeholder_persons = planned.iter().filter(|p| p.entity.is_placeholder()).count();
        coverage.named_persons = planned.len() - coverage.placeholder_persons;

        for (n, batch) in planned.chunks(self.batch_size).enumerate() {
            let outcomes = try_join_all(batch.iter().map(|p| self.write_row(scope, p))).await?;
            for outcome in outcomes {
                match outcome {
                    RowWrite::Inserted => coverage.emitted_persons += 1,
                    RowWrite::Updated => report.updated_entities += 1,
                    RowWrite::AlreadyLogged => report.skipped_rows += 1,
                }
            }
            debug!("Wrote row batch {} ({} rows)", n + 1, batch.len());
        }

        for rel in &request.relationships {
            self.retry("insert relationship", || {
                self.store.insert_relationship(&scope.source_url, rel)
            })
            .await?;
            report.relationships_written += 1;
        }

        self.retry("upsert coverage", || self.store.upsert_coverage(&coverage))
            .await?;

        info!(
            "Emitted vol {} p.{}: {} rows, {} named, {} placeholders, {} new",
            scope.volume_id,
            scope.page_number,
            coverage.detected_rows,
            coverage.named_persons,
            coverage.placeholder_persons,
            coverage.emitted_persons
        );
        report.coverage = coverage;
        Ok(report)
    }

    async fn retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        with_retry(what, self.retry_attempts, self.retry_base_delay, op).await
    }

    /// Labels on the page win; otherwise slaveholders other passes recorded
    /// for the same source.
    async fn owner_candidates(
        &self,
        scope: &PageScope,
        from_labels: Vec<String>,
        has_rows: bool,
    ) -> Result<Vec<String>, StoreError> {
        if !from_labels.is_empty() || !has_rows {
            return Ok(from_labels);
        }
        let prior = self
            .retry("read prior slaveholders", || {
                self.store
                    .slaveholders_for_source(&scope.source_url, scope.method)
            })
            .await?;
        if !prior.is_empty() {
            debug!(
                "Owner fallback found {} prior slaveholders for {}",
                prior.len(),
                scope.source_url
            );
        }
        Ok(prior)
    }

    fn plan_row(
        &self,
        scope: &PageScope,
        unit: &EmitUnit,
        ordinal: usize,
        columns: &[ColumnDefinition],
        page_owner: Option<&str>,
        channel: Option<ConfirmationChannel>,
    ) -> PlannedRow {
        let token = name_token(unit.row.as_ref(), columns, &unit.raw_text);
        let owner = unit
            .row
            .as_ref()
            .and_then(|r| row_owner(r, columns))
            .or_else(|| page_owner.map(|o| o.to_string()));

        let legit = is_legit_name(&token, &self.rules);
        let (mut entity, extraction_type) = match (legit, &unit.row) {
            (true, Some(row)) if row.extraction_type.is_narrative() => (
                narrative_entity(row, &scope.source_url),
                row.extraction_type.as_str(),
            ),
            (true, Some(row)) => (
                table_entity(row, columns, &token, &scope.source_url),
                row.extraction_type.as_str(),
            ),
            (true, None) => (
                line_entity(&token, &unit.raw_text, &scope.source_url, scope.ocr_confidence),
                ExtractionType::Table.as_str(),
            ),
            (false, _) => (
                EntityRecord::new(
                    placeholder_name(&scope.volume_id, scope.page_number, ordinal),
                    PersonType::Enslaved,
                    &scope.source_url,
                    "placeholder",
                )
                .with_confidence(PLACEHOLDER_CONFIDENCE)
                .with_context(unit.raw_text.clone()),
                "placeholder",
            ),
        };

        let narrative = unit
            .row
            .as_ref()
            .is_some_and(|r| r.extraction_type.is_narrative());
        if legit && !narrative {
            if let Some(channel) = channel {
                entity.confidence = apply_confirmation(entity.confidence, channel);
            }
        }
        entity = entity.with_owner(owner.as_deref());

        PlannedRow {
            fingerprint: row_fingerprint(
                &scope.volume_id,
                scope.page_number,
                unit.row_index,
                owner.as_deref(),
                &unit.raw_text,
            ),
            row_index: unit.row_index,
            raw_text: unit.raw_text.clone(),
            extraction_type: extraction_type.to_string(),
            entity,
        }
    }

    async fn write_row(&self, scope: &PageScope, planned: &PlannedRow) -> Result<RowWrite, StoreError> {
        let fp = planned.fingerprint.as_str();
        if self.retry("check row log", || self.store.has_row(fp)).await? {
            return Ok(RowWrite::AlreadyLogged);
        }

        let outcome = self.upsert_entity(&planned.entity).await?;

        let entry = RowLogEntry {
            fingerprint: planned.fingerprint.clone(),
            source_url: scope.source_url.clone(),
            volume_id: scope.volume_id.clone(),
            page_number: scope.page_number,
            row_index: planned.row_index,
            entity_id: Some(outcome.id().to_string()),
            extraction_type: planned.extraction_type.clone(),
            raw_text: planned.raw_text.clone(),
            created_at: chrono::Utc::now(),
        };
        self.retry("insert row log", || self.store.insert_row_log(&entry))
            .await?;

        Ok(if outcome.is_new() {
            RowWrite::Inserted
        } else {
            RowWrite::Updated
        })
    }

    /// Insert, or re-assert type and context on the existing record.
    async fn upsert_entity(&self, entity: &EntityRecord) -> Result<EntityInsert, StoreError> {
        let outcome = self
            .retry("insert entity", || self.store.insert_entity(entity))
            .await?;
        if let EntityInsert::Existing(id) = &outcome {
            self.retry("update entity", || self.store.update_entity(id, entity))
                .await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, DataType, ExtractionType};
    use crate::repository::MemoryStore;

    fn rules() -> Arc<CompiledRules> {
        CompiledRules::builtin().unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry_base_delay_ms: 1,
            ..PipelineConfig::default()
        }
    }

    fn scope() -> PageScope {
        PageScope {
            source_url: "https://archive.example/vol812.pdf".to_string(),
            volume_id: "812".to_string(),
            page_number: 47,
            ocr_service: OcrService::Vision,
            ocr_confidence: 0.6,
            ocr_text_length: 400,
            human_headers: false,
            method: "table_parser",
        }
    }

    fn columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new(1, "Name", DataType::EnslavedName),
            ColumnDefinition::new(2, "Age", DataType::Age),
        ]
    }

    fn unit(index: usize, text: &str, parsed: bool) -> EmitUnit {
        let row = parsed.then(|| {
            let mut parts = text.split("  ");
            let cells = vec![
                Cell {
                    header: "Name".to_string(),
                    value: parts.next().unwrap_or_default().trim().to_string(),
                },
                Cell {
                    header: "Age".to_string(),
                    value: parts.next().unwrap_or_default().trim().to_string(),
                },
            ];
            Row::new(index, cells, text, ExtractionType::Table)
        });
        EmitUnit {
            row_index: index,
            raw_text: text.to_string(),
            row,
        }
    }

    fn request(units: Vec<EmitUnit>, owners: Vec<String>) -> EmitRequest {
        EmitRequest {
            scope: scope(),
            units,
            columns: columns(),
            supplementary: Vec::new(),
            relationships: Vec::new(),
            owner_candidates: owners,
        }
    }

    #[tokio::test]
    async fn test_every_row_is_named_or_placeholder() {
        let store = Arc::new(MemoryStore::new());
        let emitter = RowEmitter::new(store.clone(), rules(), &config());
        let units = vec![
            unit(0, "Hannah Brown  24", true),
            unit(1, "vlr;q  8k", true),
            unit(2, "x1 ~~ 3", false),
        ];
        let report = emitter
            .emit(request(units, vec!["John Hall".to_string()]))
            .await
            .unwrap();
        let c = &report.coverage;
        assert_eq!(c.detected_rows, 3);
        assert_eq!(c.named_persons, 1);
        assert_eq!(c.placeholder_persons, 2);
        assert_eq!(c.emitted_persons, 3);
        assert_eq!(c.owner_assigned.as_deref(), Some("John Hall"));
        assert!(c.is_consistent());

        let entities = store.entities_for_source(&scope().source_url).await.unwrap();
        assert!(entities
            .iter()
            .any(|e| e.full_name == "Unknown Enslaved Person (Vol 812 p.47 row 3)"
                && e.confidence == PLACEHOLDER_CONFIDENCE));
        let hannah = entities.iter().find(|e| e.full_name == "Hannah Brown").unwrap();
        assert_eq!(hannah.age.as_deref(), Some("24"));
        assert_eq!(hannah.relationships.as_ref().unwrap()["owner"], "John Hall");
    }

    #[tokio::test]
    async fn test_unparsed_line_with_legible_name_is_named() {
        let store = Arc::new(MemoryStore::new());
        let emitter = RowEmitter::new(store.clone(), rules(), &config());
        let units = vec![unit(4, "Hannah Brown", false), unit(5, "rn6~vv;q42x", false)];
        let report = emitter
            .emit(request(units, vec!["John Hall".to_string()]))
            .await
            .unwrap();
        assert_eq!(report.coverage.named_persons, 1);
        assert_eq!(report.coverage.placeholder_persons, 1);

        let entities = store.entities_for_source(&scope().source_url).await.unwrap();
        let hannah = entities.iter().find(|e| e.full_name == "Hannah Brown").unwrap();
        assert_eq!(hannah.extraction_method, LINE_TOKEN_METHOD);
        assert_eq!(hannah.context_text, "Hannah Brown");
        assert_eq!(hannah.confidence, scope().ocr_confidence);
        assert_eq!(hannah.relationships.as_ref().unwrap()["owner"], "John Hall");
    }

    #[tokio::test]
    async fn test_second_pass_emits_nothing_new() {
        let store = Arc::new(MemoryStore::new());
        let emitter = RowEmitter::new(store.clone(), rules(), &config());
        let units = || vec![unit(0, "Hannah Brown  24", true), unit(1, "zzq  9", true)];

        emitter.emit(request(units(), vec![])).await.unwrap();
        let before = store.entity_count().await;
        let report = emitter.emit(request(units(), vec![])).await.unwrap();

        assert_eq!(report.coverage.emitted_persons, 0);
        assert_eq!(report.skipped_rows, 2);
        assert_eq!(store.entity_count().await, before);
        assert_eq!(store.row_log_count(&scope().source_url).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_owner_is_a_warning_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let emitter = RowEmitter::new(store, rules(), &config());
        let report = emitter
            .emit(request(vec![unit(0, "Hannah Brown  24", true)], vec![]))
            .await
            .unwrap();
        assert!(report.coverage.owner_assigned.is_none());
        assert!(report.coverage.owner_warning.is_some());
        assert!(report.coverage.is_consistent());
    }

    #[tokio::test]
    async fn test_owner_fallback_skips_current_method() {
        let store = Arc::new(MemoryStore::new());
        for (name, method) in [("Ann Dorsey", "table_parser"), ("John Hall", "narrative_extractor")] {
            store
                .insert_entity(&EntityRecord::new(
                    name,
                    PersonType::Slaveholder,
                    scope().source_url,
                    method,
                ))
                .await
                .unwrap();
        }
        let emitter = RowEmitter::new(store, rules(), &config());
        let report = emitter
            .emit(request(vec![unit(0, "Hannah Brown  24", true)], vec![]))
            .await
            .unwrap();
        assert_eq!(report.coverage.owner_candidates, vec!["John Hall"]);
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_writes(2);
        let emitter = RowEmitter::new(store.clone(), rules(), &config());
        let report = emitter
            .emit(request(vec![unit(0, "Hannah Brown  24", true)], vec!["John Hall".into()]))
            .await
            .unwrap();
        assert_eq!(report.coverage.emitted_persons, 1);
        assert!(store.coverage("812", 47).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_page_writes_zero_coverage() {
        let store = Arc::new(MemoryStore::new());
        let emitter = RowEmitter::new(store.clone(), rules(), &config());
        let report = emitter.emit(request(vec![], vec![])).await.unwrap();
        assert_eq!(report.coverage.detected_rows, 0);
        assert!(report.coverage.owner_warning.is_none());
        let stored = store.coverage("812", 47).await.unwrap().unwrap();
        assert_eq!(stored.emitted_persons, 0);
    }

    #[test]
    fn test_plan_units_skips_headers_and_pairs_rows() {
        let lines = vec![
            SourceLine::new(0, "Name  Age"),
            SourceLine::new(1, "Tom  30"),
            SourceLine::new(2, "~~~ smudge"),
        ];
        let rows = vec![unit(1, "Tom  30", true).row.unwrap()];
        let units = plan_units(&lines, &[0], &rows);
        assert_eq!(units.len(), 2);
        assert!(units[0].row.is_some());
        assert!(units[1].row.is_none());
    }

    #[test]
    fn test_owner_labels_in_order() {
        let text = "Petitioner: John Smith\nno.  Name\nBy whom owned: Mary Ann Hall.\nOwner: John Smith";
        let owners = owner_candidates_from_text(text, &rules());
        assert_eq!(owners, vec!["John Smith", "Mary Ann Hall"]);
    }
}
