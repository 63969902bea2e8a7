//! The extraction job: fetch, OCR, detect, parse or extract, arbitrate, emit.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::arbitration::{arbitrate, table_accepted, Arbitration};
use super::cancel::CancelToken;
use super::debug_log::DebugLog;
use super::JobError;
use crate::config::PipelineConfig;
use crate::emitter::{
    narrative_entity, narrative_role, narrative_units, owner_candidates_from_text,
    owner_entities, plan_units, EmitReport, EmitRequest, PageScope, RowEmitter,
};
use crate::fetcher::{FetchAttempt, Fetcher};
use crate::models::{
    mean_confidence, progress, AccessMode, ColumnDefinition, ContentBuffer, ContentStructure,
    ExtractionJob, ExtractionRequest, JobStatus, OcrResult, OcrService, PersonType, Row,
    StructureKind,
};
use crate::narrative::{NarrativeExtractor, NarrativeResult, RegexNerBackend};
use crate::ocr::OcrEngine;
use crate::parsing::{ParseOutput, SourceLine, StructureDetector, TableParser};
use crate::repository::{with_retry, DocumentRecord, ProvenanceStore, StoreError};
use crate::rules::CompiledRules;

/// Pages at least this long with no declared columns and a weak structure
/// guess also go through the narrative extractor.
pub const LONG_TEXT_CHARS: usize = 500;
/// Detection confidence at or below which structure is considered a guess.
pub const WEAK_STRUCTURE_CONFIDENCE: f64 = 0.5;

/// Progress notifications for a UI.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress {
        job_id: String,
        progress: u8,
        message: String,
    },
    /// Recorded in the debug log and coverage; the job carries on.
    Warning { job_id: String, message: String },
    Finished {
        job_id: String,
        status: JobStatus,
        message: String,
    },
}

/// One page of OCR output handed to detection.
struct PageText {
    page_number: u32,
    text: String,
    confidence: f64,
    service: OcrService,
}

/// How `execute` left the job when it did not fail.
enum Settled {
    Completed(String),
    /// Parked until a person supplies the document.
    Awaiting(JobStatus, String),
}

struct PageOutcome {
    rows: Vec<Row>,
    report: EmitReport,
}

pub struct JobController {
    store: Arc<dyn ProvenanceStore>,
    fetcher: Arc<Fetcher>,
    ocr: Arc<OcrEngine>,
    rules: Arc<CompiledRules>,
    detector: StructureDetector,
    parser: TableParser,
    narrative: NarrativeExtractor,
    emitter: RowEmitter,
    config: PipelineConfig,
    events: Option<mpsc::Sender<JobEvent>>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn ProvenanceStore>,
        fetcher: Arc<Fetcher>,
        ocr: Arc<OcrEngine>,
        rules: Arc<CompiledRules>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            detector: StructureDetector::new(rules.clone()),
            parser: TableParser::new(rules.clone()),
            narrative: NarrativeExtractor::new(rules.clone())
                .with_ner(Arc::new(RegexNerBackend::new())),
            emitter: RowEmitter::new(store.clone(), rules.clone(), config),
            store,
            fetcher,
            ocr,
            rules,
            config: config.clone(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn ProvenanceStore> {
        &self.store
    }

    /// Create a pending job for `request`.
    pub async fn submit(&self, request: ExtractionRequest) -> Result<ExtractionJob, JobError> {
        let mut job = ExtractionJob::new(request);
        job.advance(progress::QUEUED, "queued");
        self.save(&job).await?;
        info!("Queued job {} for {}", job.id, job.request.source.source_url());
        Ok(job)
    }

    pub async fn status(&self, job_id: &str) -> Result<ExtractionJob, JobError> {
        self.store
            .load_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Run a job to a terminal status. The job row reflects the outcome
    /// either way; the error is returned as well so callers can report it.
    pub async fn run(&self, job_id: &str, cancel: &CancelToken) -> Result<ExtractionJob, JobError> {
        let mut job = self.status(job_id).await?;
        let mut log = DebugLog::resume(&job.id, std::mem::take(&mut job.debug_log));

        job.status = JobStatus::Processing;
        log.record("start", format!("rule set version {}", self.rules.version));

        match self.execute(&mut job, &mut log, cancel).await {
            Ok(settled) => {
                let (status, message) = match settled {
                    Settled::Completed(summary) => {
                        log.record("complete", summary.clone());
                        (JobStatus::Completed, summary)
                    }
                    Settled::Awaiting(status, reason) => {
                        log.record(status.as_str(), reason.clone());
                        (status, reason)
                    }
                };
                job.debug_log = log.entries().to_vec();
                job.finish(status, message.clone());
                self.save(&job).await?;
                self.notify(JobEvent::Finished {
                    job_id: job.id.clone(),
                    status,
                    message,
                })
                .await;
                Ok(job)
            }
            Err(err) => {
                let message = err.to_string();
                log.record("failed", message.clone());
                job.debug_log = log.entries().to_vec();
                job.finish(JobStatus::Failed, message.clone());
                if let Err(e) = self.save(&job).await {
                    warn!("Could not persist failed job {}: {}", job.id, e);
                    self.save_debug_log(&job.id, &log).await;
                }
                self.notify(JobEvent::Finished {
                    job_id: job.id.clone(),
                    status: JobStatus::Failed,
                    message,
                })
                .await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        job: &mut ExtractionJob,
        log: &mut DebugLog,
        cancel: &CancelToken,
    ) -> Result<Settled, JobError> {
        let request = job.request.clone();
        let source = &request.source;
        let source_url = source.source_url();

        self.checkpoint(job, log, progress::FETCHING, "fetching").await?;
        check_cancel(cancel)?;

        let outcome = match self.fetcher.fetch(source).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                for attempt in &failure.attempts {
                    log.record("fetch", describe_attempt(attempt));
                }
                if matches!(
                    source.hints.access_mode,
                    AccessMode::AuthRequired | AccessMode::Protected
                ) {
                    return Ok(Settled::Awaiting(
                        JobStatus::AwaitingUpload,
                        format!("upload required: {}", failure),
                    ));
                }
                return Err(failure.into());
            }
        };
        for attempt in &outcome.attempts {
            log.record("fetch", describe_attempt(attempt));
        }
        let buffer = outcome.buffer;
        self.checkpoint(
            job,
            log,
            progress::FETCHED,
            format!("fetched {} bytes via {}", buffer.len(), buffer.method()),
        )
        .await?;
        check_cancel(cancel)?;

        let ocr = self.ocr.ocr(&buffer, &request.ocr).await;
        log.record_with(
            "ocr",
            format!(
                "{} chars from {} at {:.2} over {} page(s)",
                ocr.text.chars().count(),
                ocr.service.as_str(),
                ocr.confidence,
                ocr.page_count
            ),
            serde_json::json!({
                "service": ocr.service.as_str(),
                "confidence": ocr.confidence,
                "pages": ocr.page_count,
            }),
        );
        if let Some(error) = &ocr.error {
            log.record("ocr", format!("OCR produced no text: {}", error));
        }
        job.raw_ocr_text = Some(ocr.text.clone());

        let document = document_record(&source_url, &buffer, ocr.page_count);
        with_retry(
            "upsert document",
            self.config.store_retry_attempts,
            self.config.retry_base_delay(),
            || self.store.upsert_document(&document),
        )
        .await?;
        self.checkpoint(job, log, progress::OCR_DONE, "text recognized").await?;
        check_cancel(cancel)?;

        let mut all_rows = Vec::new();
        let mut named = 0;
        let mut placeholders = 0;
        for page in split_pages(&ocr, source.page_number()) {
            check_cancel(cancel)?;
            let outcome = self.process_page(job, log, &request, page).await?;
            named += outcome.report.coverage.named_persons;
            placeholders += outcome.report.coverage.placeholder_persons;
            all_rows.extend(outcome.rows);
            self.save_debug_log(&job.id, log).await;
        }

        job.row_count = all_rows.len();
        job.avg_confidence = mean_confidence(&all_rows);
        job.parsed_rows = all_rows;
        self.checkpoint(job, log, progress::EMITTED, "rows emitted").await?;

        Ok(Settled::Completed(format!(
            "{} rows, {} named, {} placeholders",
            job.row_count, named, placeholders
        )))
    }

    async fn process_page(
        &self,
        job: &mut ExtractionJob,
        log: &mut DebugLog,
        request: &ExtractionRequest,
        page: PageText,
    ) -> Result<PageOutcome, JobError> {
        let hint = request.structure.clone().unwrap_or_default();
        let declared = hint.ordered_columns();
        let text = page.text.as_str();
        let stage_page = format!("p.{}", page.page_number);

        let detection = self.detector.detect(text, &declared, hint.layout);
        let structure = &detection.structure;
        log.record(
            "detect",
            format!(
                "{}: {} ({:.2}) over {} ink lines",
                stage_page,
                structure.kind.as_str(),
                structure.confidence,
                detection.lines.len()
            ),
        );
        self.checkpoint(job, log, progress::DETECTED, "structure detected")
            .await?;

        let parsed = if structure.is_tabular() {
            self.parser.parse(&detection.lines, &declared, structure)
        } else {
            ParseOutput {
                columns: declared.clone(),
                ..ParseOutput::default()
            }
        };
        for (class, count) in parsed.malformed_classes() {
            log.record(
                "parse",
                format!("{}: dropped {} malformed line(s): {}", stage_page, count, class),
            );
        }
        log.record(
            "parse",
            format!(
                "{}: {} rows, {} lines skipped",
                stage_page,
                parsed.rows.len(),
                parsed.skipped.len()
            ),
        );
        if parsed.rows.is_empty() && !text.trim().is_empty() && !declared.is_empty() {
            log.record(
                "parse",
                format!(
                    "{}: no rows parsed: {}",
                    stage_page,
                    no_rows_reason(detection.lines.len(), structure.kind)
                ),
            );
        }
        self.checkpoint(job, log, progress::PARSED, "rows parsed").await?;

        let long_weak_guess = declared.is_empty()
            && text.trim().len() >= LONG_TEXT_CHARS
            && structure.confidence <= WEAK_STRUCTURE_CONFIDENCE;
        let run_narrative = !text.trim().is_empty()
            && (!structure.is_tabular() || !table_accepted(&parsed.rows) || long_weak_guess);
        let narrative = run_narrative.then(|| self.narrative.extract(text, &request.target_names));
        if let Some(n) = &narrative {
            log.record_with(
                "narrative",
                format!(
                    "{}: {} slaveholders, {} enslaved, {} transactions, confidence {:.2}",
                    stage_page,
                    n.slaveholders.len(),
                    n.enslaved.len(),
                    n.transactions.len(),
                    n.confidence
                ),
                serde_json::json!({
                    "relevant_sentences": n.statistics.relevant_sentences,
                    "slave_count_total": n.statistics.slave_count_total,
                    "target_mentions": n.target_mentions.len(),
                }),
            );
        }

        let arbitration = arbitrate(parsed.rows.clone(), narrative.as_ref());
        log.record(
            "arbitrate",
            format!(
                "{}: {} (table {:.2}, narrative {:.2})",
                stage_page,
                arbitration.choice.as_str(),
                arbitration.table_confidence,
                arbitration.narrative_confidence
            ),
        );
        self.checkpoint(job, log, progress::ARBITRATED, "rows arbitrated")
            .await?;

        // Every ink line of a tabular page is a unit, whatever arbitration kept.
        let ink_lines: &[SourceLine] = if structure.is_tabular() {
            &detection.lines
        } else {
            &[]
        };
        let emit = self.emit_request(
            request,
            &page,
            &hint,
            ink_lines,
            &parsed,
            &arbitration,
            narrative.as_ref(),
        );
        let report = self
            .emitter
            .emit(emit)
            .await
            .map_err(|source| JobError::Page {
                page: page.page_number,
                stage: "emit",
                source,
            })?;
        let coverage = &report.coverage;
        log.record_with(
            "emit",
            format!(
                "{}: {} detected, {} named, {} placeholders, {} new",
                stage_page,
                coverage.detected_rows,
                coverage.named_persons,
                coverage.placeholder_persons,
                coverage.emitted_persons
            ),
            serde_json::json!({
                "owner_assigned": coverage.owner_assigned,
                "owner_candidates": coverage.owner_candidates,
                "skipped_rows": report.skipped_rows,
                "updated_entities": report.updated_entities,
                "relationships": report.relationships_written,
            }),
        );
        if let Some(warning) = &coverage.owner_warning {
            log.record("owner", warning.clone());
            self.notify(JobEvent::Warning {
                job_id: job.id.clone(),
                message: warning.clone(),
            })
            .await;
        }

        Ok(PageOutcome {
            rows: arbitration.rows(),
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_request(
        &self,
        request: &ExtractionRequest,
        page: &PageText,
        hint: &ContentStructure,
        lines: &[SourceLine],
        parsed: &ParseOutput,
        arbitration: &Arbitration,
        narrative: Option<&NarrativeResult>,
    ) -> EmitRequest {
        let source_url = request.source.source_url();
        let headers = parsed.header_indices();
        let table = &arbitration.table_rows;

        // Lines whose table row arbitration dropped, or that no parser
        // understood, carry no row and fall back to their name token.
        let mut units = plan_units(lines, &headers, table);
        let mut narrative_part = narrative_units(&arbitration.narrative_rows);
        if arbitration.choice.narrative_leads() {
            narrative_part.append(&mut units);
            units = narrative_part;
        } else {
            units.append(&mut narrative_part);
        }

        let columns: Vec<ColumnDefinition> = parsed.columns.clone();
        let mut supplementary: Vec<_> = narrative
            .map(|n| {
                n.to_rows()
                    .iter()
                    .filter(|r| narrative_role(r) != Some(PersonType::Enslaved))
                    .map(|r| narrative_entity(r, &source_url))
                    .collect()
            })
            .unwrap_or_default();
        supplementary.extend(owner_entities(table, &columns, &source_url, &self.rules));

        let method = if arbitration.choice.narrative_leads() {
            "narrative_extractor"
        } else if table
            .first()
            .is_some_and(|r| r.extraction_type.extraction_method() == "fixed_width_parser")
        {
            "fixed_width_parser"
        } else {
            "table_parser"
        };

        EmitRequest {
            scope: PageScope {
                source_url: source_url.clone(),
                volume_id: request.source.volume_id(),
                page_number: page.page_number,
                ocr_service: page.service,
                ocr_confidence: page.confidence,
                ocr_text_length: page.text.chars().count(),
                human_headers: hint.has_human_headers(),
                method,
            },
            units,
            columns,
            supplementary,
            relationships: narrative.map(|n| n.relationships.clone()).unwrap_or_default(),
            owner_candidates: owner_candidates_from_text(&page.text, &self.rules),
        }
    }

    async fn checkpoint(
        &self,
        job: &mut ExtractionJob,
        log: &DebugLog,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        job.advance(progress, message);
        job.debug_log = log.entries().to_vec();
        self.save(job).await?;
        self.notify(JobEvent::Progress {
            job_id: job.id.clone(),
            progress: job.progress,
            message: job.status_message.clone(),
        })
        .await;
        Ok(())
    }

    async fn save(&self, job: &ExtractionJob) -> Result<(), StoreError> {
        with_retry(
            "save job",
            self.config.store_retry_attempts,
            self.config.retry_base_delay(),
            || self.store.save_job(job),
        )
        .await
    }

    /// Debug-log persistence never fails the job.
    async fn save_debug_log(&self, job_id: &str, log: &DebugLog) {
        if let Err(e) = self.store.save_debug_log(job_id, log.entries()).await {
            warn!("Could not persist debug log for job {}: {}", job_id, e);
        }
    }

    async fn notify(&self, event: JobEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

fn check_cancel(cancel: &CancelToken) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    Ok(())
}

fn describe_attempt(attempt: &FetchAttempt) -> String {
    match &attempt.error {
        Some(e) => format!("{} failed: {} ({} ms)", attempt.method, e, attempt.elapsed_ms),
        None => format!("{} succeeded ({} ms)", attempt.method, attempt.elapsed_ms),
    }
}

fn no_rows_reason(ink_lines: usize, kind: StructureKind) -> &'static str {
    if ink_lines == 0 {
        "every line was noise or a header"
    } else if kind == StructureKind::Narrative {
        "text reads as prose; left to the narrative extractor"
    } else {
        "every line was skipped as malformed"
    }
}

/// Pages to process: the per-page annotations of a multi-page result, or
/// the whole text as the request's page.
fn split_pages(ocr: &OcrResult, default_page: u32) -> Vec<PageText> {
    if ocr.pages.len() > 1 {
        return ocr
            .pages
            .iter()
            .map(|p| PageText {
                page_number: p.page,
                text: p.text.clone(),
                confidence: p.confidence,
                service: p.service,
            })
            .collect();
    }
    vec![PageText {
        page_number: default_page,
        text: ocr.text.clone(),
        confidence: ocr.confidence,
        service: ocr.service,
    }]
}

fn document_record(source_url: &str, buffer: &ContentBuffer, page_count: u32) -> DocumentRecord {
    DocumentRecord {
        source_url: source_url.to_string(),
        final_url: buffer.final_url().to_string(),
        mime_type: buffer.mime().to_string(),
        fetch_method: buffer.method().as_str().to_string(),
        content_hash: hex::encode(Sha256::digest(buffer.bytes())),
        size_bytes: buffer.len() as u64,
        page_count,
        fetched_at: Utc::now(),
    }
}
