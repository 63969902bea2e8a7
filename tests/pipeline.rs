//! End-to-end extraction jobs against the in-memory store.

mod common;

use std::sync::Arc;

use reclaim::fetcher::Fetcher;
use reclaim::job::{CancelHandle, CancelToken, JobError, JobRunner};
use reclaim::models::{
    progress, AccessMode, ColumnDefinition, ContentStructure, DataType, ExtractionType,
    FetchMethod, JobStatus, Layout, PersonType, RelationshipKind,
};
use reclaim::repository::{MemoryStore, ProvenanceStore};

use common::*;

const COMPENSATION_PAGE: &str = "\
Petitioner: John Smith
no.   Name   Sex   Age   Color   Value   Particular description
1.    Jacob Washington    Male    40.    black    500:–    field hand
2.   Harriet Brown   Female   35.   dark   400:–   cook
3.     Sam Brown     Male     12.     black     250:–     her son
4.  Elizabeth Jones  Female  28.  mulatto  450:–  seamstress
5.      Patsy Jones      \"      30.      black      450:–      seamstress
6.    Moses Carter    Male    55.    dark    150:–    old and infirm
7.   Rachel Carter   Female   50.   black   150:–   his wife
8.    Lucy Washington    Female    24.    black    300:–    mother of Clara
9.    Clara Washington    \"    2.    light brown    100:–    her child
10.  Ned Stewart  Male  19.  brown  500:–  ostler
11.     Abram Hall     Male     45.     black     350:–     blacksmith
";

const MARSHAM: &str = "Richard Marsham owned 36 slaves at his death in 1713. \
                       He freed mulatto Robin, Nanny, and Daniel in his will.";

fn compensation_structure() -> ContentStructure {
    ContentStructure {
        columns: vec![
            ColumnDefinition::new(1, "no.", DataType::Unknown),
            ColumnDefinition::new(2, "Name", DataType::EnslavedName),
            ColumnDefinition::new(3, "Sex", DataType::Gender),
            ColumnDefinition::new(4, "Age", DataType::Age),
            ColumnDefinition::new(5, "Color", DataType::Unknown),
            ColumnDefinition::new(6, "Value", DataType::Compensation),
            ColumnDefinition::new(7, "Particular description", DataType::Remarks),
        ],
        layout: Layout::Table,
        ..ContentStructure::default()
    }
}

/// 32 ink rows of which only three read as names.
fn handwritten_transcription() -> String {
    (1..=32)
        .map(|row| match row {
            5 => "Hannah Brown".to_string(),
            17 => "Moses Carter".to_string(),
            29 => "Phillis Grant".to_string(),
            n => format!("rn{}~vv;q{}x", n, n * 7),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_compensation_schedule_with_declared_columns() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(COMPENSATION_PAGE);
    let mut request = file_request(file.path(), "T71-1", 3);
    request.structure = Some(compensation_structure());

    let job = controller.submit(request).await.unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, progress::DONE);
    assert_eq!(job.row_count, 11);
    assert_eq!(job.parsed_rows[8].get("Name"), Some("Clara Washington"));
    assert_eq!(job.parsed_rows[8].get("Sex"), Some("Female"));
    assert_eq!(job.parsed_rows[4].get("Sex"), Some("Female"));

    let coverage = store.coverage("T71-1", 3).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 11);
    assert_eq!(coverage.named_persons, 11);
    assert_eq!(coverage.placeholder_persons, 0);
    assert_eq!(coverage.emitted_persons, 11);
    assert_eq!(coverage.owner_assigned.as_deref(), Some("John Smith"));
    assert!(coverage.owner_warning.is_none());
    assert!(coverage.is_consistent());

    let entities = store
        .entities_for_source(&job.request.source.source_url())
        .await
        .unwrap();
    assert_eq!(entities.len(), 11);
    assert!(entities.iter().all(|e| e.person_type == PersonType::Enslaved));
    assert!(entities.iter().all(|e| e.extraction_method == "table_parser"));
    let clara = entities
        .iter()
        .find(|e| e.full_name == "Clara Washington")
        .unwrap();
    assert_eq!(clara.gender.as_deref(), Some("female"));

    let stages: Vec<&str> = job.debug_log.iter().map(|e| e.stage.as_str()).collect();
    for stage in ["fetch", "ocr", "detect", "parse", "arbitrate", "emit"] {
        assert!(stages.contains(&stage), "missing {} entry", stage);
    }
    assert!(!stages.contains(&"narrative"));
}

#[tokio::test]
async fn test_handwritten_page_yields_placeholders_for_garbage() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Fetcher::new(vec![Arc::new(StaticSource {
        method: FetchMethod::DirectHttp,
        bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0],
        mime: Some("image/png"),
    })]);
    let vision = CannedVision {
        text: handwritten_transcription(),
        confidence: 0.41,
    };
    let controller = controller(store.clone(), fetcher, ocr_engine(Some(vision)));

    let request = url_request("https://archive.test/vol812/p47.png", "812", 47);
    let job = controller.submit(request).await.unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let coverage = store.coverage("812", 47).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 32);
    assert_eq!(coverage.named_persons, 3);
    assert_eq!(coverage.placeholder_persons, 29);
    assert!(coverage.owner_assigned.is_none());
    assert!(coverage.owner_warning.is_some());
    assert!(coverage.is_consistent());

    let entities = store
        .entities_for_source("https://archive.test/vol812/p47.png")
        .await
        .unwrap();
    let names: Vec<&str> = entities.iter().map(|e| e.full_name.as_str()).collect();
    assert!(names.contains(&"Hannah Brown"));
    assert!(names.contains(&"Unknown Enslaved Person (Vol 812 p.47 row 1)"));
    assert!(names.contains(&"Unknown Enslaved Person (Vol 812 p.47 row 32)"));
    assert!(!names.contains(&"Unknown Enslaved Person (Vol 812 p.47 row 5)"));
    assert!(entities
        .iter()
        .filter(|e| e.is_placeholder())
        .all(|e| e.confidence == 0.2));

    assert!(job.debug_log.iter().any(|e| e.stage == "owner"));
}

#[tokio::test]
async fn test_unparseable_table_still_yields_a_person_per_line() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let garbage: String = (1..=32)
        .map(|n| format!("rn{}~vv;q{}x", n, n * 7))
        .collect::<Vec<_>>()
        .join("\n");
    let file = text_file(&garbage);
    let mut request = file_request(file.path(), "812", 48);
    request.structure = Some(ContentStructure {
        columns: vec![
            ColumnDefinition::new(1, "Name", DataType::EnslavedName),
            ColumnDefinition::new(2, "Age", DataType::Age),
        ],
        layout: Layout::Table,
        ..ContentStructure::default()
    });

    let job = controller.submit(request).await.unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let coverage = store.coverage("812", 48).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 32);
    assert_eq!(coverage.named_persons, 0);
    assert_eq!(coverage.placeholder_persons, 32);
    assert_eq!(coverage.emitted_persons, 32);
    assert!(coverage.is_consistent());
    assert_eq!(store.entity_count().await, 32);
}

/// Marsham prose above a sparse tab-separated list: 15 rows with two of
/// five columns, then 5 with three.
fn sparse_list_with_prose() -> String {
    const SPARSE: [&str; 15] = [
        "Abram", "Betsey", "Caesar", "Dinah", "Ephraim", "Fanny", "George", "Harriet", "Isaac",
        "Jenny", "Kitty", "Lewis", "Milly", "Nelly", "Oliver",
    ];
    const FILLED: [&str; 5] = ["Peggy", "Quash", "Rose", "Silas", "Tabby"];
    let mut lines = vec![
        "Richard Marsham owned 36 slaves at his death in 1713.".to_string(),
        "He freed mulatto Robin, Nanny, and Daniel in his will.".to_string(),
    ];
    for (i, name) in SPARSE.iter().enumerate() {
        let sex = if i % 2 == 0 { "male" } else { "female" };
        lines.push(format!("{}\t{}", name, sex));
    }
    for (i, name) in FILLED.iter().enumerate() {
        let sex = if i % 2 == 0 { "female" } else { "male" };
        lines.push(format!("{}\t{}\t{}", name, sex, 20 + i));
    }
    lines.join("\n")
}

#[tokio::test]
async fn test_confident_narrative_over_sparse_table_keeps_every_line() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(&sparse_list_with_prose());
    let mut request = file_request(file.path(), "wills-1713", 2);
    request.structure = Some(ContentStructure {
        columns: vec![
            ColumnDefinition::new(1, "Name", DataType::EnslavedName),
            ColumnDefinition::new(2, "Sex", DataType::Gender),
            ColumnDefinition::new(3, "Age", DataType::Age),
            ColumnDefinition::new(4, "Value", DataType::Compensation),
            ColumnDefinition::new(5, "Remarks", DataType::Remarks),
        ],
        layout: Layout::Table,
        ..ContentStructure::default()
    });

    let job = controller.submit(request).await.unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let arbitration = job
        .debug_log
        .iter()
        .find(|e| e.stage == "arbitrate")
        .expect("arbitrate entry");
    assert!(arbitration.message.contains("narrative-over-table"));

    // Narrative rows lead; only the well-filled table rows survive.
    assert_eq!(job.parsed_rows[0].extraction_type, ExtractionType::Narrative);
    let table: Vec<_> = job
        .parsed_rows
        .iter()
        .filter(|r| r.extraction_type == ExtractionType::Table)
        .collect();
    assert_eq!(table.len(), 5);
    assert!(table.iter().all(|r| r.filled_count() >= 3));
    assert_eq!(table[0].get("Name"), Some("Peggy"));

    let narrative_enslaved = job
        .parsed_rows
        .iter()
        .filter(|r| r.extraction_type == ExtractionType::Narrative)
        .filter(|r| r.get("Role") == Some(PersonType::Enslaved.as_str()))
        .count();
    let coverage = store.coverage("wills-1713", 2).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 22 + narrative_enslaved);
    assert_eq!(
        coverage.named_persons + coverage.placeholder_persons,
        coverage.detected_rows
    );
    // The two prose lines are not names.
    assert_eq!(coverage.placeholder_persons, 2);

    let entities = store
        .entities_for_source(&job.request.source.source_url())
        .await
        .unwrap();
    for name in ["Abram", "Oliver", "Peggy", "Tabby", "Robin", "Daniel"] {
        assert!(
            entities.iter().any(|e| e.full_name == name),
            "no record for {}",
            name
        );
    }
}

#[tokio::test]
async fn test_narrative_paragraph() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(MARSHAM);
    let job = controller
        .submit(file_request(file.path(), "wills-1713", 1))
        .await
        .unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let source_url = job.request.source.source_url();
    let entities = store.entities_for_source(&source_url).await.unwrap();
    let holders: Vec<&str> = entities
        .iter()
        .filter(|e| e.person_type == PersonType::Slaveholder)
        .map(|e| e.full_name.as_str())
        .collect();
    assert_eq!(holders, vec!["Richard Marsham"]);
    let mut enslaved: Vec<&str> = entities
        .iter()
        .filter(|e| e.person_type == PersonType::Enslaved)
        .map(|e| e.full_name.as_str())
        .collect();
    enslaved.sort();
    assert_eq!(enslaved, vec!["Daniel", "Nanny", "Robin"]);

    let coverage = store.coverage("wills-1713", 1).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 3);
    assert_eq!(coverage.named_persons, 3);

    let ownership = store
        .relationships_for_source(&source_url)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.kind == RelationshipKind::Ownership)
        .count();
    assert_eq!(ownership, 3);

    let narrative = job
        .debug_log
        .iter()
        .find(|e| e.stage == "narrative")
        .expect("narrative entry");
    assert!(narrative.message.contains("confidence"));
}

#[tokio::test]
async fn test_rerun_creates_no_new_records() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(COMPENSATION_PAGE);
    let mut request = file_request(file.path(), "T71-1", 3);
    request.structure = Some(compensation_structure());

    let first = controller.submit(request.clone()).await.unwrap();
    controller.run(&first.id, &CancelToken::never()).await.unwrap();
    let after_first = store.entity_count().await;
    let logged = store
        .row_log_count(&first.request.source.source_url())
        .await
        .unwrap();

    let second = controller.submit(request).await.unwrap();
    let second = controller.run(&second.id, &CancelToken::never()).await.unwrap();
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(store.entity_count().await, after_first);
    assert_eq!(
        store
            .row_log_count(&second.request.source.source_url())
            .await
            .unwrap(),
        logged
    );

    let coverage = store.coverage("T71-1", 3).await.unwrap().unwrap();
    assert_eq!(coverage.emitted_persons, 0);
    assert_eq!(coverage.detected_rows, 11);
}

#[tokio::test]
async fn test_transient_store_failures_do_not_fail_the_job() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(COMPENSATION_PAGE);
    let mut request = file_request(file.path(), "T71-1", 4);
    request.structure = Some(compensation_structure());

    let job = controller.submit(request).await.unwrap();
    store.fail_next_writes(2);
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(store.entity_count().await, 11);
}

#[tokio::test]
async fn test_document_record_written_after_ocr() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(MARSHAM);
    let job = controller
        .submit(file_request(file.path(), "wills-1713", 1))
        .await
        .unwrap();
    controller.run(&job.id, &CancelToken::never()).await.unwrap();

    let doc = store
        .document(&job.request.source.source_url())
        .await
        .unwrap();
    assert_eq!(doc.fetch_method, "upload");
    assert_eq!(doc.mime_type, "text/plain");
    assert_eq!(doc.size_bytes, MARSHAM.len() as u64);
    assert_eq!(doc.content_hash.len(), 64);
}

#[tokio::test]
async fn test_fetch_failure_marks_job_failed() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Fetcher::new(vec![
        Arc::new(RefusingSource(FetchMethod::DirectHttp, 403)),
        Arc::new(RefusingSource(FetchMethod::BrowserMimic, 403)),
    ]);
    let controller = controller(store.clone(), fetcher, ocr_engine(None));

    let job = controller
        .submit(url_request("https://archive.test/closed.pdf", "9", 1))
        .await
        .unwrap();
    let err = controller
        .run(&job.id, &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Fetch(_)));

    let saved = controller.status(&job.id).await.unwrap();
    assert_eq!(saved.status, JobStatus::Failed);
    assert!(saved.status_message.contains("browser_mimic: HTTP 403"));
    assert!(saved.completed_at.is_some());
    let failures = saved
        .debug_log
        .iter()
        .filter(|e| e.stage == "fetch" && e.message.contains("failed"))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_login_walled_archive_waits_for_upload() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Fetcher::new(vec![
        Arc::new(RefusingSource(FetchMethod::DirectHttp, 401)),
        Arc::new(RefusingSource(FetchMethod::BrowserMimic, 401)),
    ]);
    let controller = controller(store.clone(), fetcher, ocr_engine(None));

    let mut request = url_request("https://archive.test/members/vol3.pdf", "3", 12);
    request.source.hints.access_mode = AccessMode::AuthRequired;
    let job = controller.submit(request).await.unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();

    assert_eq!(job.status, JobStatus::AwaitingUpload);
    assert!(job.status_message.starts_with("upload required"));
    assert!(job.completed_at.is_some());
    assert_eq!(store.entity_count().await, 0);
}

#[tokio::test]
async fn test_blank_page_completes_with_zero_coverage() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file("   \n\n  ");
    let job = controller
        .submit(file_request(file.path(), "812", 3))
        .await
        .unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.row_count, 0);
    assert!(job.parsed_rows.is_empty());

    let coverage = store.coverage("812", 3).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 0);
    assert_eq!(coverage.named_persons, 0);
    assert_eq!(coverage.placeholder_persons, 0);
    assert_eq!(coverage.emitted_persons, 0);
    assert!(coverage.owner_warning.is_none());
    assert_eq!(store.entity_count().await, 0);
}

#[tokio::test]
async fn test_cancelled_job_fails_without_emitting() {
    let store = Arc::new(MemoryStore::new());
    let controller = upload_controller(store.clone());
    let file = text_file(MARSHAM);
    let job = controller
        .submit(file_request(file.path(), "wills-1713", 1))
        .await
        .unwrap();

    let handle = CancelHandle::new();
    let token = handle.token();
    handle.cancel();
    let err = controller.run(&job.id, &token).await.unwrap_err();
    assert!(matches!(err, JobError::Cancelled));

    let saved = controller.status(&job.id).await.unwrap();
    assert_eq!(saved.status, JobStatus::Failed);
    assert_eq!(saved.status_message, "cancelled");
    assert_eq!(store.entity_count().await, 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let controller = upload_controller(Arc::new(MemoryStore::new()));
    let err = controller
        .run("no-such-job", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));
}

#[tokio::test]
async fn test_runner_processes_jobs_concurrently() {
    let store = Arc::new(MemoryStore::new());
    let controller = Arc::new(upload_controller(store.clone()));
    let narrative = text_file(MARSHAM);
    let table = text_file(COMPENSATION_PAGE);
    let mut table_request = file_request(table.path(), "T71-1", 3);
    table_request.structure = Some(compensation_structure());

    let a = controller
        .submit(file_request(narrative.path(), "wills-1713", 1))
        .await
        .unwrap();
    let b = controller.submit(table_request).await.unwrap();

    let runner = JobRunner::new(controller.clone(), 2);
    let results = runner
        .run_many(vec![a.id.clone(), b.id.clone()], CancelToken::never())
        .await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));

    for id in [&a.id, &b.id] {
        let job = controller.status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
    let table_entities = store
        .entities_for_source(&b.request.source.source_url())
        .await
        .unwrap();
    assert_eq!(table_entities.len(), 11);
}
