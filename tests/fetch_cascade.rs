//! Fetch cascade against a local archive server.

mod common;

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use reclaim::config::FetchConfig;
use reclaim::fetcher::Fetcher;
use reclaim::job::CancelToken;
use reclaim::models::{AccessMode, FetchMethod, JobStatus, SourceReference, SourceRequest};
use reclaim::repository::{MemoryStore, ProvenanceStore};

use common::*;

const SCHEDULE: &str = "\
By whom owned: Thomas Addison
Caesar   Male   30
Hannah   Female   24
Daniel   Male   9
";

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << >>\n%%EOF\n";

/// Refuses anything that announces itself as the pipeline.
async fn schedule(headers: HeaderMap) -> Response {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if agent.starts_with("reclaim/") {
        return (StatusCode::FORBIDDEN, "automated access denied").into_response();
    }
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], SCHEDULE).into_response()
}

async fn viewer() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html")],
        r#"<html><body><a href="/about">About</a><a href="/files/vol812.pdf">Download PDF</a></body></html>"#,
    )
        .into_response()
}

async fn pdf() -> Response {
    ([(header::CONTENT_TYPE, "application/pdf")], PDF).into_response()
}

async fn serve() -> String {
    let app = Router::new()
        .route("/schedules/812-47", get(schedule))
        .route("/viewer/812", get(viewer))
        .route("/files/vol812.pdf", get(pdf));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fetch_config() -> FetchConfig {
    FetchConfig {
        min_delay_ms: 0,
        max_delay_ms: 0,
        request_timeout_secs: 10,
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn test_refused_polite_request_falls_back_to_browser_mimic() {
    let base = serve().await;
    let store = Arc::new(MemoryStore::new());
    let fetcher = Fetcher::from_config(&fetch_config()).unwrap();
    let controller = controller(store.clone(), fetcher, ocr_engine(None));

    let url = format!("{}/schedules/812-47", base);
    let job = controller
        .submit(url_request(&url, "812", 47))
        .await
        .unwrap();
    let job = controller.run(&job.id, &CancelToken::never()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let fetch_log: Vec<&str> = job
        .debug_log
        .iter()
        .filter(|e| e.stage == "fetch")
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(fetch_log.len(), 2);
    assert!(fetch_log[0].starts_with("direct_http failed: HTTP 403"));
    assert!(fetch_log[1].starts_with("browser_mimic succeeded"));

    let doc = store.document(&url).await.unwrap();
    assert_eq!(doc.fetch_method, "browser_mimic");

    let coverage = store.coverage("812", 47).await.unwrap().unwrap();
    assert_eq!(coverage.detected_rows, 3);
    assert_eq!(coverage.owner_assigned.as_deref(), Some("Thomas Addison"));
    let entities = store.entities_for_source(&url).await.unwrap();
    assert!(entities.iter().any(|e| e.full_name == "Caesar"));
}

#[tokio::test]
async fn test_pdf_link_archive_resolves_viewer_page() {
    let base = serve().await;
    let fetcher = Fetcher::from_config(&fetch_config()).unwrap();
    let mut request = SourceRequest::new(SourceReference::Url(format!("{}/viewer/812", base)));
    request.hints.access_mode = AccessMode::PdfLink;

    let outcome = fetcher.fetch(&request).await.unwrap();
    assert!(outcome.buffer.is_pdf());
    assert_eq!(outcome.buffer.method(), FetchMethod::PdfLinkExtract);
    assert!(outcome.buffer.final_url().ends_with("/files/vol812.pdf"));

    let methods: Vec<FetchMethod> = outcome.attempts.iter().map(|a| a.method).collect();
    assert_eq!(
        methods,
        vec![
            FetchMethod::DirectHttp,
            FetchMethod::BrowserMimic,
            FetchMethod::PdfLinkExtract
        ]
    );
    assert!(outcome.attempts[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("landing page")));
}

#[tokio::test]
async fn test_missing_document_fails_every_method() {
    let base = serve().await;
    let fetcher = Fetcher::from_config(&fetch_config()).unwrap();
    let request = SourceRequest::new(SourceReference::Url(format!("{}/files/missing.pdf", base)));

    let failure = fetcher.fetch(&request).await.unwrap_err();
    // PDF paths skip link extraction and screenshots.
    assert_eq!(failure.attempts.len(), 2);
    assert!(failure
        .attempts
        .iter()
        .all(|a| a.error.as_deref() == Some("HTTP 404")));
}
