//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use reclaim::config::{OcrConfig, PipelineConfig};
use reclaim::fetcher::{FetchError, FetchStrategy, Fetcher, UploadStrategy};
use reclaim::job::JobController;
use reclaim::models::{
    ArchiveHints, ContentBuffer, ExtractionRequest, FetchMethod, SourceReference, SourceRequest,
};
use reclaim::ocr::{OcrEngine, OcrError, PdfRasterizer, Recognized, VisionService};
use reclaim::repository::MemoryStore;
use reclaim::rules::CompiledRules;

/// Hands back fixed bytes for every URL request.
pub struct StaticSource {
    pub method: FetchMethod,
    pub bytes: Vec<u8>,
    pub mime: Option<&'static str>,
}

#[async_trait]
impl FetchStrategy for StaticSource {
    fn method(&self) -> FetchMethod {
        self.method
    }

    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::Url(_))
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        Ok(ContentBuffer::new(
            self.bytes.clone(),
            self.mime,
            self.method,
            request.source_url(),
        ))
    }
}

/// Always answers with a status code.
pub struct RefusingSource(pub FetchMethod, pub u16);

#[async_trait]
impl FetchStrategy for RefusingSource {
    fn method(&self) -> FetchMethod {
        self.0
    }

    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::Url(_))
    }

    async fn fetch(&self, _request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        Err(FetchError::Status(self.1))
    }
}

/// Vision stand-in returning a canned transcription.
pub struct CannedVision {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
impl VisionService for CannedVision {
    fn name(&self) -> &'static str {
        "canned-vision"
    }

    async fn recognize(&self, _image: &[u8], _language: &str) -> Result<Recognized, OcrError> {
        let units = self.text.split_whitespace().count();
        Ok(Recognized::new(self.text.clone(), self.confidence, units))
    }
}

/// No poppler on the test machine.
pub struct NoPdfTools;

#[async_trait]
impl PdfRasterizer for NoPdfTools {
    async fn page_count(&self, _pdf: &[u8]) -> Option<u32> {
        None
    }

    async fn extract_text(&self, _pdf: &[u8], _first: u32, _last: u32) -> Result<Vec<String>, OcrError> {
        Err(OcrError::BackendNotAvailable("pdftotext".to_string()))
    }

    async fn rasterize(&self, _pdf: &[u8], _page: u32) -> Result<Vec<u8>, OcrError> {
        Err(OcrError::BackendNotAvailable("pdftoppm".to_string()))
    }
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        retry_base_delay_ms: 1,
        ..PipelineConfig::default()
    }
}

pub fn ocr_engine(vision: Option<CannedVision>) -> OcrEngine {
    let engine = OcrEngine::new(OcrConfig::default(), Arc::new(NoPdfTools));
    match vision {
        Some(v) => engine.with_vision(Arc::new(v)),
        None => engine,
    }
}

pub fn controller(store: Arc<MemoryStore>, fetcher: Fetcher, ocr: OcrEngine) -> JobController {
    JobController::new(
        store,
        Arc::new(fetcher),
        Arc::new(ocr),
        CompiledRules::builtin().unwrap(),
        &pipeline_config(),
    )
}

/// Controller that reads uploaded files only.
pub fn upload_controller(store: Arc<MemoryStore>) -> JobController {
    controller(
        store,
        Fetcher::new(vec![Arc::new(UploadStrategy)]),
        ocr_engine(None),
    )
}

pub fn text_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

pub fn file_request(path: &Path, volume: &str, page: u32) -> ExtractionRequest {
    ExtractionRequest::new(
        SourceRequest::new(SourceReference::File(path.to_path_buf())).with_hints(hints(volume, page)),
    )
}

pub fn url_request(url: &str, volume: &str, page: u32) -> ExtractionRequest {
    ExtractionRequest::new(
        SourceRequest::new(SourceReference::Url(url.to_string())).with_hints(hints(volume, page)),
    )
}

fn hints(volume: &str, page: u32) -> ArchiveHints {
    ArchiveHints {
        volume_id: Some(volume.to_string()),
        page_number: Some(page),
        ..ArchiveHints::default()
    }
}
