//! Local files handed to the pipeline.

use async_trait::async_trait;

use super::{FetchError, FetchStrategy};
use crate::models::{ContentBuffer, FetchMethod, SourceReference, SourceRequest};

pub struct UploadStrategy;

#[async_trait]
impl FetchStrategy for UploadStrategy {
    fn method(&self) -> FetchMethod {
        FetchMethod::Upload
    }

    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::File(_))
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        let SourceReference::File(path) = &request.reference else {
            return Err(FetchError::NotApplicable);
        };
        let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = std::path::PathBuf::from(path);
        let bytes = tokio::fs::read(&path).await?;
        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(ContentBuffer::from_file(bytes, &path))
    }
}
