//! Fetch errors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FetchMethod;

/// Why a single fetch method failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Http(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response body")]
    Empty,

    #[error("got a {0} landing page instead of a document")]
    LandingPage(String),

    #[error("no PDF link found on page")]
    NoPdfLink,

    #[error("browser: {0}")]
    Browser(String),

    #[error("not applicable to this source")]
    NotApplicable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Http(format!("timeout: {}", err));
        }
        Self::Http(err.to_string())
    }
}

/// One step of the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub method: FetchMethod,
    /// `None` on success.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FetchAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FetchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(e) => write!(f, "{}: {}", self.method.as_str(), e),
            None => write!(f, "{}: ok", self.method.as_str()),
        }
    }
}

/// Every applicable method failed.
#[derive(Debug, Error)]
#[error("all fetch methods failed for {source_url}: {}", summary(.attempts))]
pub struct FetchFailure {
    pub source_url: String,
    pub attempts: Vec<FetchAttempt>,
}

fn summary(attempts: &[FetchAttempt]) -> String {
    if attempts.is_empty() {
        return "no method applied".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
