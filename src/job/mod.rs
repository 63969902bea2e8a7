//! Job orchestration.
//!
//! A job moves through fetch, OCR, structure detection, parsing and
//! narrative extraction, arbitration and emission, persisting progress and
//! an append-only debug log at every stage boundary.

mod arbitration;
mod cancel;
mod controller;
mod debug_log;
mod runner;

use thiserror::Error;

pub use arbitration::{
    arbitrate, table_accepted, Arbitration, ArbitrationChoice, ACCEPT_MEAN_CONFIDENCE,
    WELL_FILLED_CELLS, WELL_FILLED_SHARE,
};
pub use cancel::{CancelHandle, CancelToken};
pub use controller::{JobController, JobEvent, LONG_TEXT_CHARS, WEAK_STRUCTURE_CONFIDENCE};
pub use debug_log::DebugLog;
pub use runner::JobRunner;

use crate::fetcher::FetchFailure;
use crate::repository::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error("page {page}: {stage} failed: {source}")]
    Page {
        page: u32,
        stage: &'static str,
        source: StoreError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,
}
