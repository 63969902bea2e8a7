//! Append-only per-job debug log.

use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use crate::models::DebugEntry;

/// Stage entries with elapsed time since the log was opened. Each entry is
/// mirrored to `tracing` at debug level.
#[derive(Debug)]
pub struct DebugLog {
    job_id: String,
    started: Instant,
    entries: Vec<DebugEntry>,
}

impl DebugLog {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self::resume(job_id, Vec::new())
    }

    /// Continue a log persisted by an earlier run.
    pub fn resume(job_id: impl Into<String>, entries: Vec<DebugEntry>) -> Self {
        Self {
            job_id: job_id.into(),
            started: Instant::now(),
            entries,
        }
    }

    pub fn record(&mut self, stage: &str, message: impl Into<String>) {
        self.record_with(stage, message, serde_json::Value::Null);
    }

    pub fn record_with(&mut self, stage: &str, message: impl Into<String>, data: serde_json::Value) {
        let message = message.into();
        debug!(job = %self.job_id, stage, "{}", message);
        self.entries.push(DebugEntry {
            timestamp: Utc::now(),
            stage: stage.to_string(),
            message,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            data,
        });
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
