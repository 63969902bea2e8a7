//! Bounded concurrent execution of independent jobs.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::info;

use super::cancel::CancelToken;
use super::controller::JobController;
use super::JobError;
use crate::models::ExtractionJob;

pub struct JobRunner {
    controller: Arc<JobController>,
    max_concurrent: usize,
}

impl JobRunner {
    pub fn new(controller: Arc<JobController>, max_concurrent: usize) -> Self {
        Self {
            controller,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every job, at most `max_concurrent` at a time. Results come back
    /// in completion order, each tagged with its job id.
    pub async fn run_many(
        &self,
        job_ids: Vec<String>,
        cancel: CancelToken,
    ) -> Vec<(String, Result<ExtractionJob, JobError>)> {
        info!(
            "Running {} job(s), {} at a time",
            job_ids.len(),
            self.max_concurrent
        );
        stream::iter(job_ids)
            .map(|id| {
                let controller = self.controller.clone();
                let cancel = cancel.clone();
                async move {
                    let result = controller.run(&id, &cancel).await;
                    (id, result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }
}
