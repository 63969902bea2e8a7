//! Spinner fed by job events.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::job::JobEvent;
use crate::models::JobStatus;

/// Spawn the UI task. It ends when every sender is dropped.
pub fn spawn_progress(
    mut events: mpsc::Receiver<JobEvent>,
    quiet: bool,
) -> anyhow::Result<JoinHandle<()>> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{prefix}%] {msg}")?);
    pb.set_prefix("0");
    pb.enable_steady_tick(Duration::from_millis(120));

    Ok(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                JobEvent::Progress {
                    job_id,
                    progress,
                    message,
                } => {
                    pb.set_prefix(progress.to_string());
                    pb.set_message(format!("{} {}", short_id(&job_id), message));
                }
                JobEvent::Warning { job_id, message } => {
                    pb.println(format!(
                        "{} {} {}",
                        style("!").yellow(),
                        short_id(&job_id),
                        message
                    ));
                }
                JobEvent::Finished {
                    job_id,
                    status,
                    message,
                } => {
                    let mark = match status {
                        JobStatus::Completed => style("✓").green(),
                        JobStatus::Failed => style("✗").red(),
                        _ => style("…").yellow(),
                    };
                    pb.println(format!("{} {} {}", mark, short_id(&job_id), message));
                }
            }
        }
        pb.finish_and_clear();
    }))
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
