//! Job status command.

use anyhow::Context;
use console::style;

use super::context::open_store;
use crate::config::Settings;
use crate::models::JobStatus;

pub async fn cmd_status(
    settings: &Settings,
    job_id: &str,
    json: bool,
    debug: bool,
) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let mut job = store
        .load_job(job_id)
        .await?
        .with_context(|| format!("No job with id {}", job_id))?;

    if json {
        if !debug {
            job.debug_log.clear();
        }
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    let status = match job.status {
        JobStatus::Completed => style(job.status.as_str()).green(),
        JobStatus::Failed => style(job.status.as_str()).red(),
        _ => style(job.status.as_str()).yellow(),
    };
    println!("{}", style(format!("Job {}", job.id)).bold());
    println!("{}", "-".repeat(60));
    println!("  Source:     {}", job.request.source.source_url());
    println!("  Status:     {} ({}%)", status, job.progress);
    println!("  Message:    {}", job.status_message);
    println!("  Rows:       {}", job.row_count);
    println!("  Confidence: {:.2}", job.avg_confidence);
    println!("  Created:    {}", job.created_at.to_rfc3339());
    if let Some(done) = job.completed_at {
        println!("  Finished:   {}", done.to_rfc3339());
    }

    if debug {
        println!("\n{}", style("Debug log").cyan());
        for entry in &job.debug_log {
            println!(
                "  {:>7}ms  {:<10} {}",
                entry.elapsed_ms,
                entry.stage,
                entry.message
            );
        }
    }
    Ok(())
}
