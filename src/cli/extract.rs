//! Extract and run commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use console::style;
use tokio::sync::mpsc;

use super::context::{controller, memory_store, open_store, read_structure};
use super::progress::spawn_progress;
use crate::config::Settings;
use crate::job::{CancelHandle, JobEvent, JobRunner};
use crate::models::{
    AccessMode, ArchiveHints, ExtractionRequest, OcrOptions, SourceReference, SourceRequest,
};

pub struct ExtractArgs {
    pub source: String,
    pub structure: Option<PathBuf>,
    pub volume: Option<String>,
    pub page: Option<u32>,
    pub pages: Option<String>,
    pub language: Option<String>,
    pub access: Option<String>,
    pub targets: Vec<String>,
    pub dry_run: bool,
}

impl ExtractArgs {
    async fn into_request(self) -> anyhow::Result<ExtractionRequest> {
        let access_mode = match self.access.as_deref() {
            Some(mode) => match AccessMode::from_str(mode) {
                Some(m) => m,
                None => bail!("Unknown access mode: {}", mode),
            },
            None => AccessMode::default(),
        };
        let hints = ArchiveHints {
            access_mode,
            volume_id: self.volume,
            page_number: self.page,
            ..ArchiveHints::default()
        };

        let mut request = ExtractionRequest::new(
            SourceRequest::new(SourceReference::parse(&self.source)).with_hints(hints),
        );
        if let Some(path) = &self.structure {
            request.structure = Some(read_structure(path).await?);
        }
        request.ocr = OcrOptions {
            pages: self.pages,
            language: self.language,
        };
        request.target_names = self.targets;
        Ok(request)
    }
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> crate::job::CancelToken {
    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling...", style("!").yellow());
            handle.cancel();
        }
    });
    token
}

pub async fn cmd_extract(settings: &Settings, args: ExtractArgs) -> anyhow::Result<()> {
    let dry_run = args.dry_run;
    let request = args.into_request().await?;
    let store = if dry_run {
        memory_store()
    } else {
        open_store(settings).await?
    };

    let (event_tx, event_rx) = mpsc::channel::<JobEvent>(100);
    let ui = spawn_progress(event_rx, false)?;
    let controller = controller(settings, store).await?.with_events(event_tx);

    let job = controller.submit(request).await?;
    println!(
        "{} Job {} for {}",
        style("→").cyan(),
        job.id,
        job.request.source.source_url()
    );

    let result = controller.run(&job.id, &cancel_on_ctrl_c()).await;
    drop(controller);
    let _ = ui.await;

    match result {
        Ok(job) => {
            println!(
                "{} {} rows, average confidence {:.2}",
                style("✓").green(),
                job.row_count,
                job.avg_confidence
            );
            if dry_run {
                println!("  {} Dry run: nothing was written", style("→").dim());
            } else {
                println!(
                    "  {} reclaim status {} --debug",
                    style("→").dim(),
                    job.id
                );
            }
            Ok(())
        }
        Err(e) => bail!("Job {} failed: {}", job.id, e),
    }
}

pub async fn cmd_run(
    settings: &Settings,
    job_ids: Vec<String>,
    jobs: Option<usize>,
) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let (event_tx, event_rx) = mpsc::channel::<JobEvent>(100);
    let ui = spawn_progress(event_rx, false)?;
    let controller = controller(settings, store).await?.with_events(event_tx);

    let runner = JobRunner::new(
        Arc::new(controller),
        jobs.unwrap_or(settings.pipeline.max_concurrent_jobs),
    );
    let total = job_ids.len();
    let results = runner.run_many(job_ids, cancel_on_ctrl_c()).await;
    drop(runner);
    let _ = ui.await;

    let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).collect();
    for (id, result) in &failed {
        if let Err(e) = result {
            eprintln!("{} {}: {}", style("✗").red(), id, e);
        }
    }
    if !failed.is_empty() {
        bail!("{} of {} jobs failed", failed.len(), total);
    }
    println!("{} {} job(s) completed", style("✓").green(), total);
    Ok(())
}
