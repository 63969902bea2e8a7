//! Command-line interface.
//!
//! Parses arguments and dispatches to command-specific modules.

mod context;
mod extract;
mod init;
mod inspect;
mod progress;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::LoadOptions;

#[derive(Parser)]
#[command(name = "reclaim")]
#[command(about = "Extract enslaved persons and slaveholders from historical documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and RECLAIM_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Create an extraction job for a URL or file and run it
    Extract {
        /// Source URL or local file
        source: String,
        /// Content structure hint (JSON)
        #[arg(long)]
        structure: Option<PathBuf>,
        /// Volume identifier used in placeholder names
        #[arg(long)]
        volume: Option<String>,
        /// Page number within the volume
        #[arg(long)]
        page: Option<u32>,
        /// Page range to OCR, e.g. "1-3"
        #[arg(long)]
        pages: Option<String>,
        /// OCR language code
        #[arg(long)]
        language: Option<String>,
        /// Archive access mode (direct, pdf-link, auth-required, protected)
        #[arg(long)]
        access: Option<String>,
        /// Names to look for in narrative text (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,
        /// Use an in-memory store; nothing is written to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Run existing jobs concurrently
    Run {
        /// Job IDs
        #[arg(required = true)]
        job_ids: Vec<String>,
        /// Maximum jobs in flight (defaults to pipeline.max_concurrent_jobs)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Show a job's status
    Status {
        job_id: String,
        /// Print the job row as JSON
        #[arg(long)]
        json: bool,
        /// Include the debug log
        #[arg(long)]
        debug: bool,
    },

    /// Run OCR on a local file and print the text
    Ocr {
        file: PathBuf,
        /// Page range, e.g. "2-4"
        #[arg(long)]
        pages: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },

    /// Detect the structure of a text file
    Detect {
        file: PathBuf,
        /// Content structure hint (JSON)
        #[arg(long)]
        structure: Option<PathBuf>,
        /// Also parse and print the rows
        #[arg(long)]
        rows: bool,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config.clone(),
    };
    let mut settings = crate::config::load_settings(&options).await?;
    if let Some(db) = &cli.database {
        settings.database.path = Some(db.display().to_string());
    }

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Extract {
            source,
            structure,
            volume,
            page,
            pages,
            language,
            access,
            targets,
            dry_run,
        } => {
            let args = extract::ExtractArgs {
                source,
                structure,
                volume,
                page,
                pages,
                language,
                access,
                targets,
                dry_run,
            };
            extract::cmd_extract(&settings, args).await
        }
        Commands::Run { job_ids, jobs } => extract::cmd_run(&settings, job_ids, jobs).await,
        Commands::Status {
            job_id,
            json,
            debug,
        } => status::cmd_status(&settings, &job_id, json, debug).await,
        Commands::Ocr {
            file,
            pages,
            language,
        } => inspect::cmd_ocr(&settings, &file, pages, language).await,
        Commands::Detect {
            file,
            structure,
            rows,
        } => inspect::cmd_detect(&settings, &file, structure.as_deref(), rows).await,
    }
}
