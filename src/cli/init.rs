//! Initialize command.

use console::style;

use super::context::{load_rules, open_store};
use crate::config::Settings;

/// Create the data directory and database schema, and check the rule set.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    open_store(settings).await?;
    let rules = load_rules(settings).await?;

    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database_path().display()
    );
    println!("  {} Rule set version {}", style("→").dim(), rules.version);
    if settings.ocr.vision_api_key.is_none() {
        println!(
            "  {} GOOGLE_VISION_API_KEY not set; OCR will use tesseract only",
            style("!").yellow()
        );
    }
    Ok(())
}
