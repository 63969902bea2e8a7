//! Wiring shared by the commands: store, rules, engines, controller.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::job::JobController;
use crate::models::ContentStructure;
use crate::ocr::OcrEngine;
use crate::repository::{DieselStore, MemoryStore, ProvenanceStore};
use crate::rules::{CompiledRules, RuleSet};

pub async fn load_rules(settings: &Settings) -> anyhow::Result<Arc<CompiledRules>> {
    let path = settings.rules_path();
    let rules = RuleSet::load(path.as_deref())
        .await
        .context("Failed to load rule set")?
        .compile()
        .context("Failed to compile rule set")?;
    Ok(Arc::new(rules))
}

/// The SQLite store, schema created if needed.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn ProvenanceStore>> {
    let path = settings.database_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = DieselStore::from_path(&path);
    store
        .init()
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

pub fn memory_store() -> Arc<dyn ProvenanceStore> {
    Arc::new(MemoryStore::new())
}

pub async fn controller(
    settings: &Settings,
    store: Arc<dyn ProvenanceStore>,
) -> anyhow::Result<JobController> {
    let rules = load_rules(settings).await?;
    let fetcher = Fetcher::from_config(&settings.fetch).context("Failed to build HTTP clients")?;
    let ocr = OcrEngine::from_config(&settings.ocr);
    Ok(JobController::new(
        store,
        Arc::new(fetcher),
        Arc::new(ocr),
        rules,
        &settings.pipeline,
    ))
}

pub async fn read_structure(path: &Path) -> anyhow::Result<ContentStructure> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid content structure in {}", path.display()))
}
