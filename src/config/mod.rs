//! Configuration management using the prefer crate for discovery.

mod settings;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use settings::{
    DatabaseConfig, FetchConfig, OcrConfig, PipelineConfig, RulesConfig, Settings,
    DEFAULT_USER_AGENT, DEFAULT_VISION_ENDPOINT,
};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "reclaim.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid rule pattern {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings: explicit path, else a discovered `reclaim` config file,
/// else defaults. Environment overrides are applied last.
pub async fn load_settings(options: &LoadOptions) -> Result<Settings, ConfigError> {
    let settings = match options.config_path.as_deref() {
        Some(path) => load_from_path(path).await?,
        None => match discover().await {
            Some(path) => load_from_path(&path).await?,
            None => Settings::default(),
        },
    };
    Ok(settings.with_env_overrides())
}

async fn discover() -> Option<PathBuf> {
    match prefer::load("reclaim").await {
        Ok(pref_config) => pref_config.source_path().map(|p| p.to_path_buf()),
        Err(e) => {
            tracing::debug!("No config file discovered: {}", e);
            None
        }
    }
}

/// Load settings from a specific TOML or JSON file.
pub async fn load_from_path(path: &Path) -> Result<Settings, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let mut settings: Settings = match ext {
        "json" => serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?,
        _ => toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?,
    };

    settings.source_path = Some(path.to_path_buf());
    tracing::debug!("Loaded config from {}", path.display());
    Ok(settings)
}
