//! Application settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DEFAULT_DATABASE_FILENAME;

/// Polite identifier sent to archives.
pub const DEFAULT_USER_AGENT: &str =
    "reclaim/0.1 (historical records research; contact: records@reclaim.invalid)";

/// Google Cloud Vision annotate endpoint.
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Per-method request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Minimum delay between requests to the same domain, in milliseconds.
    pub min_delay_ms: u64,
    /// Ceiling for backoff delays, in milliseconds.
    pub max_delay_ms: u64,
    pub max_redirects: usize,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout_secs: u64,
    /// Wait after network idle before capturing a screenshot.
    pub settle_delay_ms: u64,
    /// Remote Chrome DevTools endpoint; a local Chrome is launched when unset.
    pub browser_url: Option<String>,
    pub chrome_path: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 60,
            min_delay_ms: 500,
            max_delay_ms: 3000,
            max_redirects: 10,
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout_secs: 60,
            settle_delay_ms: 2000,
            browser_url: None,
            chrome_path: None,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code.
    pub language: String,
    pub vision_endpoint: String,
    /// Read from `GOOGLE_VISION_API_KEY`; never written back to disk.
    #[serde(skip_serializing)]
    pub vision_api_key: Option<String>,
    /// Primary results at or above this confidence are accepted without fallback.
    pub accept_threshold: f64,
    /// Embedded PDF text shorter than this falls through to image OCR.
    pub min_pdf_text_length: usize,
    pub max_image_width: u32,
    pub call_timeout_secs: u64,
    /// Overall budget per page; a job gets `pages * page_budget_secs`.
    pub page_budget_secs: u64,
    pub pdf_dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            vision_endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            vision_api_key: None,
            accept_threshold: 0.8,
            min_pdf_text_length: 100,
            max_image_width: 2400,
            call_timeout_secs: 120,
            page_budget_secs: 150,
            pdf_dpi: 300,
        }
    }
}

impl OcrConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Overall OCR budget for a document with `pages` pages.
    pub fn budget_for(&self, pages: u32) -> Duration {
        Duration::from_secs(self.page_budget_secs * u64::from(pages.max(1)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrent_jobs: usize,
    /// Rows streamed to the store per batch.
    pub row_batch_size: usize,
    pub store_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            row_batch_size: 10,
            store_retry_attempts: 3,
            retry_base_delay_ms: 200,
        }
    }
}

impl PipelineConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `~` is expanded.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Replacement rule-set TOML; the built-in set is used when unset.
    pub path: Option<String>,
}

/// Application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchConfig,
    pub ocr: OcrConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub rules: RulesConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Default data directory: `<data_dir>/reclaim`.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reclaim")
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        match self.database.path.as_deref() {
            Some(p) => self.resolve_path(p),
            None => Self::default_data_dir().join(DEFAULT_DATABASE_FILENAME),
        }
    }

    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules.path.as_deref().map(|p| self.resolve_path(p))
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in practice).
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(db) = get("RECLAIM_DATABASE") {
            self.database.path = Some(db);
        }
        if let Some(ua) = get("RECLAIM_USER_AGENT") {
            self.fetch.user_agent = ua;
        }
        if let Some(key) = get("GOOGLE_VISION_API_KEY") {
            self.ocr.vision_api_key = Some(key);
        }
        if let Some(lang) = get("RECLAIM_OCR_LANGUAGE") {
            self.ocr.language = lang;
        }
        if let Some(url) = get("BROWSER_URL") {
            self.fetch.browser_url = Some(url);
        }
        if let Some(jobs) = get("RECLAIM_MAX_JOBS").and_then(|v| v.parse::<usize>().ok()) {
            self.pipeline.max_concurrent_jobs = jobs.max(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.ocr.accept_threshold, 0.8);
        assert_eq!(s.ocr.min_pdf_text_length, 100);
        assert_eq!(s.ocr.max_image_width, 2400);
        assert_eq!(s.pipeline.row_batch_size, 10);
        assert_eq!(s.fetch.max_redirects, 10);
        assert!(s.database_path().ends_with("reclaim/reclaim.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [ocr]
            language = "deu"

            [pipeline]
            max_concurrent_jobs = 2
            "#,
        )
        .unwrap();
        assert_eq!(s.ocr.language, "deu");
        assert_eq!(s.ocr.call_timeout_secs, 120);
        assert_eq!(s.pipeline.max_concurrent_jobs, 2);
        assert_eq!(s.pipeline.store_retry_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("RECLAIM_DATABASE", "/tmp/r.db"),
            ("GOOGLE_VISION_API_KEY", "k"),
            ("RECLAIM_MAX_JOBS", "0"),
            ("RECLAIM_OCR_LANGUAGE", " "),
        ]
        .into_iter()
        .collect();
        let s = Settings::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.database_path(), PathBuf::from("/tmp/r.db"));
        assert_eq!(s.ocr.vision_api_key.as_deref(), Some("k"));
        assert_eq!(s.pipeline.max_concurrent_jobs, 1);
        assert_eq!(s.ocr.language, "eng");
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let s = Settings {
            source_path: Some(PathBuf::from("/etc/reclaim/reclaim.toml")),
            database: DatabaseConfig {
                path: Some("data/r.db".to_string()),
            },
            ..Settings::default()
        };
        assert_eq!(s.database_path(), PathBuf::from("/etc/reclaim/data/r.db"));
    }

    #[test]
    fn test_budget_scales_with_pages() {
        let ocr = OcrConfig::default();
        assert_eq!(ocr.budget_for(3), Duration::from_secs(450));
        assert_eq!(ocr.budget_for(0), Duration::from_secs(150));
    }
}
