//! Headless Chromium screenshots for pages that only render in a browser.
//!
//! Launches a local Chrome/Chromium, or connects to a remote one when
//! `BROWSER_URL` is set, and captures a full-page PNG of the target.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::http_client::random_user_agent;

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// A rendered page.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub final_url: String,
}

/// Lazily started browser shared by every screenshot in the process.
pub struct ScreenshotBrowser {
    config: FetchConfig,
    browser: Mutex<Option<Browser>>,
}

impl ScreenshotBrowser {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    fn find_chrome(&self) -> Result<PathBuf> {
        if let Some(path) = self.config.chrome_path.as_deref() {
            return Ok(PathBuf::from(shellexpand::tilde(path).as_ref()));
        }
        for path in CHROME_PATHS {
            let p = PathBuf::from(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p);
            }
        }
        for cmd in CHROME_COMMANDS {
            if let Ok(p) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", p.display());
                return Ok(p);
            }
        }
        Err(anyhow::anyhow!(
            "Chrome/Chromium not found; install it or set BROWSER_URL to a remote instance"
        ))
    }

    async fn launch(&self) -> Result<Browser> {
        let chrome = self.find_chrome()?;
        info!("Launching headless browser");
        let config = BrowserConfig::builder()
            .chrome_executable(chrome)
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> Result<Browser> {
        info!("Connecting to remote browser at {}", url);
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;
        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.navigation_timeout_secs),
            ..Default::default()
        };
        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        Ok(browser)
    }

    async fn new_page(&self) -> Result<Page> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            let browser = match self.config.browser_url.as_deref() {
                Some(url) => self.connect_remote(url).await?,
                None => self.launch().await?,
            };
            *guard = Some(browser);
        }
        let browser = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("browser not initialized"))?;
        Ok(browser.new_page("about:blank").await?)
    }

    /// Navigate, wait for the page to settle, and capture it.
    pub async fn screenshot(&self, url: &str) -> Result<Screenshot> {
        let page = self.new_page().await?;
        let result = self.capture(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("Closing page failed: {}", e);
        }
        result
    }

    async fn capture(&self, page: &Page, url: &str) -> Result<Screenshot> {
        page.execute(SetUserAgentOverrideParams::new(random_user_agent().to_string()))
            .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.config.viewport_width),
            i64::from(self.config.viewport_height),
            1.0,
            false,
        ))
        .await?;

        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;
        let limit = Duration::from_secs(self.config.navigation_timeout_secs);
        tokio::time::timeout(limit, async {
            page.execute(nav).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| anyhow::anyhow!("Navigation timed out after {:?} for {}", limit, url))?
        .map_err(|e| anyhow::anyhow!("Navigation failed for {}: {}", url, e))?;

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let png = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .context("Screenshot failed")?;
        if png.is_empty() {
            warn!("Empty screenshot for {}", url);
        }

        let final_url = page
            .url()
            .await?
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        Ok(Screenshot { png, final_url })
    }
}
