//! Chromium through chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Environment variable naming an explicit Chromium binary.
pub const CHROMIUM_ENV: &str = "TAGGER_CHROMIUM_PATH";

const SYSTEM_BINARIES: &[&str] = &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];

/// Binaries worth trying before the system `PATH`, most specific first:
/// the env override, then a browser unpacked under `~/.tagger/chromium`.
pub fn chromium_candidates(env_override: Option<PathBuf>, home: Option<&Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = env_override.into_iter().collect();
    if let Some(home) = home {
        let root = home.join(".tagger").join("chromium");
        if cfg!(target_os = "macos") {
            for arch in ["chrome-mac-arm64", "chrome-mac-x64"] {
                out.push(
                    root.join(arch)
                        .join("Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                );
            }
        } else {
            out.push(root.join("chrome-linux64").join("chrome"));
        }
        out.push(root.join("chrome"));
    }
    if cfg!(target_os = "macos") {
        out.push(PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));
    }
    out
}

/// First installed Chromium: a known location, else the system `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    let env_override = std::env::var_os(CHROMIUM_ENV).map(PathBuf::from);
    let home = dirs::home_dir();
    chromium_candidates(env_override, home.as_deref())
        .into_iter()
        .find(|p| p.exists())
        .or_else(|| SYSTEM_BINARIES.iter().find_map(|name| which::which(name).ok()))
}

/// Launch options for [`ChromiumRenderer`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit binary; falls back to [`find_chromium`].
    pub chromium_path: Option<PathBuf>,
    /// Itinerary editing needs a logged-in session, so the default is a
    /// visible window.
    pub headless: bool,
    /// Persistent profile directory, where the login cookie lives.
    pub user_data_dir: Option<PathBuf>,
}

impl LaunchOptions {
    fn browser_config(&self) -> Result<BrowserConfig> {
        let chrome_path = match &self.chromium_path {
            Some(p) => p.clone(),
            None => find_chromium().with_context(|| {
                format!("Chromium not found. Set {CHROMIUM_ENV} or chromium_path in config.json.")
            })?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-background-networking");
        builder = if self.headless {
            builder.arg("--headless=new").arg("--disable-gpu")
        } else {
            builder.with_head()
        };
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
    }
}

pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let (browser, mut handler) = Browser::launch(options.browser_config()?)
            .await
            .context("failed to launch Chromium")?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler error");
                }
            }
            tracing::debug!("CDP connection closed");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open_tab(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open a tab")?;
        Ok(Box::new(ChromiumTab { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            // The user may have closed the window already.
            tracing::debug!(error = %e, "browser close request failed");
        }
        browser.wait().await.context("waiting for Chromium to exit")?;
        self.handler.abort();
        Ok(())
    }
}

/// The itinerary tab.
pub struct ChromiumTab {
    page: Page,
}

impl ChromiumTab {
    async fn current_url(&self) -> Result<Option<String>> {
        let url = self.page.url().await.context("failed to read the tab URL")?;
        Ok(url.map(|u| u.to_string()))
    }
}

#[async_trait]
impl RenderContext for ChromiumTab {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(Duration::from_millis(timeout_ms), load).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
        let load_time_ms = start.elapsed().as_millis() as u64;
        let final_url = self.current_url().await?.unwrap_or_else(|| url.to_string());
        Ok(NavigationResult {
            final_url,
            load_time_ms,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.current_url().await?.unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close the tab")?;
        Ok(())
    }
}
