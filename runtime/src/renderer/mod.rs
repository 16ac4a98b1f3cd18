//! Browser behind the live itinerary tab.
//!
//! The tagger drives one visible tab in a browser the user is logged into.
//! [`Renderer`] owns the browser process; [`RenderContext`] is the tab.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a navigation ended up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The URL after any redirects (for example through the login page).
    pub final_url: String,
    pub load_time_ms: u64,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open the tab the tagger will work in.
    async fn open_tab(&self) -> Result<Box<dyn RenderContext>>;
    /// Close the browser and wait for the process to exit.
    async fn shutdown(&self) -> Result<()>;
}

/// One browser tab.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate and wait for the load, giving up after `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Evaluate `script` in the page. `undefined` comes back as `null`.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    async fn get_url(&self) -> Result<String>;
    async fn close(self: Box<Self>) -> Result<()>;
}
