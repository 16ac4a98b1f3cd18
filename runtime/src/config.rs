//! Runtime configuration (`~/.tagger/config.json`).
//!
//! Every field is optional in the file; missing ones take the defaults
//! below. `TAGGER_CHROMIUM_PATH` overrides `chromium_path`.

use crate::tagger::timing::Timings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default socket path.
pub const SOCKET_PATH: &str = "/tmp/tagger.sock";

/// Default REST port.
pub const HTTP_PORT: u16 = 7710;

/// Host the tagger is allowed to run against.
pub const DEFAULT_HOST: &str = "bookmundi.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub socket_path: PathBuf,
    /// `None` disables the REST API.
    pub http_port: Option<u16>,
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    /// Browser profile directory, so the user's login survives restarts.
    pub user_data_dir: Option<PathBuf>,
    pub host: String,
    pub timings: Timings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_PATH),
            http_port: Some(HTTP_PORT),
            chromium_path: None,
            headless: false,
            user_data_dir: None,
            host: DEFAULT_HOST.to_string(),
            timings: Timings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load `~/.tagger/config.json`, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&tagger_home().join("config.json"))
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            Self::default()
        };
        if let Ok(p) = std::env::var("TAGGER_CHROMIUM_PATH") {
            if !p.is_empty() {
                config.chromium_path = Some(PathBuf::from(p));
            }
        }
        Ok(config)
    }

    /// Whether `url` belongs to the supported host.
    pub fn is_supported_url(&self, url: &str) -> bool {
        url_on_host(url, &self.host)
    }
}

/// Whether `url` is on `host` or one of its subdomains.
pub fn url_on_host(url: &str, host: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .is_some_and(|h| h == host || h.ends_with(&format!(".{host}"))),
        Err(_) => url.contains(host),
    }
}

/// `~/.tagger`, or `/tmp/.tagger` when there is no home directory.
pub fn tagger_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".tagger")
}

/// Get the PID file path.
pub fn pid_file_path() -> PathBuf {
    tagger_home().join("tagger.pid")
}

pub fn settings_path() -> PathBuf {
    tagger_home().join("settings.json")
}

pub fn history_path() -> PathBuf {
    tagger_home().join("history.json")
}
