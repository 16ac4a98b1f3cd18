//! Persisted user settings (`~/.tagger/settings.json`).
//!
//! The file is written with install defaults the first time it is needed.
//! The controller reads it once at start-up; `toggle` writes it back.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Per-feature switches under `tagSettings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagSettings {
    /// Run a pass two seconds after the page loads.
    pub auto_tag_on_load: bool,
    /// Include the last tagged destination in `mapTagged`.
    pub extract_location: bool,
    /// Carried for compatibility; coordinates are never read from the page.
    pub extract_coordinates: bool,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            auto_tag_on_load: true,
            extract_location: true,
            extract_coordinates: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_tag_enabled: bool,
    pub tag_settings: TagSettings,
}

/// Settings backed by a JSON file.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Open the settings file, installing defaults when it does not exist.
    /// An unreadable document falls back to defaults without being
    /// overwritten.
    pub fn load_or_install(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "settings file is malformed, using defaults");
                    Settings::default()
                }
            }
        } else {
            let defaults = Settings::default();
            persist(&path, &defaults)?;
            tracing::info!(path = %path.display(), "installed default settings");
            defaults
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<Settings> {
        self.data
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    /// Persist a new value for `autoTagEnabled`.
    pub fn set_auto_tag(&self, enabled: bool) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.auto_tag_enabled = enabled;
        persist(&self.path, &guard)
    }

    /// Re-read the file, e.g. after another process toggled it.
    pub fn reload(&self) -> Result<Settings> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let fresh: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed settings in {}", self.path.display()))?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = fresh.clone();
        Ok(fresh)
    }
}

fn persist(path: &Path, data: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::load_or_install(&path).unwrap();

        let settings = store.get().unwrap();
        assert!(!settings.auto_tag_enabled);
        assert!(settings.tag_settings.auto_tag_on_load);
        assert!(settings.tag_settings.extract_location);
        assert!(settings.tag_settings.extract_coordinates);

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["autoTagEnabled"], false);
        assert_eq!(on_disk["tagSettings"]["autoTagOnLoad"], true);
    }

    #[test]
    fn test_toggle_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load_or_install(&path).unwrap();
        store.set_auto_tag(true).unwrap();

        let reopened = SettingsStore::load_or_install(&path).unwrap();
        assert!(reopened.get().unwrap().auto_tag_enabled);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"tagSettings": {"extractLocation": false}}"#).unwrap();

        let settings = SettingsStore::load_or_install(&path).unwrap().get().unwrap();
        assert!(!settings.auto_tag_enabled);
        assert!(!settings.tag_settings.extract_location);
        assert!(settings.tag_settings.auto_tag_on_load);
    }

    #[test]
    fn test_malformed_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::load_or_install(&path).unwrap();
        assert_eq!(store.get().unwrap(), Settings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
        assert!(store.reload().is_err());
    }
}
