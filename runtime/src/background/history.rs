//! Bounded tagging history (`~/.tagger/history.json`).
//!
//! Two append-only logs: tagged maps (last 100) and tagged locations (last
//! 200). The oldest entry is evicted first once a log is full.

use crate::events::{now_timestamp, Coordinates, TaggerEvent};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MAX_MAPS: usize = 100;
pub const MAX_LOCATIONS: usize = 200;

/// Which page a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub url: String,
    pub tab_id: String,
}

impl TabInfo {
    /// A fresh tab identity for a page session.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tab_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub url: String,
    pub tab_id: String,
    pub timestamp: String,
}

impl MapRecord {
    /// The label shown in notifications and `tagger history`.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.location.as_deref().filter(|l| !l.is_empty()))
            .unwrap_or("Unknown location")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub day: u32,
    pub destination: String,
    pub timestamp: String,
    pub url: String,
    pub tab_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct History {
    pub tagged_maps: VecDeque<MapRecord>,
    pub tagged_locations: VecDeque<LocationRecord>,
}

/// What a call to [`HistoryStore::record`] stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Map(MapRecord),
    Location(LocationRecord),
}

pub struct HistoryStore {
    path: PathBuf,
    data: Mutex<History>,
}

impl HistoryStore {
    /// Open the history file. A missing file starts an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read history from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "history file is malformed, starting empty");
                    History::default()
                }
            }
        } else {
            History::default()
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Result<History> {
        self.data
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("history lock poisoned"))
    }

    /// Append a history notice in memory. Other events are ignored.
    /// Call [`HistoryStore::save`] to write the result to disk.
    pub fn record(&self, event: &TaggerEvent, tab: &TabInfo) -> Result<Option<Recorded>> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?;

        let recorded = match event {
            TaggerEvent::MapTagged {
                title,
                location,
                coordinates,
            } => {
                let record = MapRecord {
                    title: title.clone(),
                    location: location.clone(),
                    coordinates: *coordinates,
                    url: tab.url.clone(),
                    tab_id: tab.tab_id.clone(),
                    timestamp: now_timestamp(),
                };
                push_capped(&mut guard.tagged_maps, record.clone(), MAX_MAPS);
                Recorded::Map(record)
            }
            TaggerEvent::LocationTagged {
                day,
                destination,
                timestamp,
            } => {
                let record = LocationRecord {
                    day: *day,
                    destination: destination.clone(),
                    timestamp: timestamp.clone(),
                    url: tab.url.clone(),
                    tab_id: tab.tab_id.clone(),
                };
                push_capped(&mut guard.tagged_locations, record.clone(), MAX_LOCATIONS);
                Recorded::Location(record)
            }
            _ => return Ok(None),
        };

        Ok(Some(recorded))
    }

    /// Write the current history to disk on the blocking pool. The lock is
    /// held only long enough to copy the data.
    pub async fn save(&self) -> Result<()> {
        let data = self.snapshot()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist(&path, &data))
            .await
            .context("history writer task failed")?
    }

    /// Up to `limit` tagged maps, newest first.
    pub fn recent_maps(&self, limit: usize) -> Result<Vec<MapRecord>> {
        let guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?;
        Ok(guard.tagged_maps.iter().rev().take(limit).cloned().collect())
    }
}

fn push_capped<T>(log: &mut VecDeque<T>, item: T, cap: usize) {
    log.push_back(item);
    while log.len() > cap {
        log.pop_front();
    }
}

fn persist(path: &Path, data: &History) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write history to {}", path.display()))
}

/// Human-friendly age of an RFC 3339 timestamp relative to `now`.
/// Unparseable timestamps are returned unchanged.
pub fn format_relative(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let minutes = (now - then.with_timezone(&Utc)).num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
