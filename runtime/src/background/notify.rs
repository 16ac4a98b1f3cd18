//! Best-effort desktop notifications.
//!
//! Delivery failures (no notification daemon, missing binary) are logged at
//! debug level and otherwise ignored.

use super::history::Recorded;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    /// Notification text for a freshly recorded history entry.
    pub fn for_record(record: &Recorded) -> Self {
        match record {
            Recorded::Map(map) => Self {
                title: "Map Tagged".into(),
                message: format!("Tagged map for: {}", map.label()),
            },
            Recorded::Location(loc) => Self {
                title: "Location Tagged".into(),
                message: format!("Tagged Day {}: {}", loc.day, loc.destination),
            },
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notifier {
    /// `notify-send` on Linux, `osascript` on macOS.
    Desktop,
    /// Log only.
    Log,
}

impl Notifier {
    pub async fn send(self, note: &Notification) {
        tracing::info!(title = %note.title, "{}", note.message);
        if self == Notifier::Log {
            return;
        }
        let Some(mut cmd) = desktop_command(note) else {
            return;
        };
        match cmd.output().await {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "desktop notification rejected"
            ),
            Err(e) => tracing::debug!(error = %e, "desktop notification unavailable"),
        }
    }
}

#[cfg(target_os = "macos")]
fn desktop_command(note: &Notification) -> Option<Command> {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        note.message.replace('"', r#"\""#),
        note.title.replace('"', r#"\""#)
    );
    let mut cmd = Command::new("osascript");
    cmd.args(["-e", &script]);
    Some(cmd)
}

#[cfg(target_os = "linux")]
fn desktop_command(note: &Notification) -> Option<Command> {
    let mut cmd = Command::new("notify-send");
    cmd.args(["--app-name=tagger", &note.title, &note.message]);
    Some(cmd)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn desktop_command(_note: &Notification) -> Option<Command> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::history::{LocationRecord, MapRecord};

    #[test]
    fn test_map_notification_text() {
        let record = Recorded::Map(MapRecord {
            title: None,
            location: Some("San Sebastián".into()),
            coordinates: None,
            url: String::new(),
            tab_id: String::new(),
            timestamp: String::new(),
        });
        assert_eq!(
            Notification::for_record(&record),
            Notification {
                title: "Map Tagged".into(),
                message: "Tagged map for: San Sebastián".into(),
            }
        );
    }

    #[test]
    fn test_location_notification_text() {
        let record = Recorded::Location(LocationRecord {
            day: 3,
            destination: "Bilbao".into(),
            timestamp: String::new(),
            url: String::new(),
            tab_id: String::new(),
        });
        let note = Notification::for_record(&record);
        assert_eq!(note.title, "Location Tagged");
        assert_eq!(note.message, "Tagged Day 3: Bilbao");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let note = Notification {
            title: "Map Tagged".into(),
            message: "Tagged map for: Unknown location".into(),
        };
        Notifier::Log.send(&note).await;
    }
}
