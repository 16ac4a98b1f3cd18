// Copyright 2026 Tagger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tagger event bus: notices flowing out of the tagging core.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`TaggerEvent`] values. The background worker, the REST SSE endpoint and
//! the socket server subscribe independently. When no subscribers exist,
//! events are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Geographic point attached to a tagged map, when known.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Every notice the tagger emits. Serialized as `{"action": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum TaggerEvent {
    /// At least one day was newly tagged during a pass.
    MapTagged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coordinates: Option<Coordinates>,
    },
    /// One day's destination field verified as tagged.
    LocationTagged {
        day: u32,
        destination: String,
        timestamp: String,
    },
    /// A pass over the page finished.
    PassCompleted {
        days_found: usize,
        tagged: usize,
        manual: bool,
        elapsed_ms: u64,
    },
    /// Automatic tagging was switched on or off.
    AutoTagToggled { enabled: bool },
    /// The tab loaded a new document (navigation or reload).
    PageChanged { url: String },
}

impl TaggerEvent {
    /// Whether the background worker records this event in history.
    pub fn is_history_notice(&self) -> bool {
        matches!(
            self,
            TaggerEvent::MapTagged { .. } | TaggerEvent::LocationTagged { .. }
        )
    }
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<TaggerEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: TaggerEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaggerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// RFC 3339 timestamp for the current instant, in UTC with millisecond
/// precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn test_location_tagged_wire_shape() {
        let event = TaggerEvent::LocationTagged {
            day: 2,
            destination: "San Sebastián".to_string(),
            timestamp: "2026-03-01T10:00:00.000Z".to_string(),
        };
        assert_json_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "action": "locationTagged",
                "data": {
                    "day": 2,
                    "destination": "San Sebastián",
                    "timestamp": "2026-03-01T10:00:00.000Z"
                }
            })
        );
    }

    #[test]
    fn test_map_tagged_omits_missing_fields() {
        let event = TaggerEvent::MapTagged {
            title: Some("Spain Highlights".to_string()),
            location: None,
            coordinates: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "mapTagged");
        assert_eq!(value["data"], json!({"title": "Spain Highlights"}));

        let parsed: TaggerEvent =
            serde_json::from_str(r#"{"action":"mapTagged","data":{}}"#).unwrap();
        assert_eq!(
            parsed,
            TaggerEvent::MapTagged {
                title: None,
                location: None,
                coordinates: None
            }
        );
    }

    #[test]
    fn test_pass_completed_fields_are_camel_case() {
        let event = TaggerEvent::PassCompleted {
            days_found: 3,
            tagged: 1,
            manual: true,
            elapsed_ms: 12,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["daysFound"], 3);
        assert_eq!(value["data"]["elapsedMs"], 12);
        assert!(!event.is_history_notice());
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(TaggerEvent::AutoTagToggled { enabled: true });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(TaggerEvent::AutoTagToggled { enabled: false });

        match rx.try_recv().unwrap() {
            TaggerEvent::AutoTagToggled { enabled } => assert!(!enabled),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_page_changed_is_not_history() {
        let event = TaggerEvent::PageChanged {
            url: "https://www.bookmundi.com/t/2".to_string(),
        };
        assert!(!event.is_history_notice());
        assert_json_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"action": "pageChanged", "data": {"url": "https://www.bookmundi.com/t/2"}})
        );
    }
}
