//! Message parsing and formatting for the tagger control protocol.
//!
//! Requests are newline-delimited JSON over a Unix domain socket:
//! `{"id": "r1", "action": "getStatus"}`. Replies carry the same id and
//! either a `result` or an `error` object.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound messages handled by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// Switch automatic tagging on or off.
    ToggleAutoTag { enabled: bool },
    /// Clear the processed set and force a pass.
    TagMap,
    /// Report whether tagging is enabled and how many days are visible.
    GetStatus,
    /// Return the stored tagging history.
    GetHistory,
}

/// A parsed protocol request.
#[derive(Debug)]
pub struct Request {
    pub id: String,
    pub message: Message,
}

/// Parse a JSON request line.
pub fn parse_request(json: &str) -> Result<Request> {
    let v: Value = serde_json::from_str(json).context("request is not valid JSON")?;

    let id = v
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    if v.get("action").and_then(|a| a.as_str()).is_none() {
        anyhow::bail!("missing 'action' field");
    }

    let message: Message = serde_json::from_value(v).context("unknown or malformed action")?;

    Ok(Request { id, message })
}

/// Format a successful response as JSON string (newline-terminated).
pub fn format_response(id: &str, result: Value) -> String {
    let resp = serde_json::json!({
        "id": id,
        "result": result,
    });
    format!("{}\n", resp)
}

/// Format an error response as JSON string (newline-terminated).
pub fn format_error(id: &str, code: &str, message: &str) -> String {
    let resp = serde_json::json!({
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    });
    format!("{}\n", resp)
}

/// Reply to `toggleAutoTag` and `tagMap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Reply to `getStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub enabled: bool,
    pub days_found: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toggle_request() {
        let json = r#"{"id": "r1", "action": "toggleAutoTag", "enabled": true}"#;
        let req = parse_request(json).unwrap();
        assert_eq!(req.id, "r1");
        assert_eq!(req.message, Message::ToggleAutoTag { enabled: true });
    }

    #[test]
    fn test_parse_status_request_without_id() {
        let req = parse_request(r#"{"action": "getStatus"}"#).unwrap();
        assert_eq!(req.id, "unknown");
        assert_eq!(req.message, Message::GetStatus);
    }

    #[test]
    fn test_parse_tag_map() {
        let req = parse_request(r#"{"id": "t", "action": "tagMap"}"#).unwrap();
        assert_eq!(req.message, Message::TagMap);
    }

    #[test]
    fn test_parse_unknown_action() {
        assert!(parse_request(r#"{"id": "x", "action": "foobar"}"#).is_err());
        assert!(parse_request(r#"{"id": "x"}"#).is_err());
        assert!(parse_request(r#"{"id": "x", "action": "toggleAutoTag"}"#).is_err());
    }

    #[test]
    fn test_format_response() {
        let resp = format_response("r1", serde_json::to_value(Ack::ok()).unwrap());
        let parsed: Value = serde_json::from_str(resp.trim()).unwrap();
        assert_eq!(parsed["id"], "r1");
        assert_eq!(parsed["result"]["success"], true);
    }

    #[test]
    fn test_status_reply_shape() {
        let reply = StatusReply {
            enabled: false,
            days_found: 0,
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, serde_json::json!({"enabled": false, "daysFound": 0}));
    }

    #[test]
    fn test_format_error() {
        let resp = format_error("r2", "E_INVALID_ACTION", "unknown action");
        let parsed: Value = serde_json::from_str(resp.trim()).unwrap();
        assert_eq!(parsed["id"], "r2");
        assert_eq!(parsed["error"]["code"], "E_INVALID_ACTION");
    }
}
