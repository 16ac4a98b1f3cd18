//! Error taxonomy for the tagging core.
//!
//! Every variant is non-fatal to the controller: the orchestrator logs the
//! error, leaves the day eligible for a later pass, and moves on.

use crate::dom::NodeHandle;
use thiserror::Error;

/// Result alias used throughout the page and tagger modules.
pub type Result<T> = std::result::Result<T, TagError>;

/// Errors produced while processing a day or talking to the page.
#[derive(Debug, Error)]
pub enum TagError {
    /// No layer of the extraction cascade produced a usable destination.
    #[error("no destination could be extracted for day {day}")]
    ExtractionFailure { day: u32 },

    /// No eligible destination field was found for the day.
    #[error("no eligible destination input for day {day}")]
    InputNotFound { day: u32 },

    /// The typing/selection sequence raised an error part-way through.
    #[error("fill sequence failed for day {day}: {reason}")]
    FillFailure { day: u32, reason: String },

    /// The field never satisfied the tagged predicate after all rechecks.
    #[error("day {day} not tagged after verification (last value {value:?})")]
    VerificationFailure { day: u32, value: String },

    /// A node handle no longer resolves to an element in the page.
    #[error("element {0} is no longer attached to the page")]
    StaleNode(NodeHandle),

    /// The browser or the page script failed.
    #[error("page error: {0}")]
    Page(String),
}

impl TagError {
    /// Whether the error came from the page itself rather than from the
    /// tagging heuristics. Page faults get the short error backoff.
    pub fn is_page_fault(&self) -> bool {
        matches!(self, TagError::StaleNode(_) | TagError::Page(_))
    }
}

impl From<anyhow::Error> for TagError {
    fn from(err: anyhow::Error) -> Self {
        TagError::Page(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for TagError {
    fn from(err: serde_json::Error) -> Self {
        TagError::Page(format!("unexpected page reply: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_fault_classification() {
        assert!(TagError::StaleNode(NodeHandle(4)).is_page_fault());
        assert!(TagError::Page("boom".into()).is_page_fault());
        assert!(!TagError::InputNotFound { day: 2 }.is_page_fault());
        assert!(!TagError::VerificationFailure {
            day: 1,
            value: String::new()
        }
        .is_page_fault());
    }

    #[test]
    fn test_error_messages() {
        let err = TagError::FillFailure {
            day: 3,
            reason: "element 9 is no longer attached to the page".into(),
        };
        assert!(err.to_string().contains("day 3"));
        assert_eq!(
            TagError::StaleNode(NodeHandle(9)).to_string(),
            "element 9 is no longer attached to the page"
        );
    }
}
