//! The page surface the tagger drives.
//!
//! [`TaggerPage`] is everything the tagging core may do to a document:
//! snapshot it, write a form value, dispatch a synthetic event, scroll an
//! element into view, resolve a selector and read a value back. Every call
//! that takes a [`NodeHandle`] resolves it at the moment of use and fails
//! with [`TagError::StaleNode`](crate::error::TagError::StaleNode) when the
//! element has gone.

pub mod live;
pub mod memory;

use crate::dom::{DomTree, NodeHandle};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use live::LivePage;
pub use memory::MemoryPage;

/// Events the tagger synthesizes. All of them bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyntheticEvent {
    /// `input`, optionally carrying the typed character as `data`.
    Input { data: Option<String> },
    KeyDown { key: String, code: String },
    KeyUp { key: String, code: String },
    Change,
    Focus,
    Blur,
    Click,
    MouseDown,
    MouseUp,
}

impl SyntheticEvent {
    /// DOM event type name.
    pub fn name(&self) -> &'static str {
        match self {
            SyntheticEvent::Input { .. } => "input",
            SyntheticEvent::KeyDown { .. } => "keydown",
            SyntheticEvent::KeyUp { .. } => "keyup",
            SyntheticEvent::Change => "change",
            SyntheticEvent::Focus => "focus",
            SyntheticEvent::Blur => "blur",
            SyntheticEvent::Click => "click",
            SyntheticEvent::MouseDown => "mousedown",
            SyntheticEvent::MouseUp => "mouseup",
        }
    }
}

#[async_trait]
pub trait TaggerPage: Send + Sync {
    /// Capture the current document.
    async fn snapshot(&self) -> Result<DomTree>;

    /// Assign the `value` property of a form control.
    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<()>;

    /// Dispatch a synthetic event at an element.
    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<()>;

    /// Scroll an element into the viewport.
    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()>;

    /// First element matching a CSS selector, if any.
    async fn resolve_selector(&self, selector: &str) -> Result<Option<NodeHandle>>;

    /// Current `value` of a form control.
    async fn read_value(&self, node: NodeHandle) -> Result<String>;

    /// Monotonic count of child-list mutations under the body.
    async fn mutation_count(&self) -> Result<u64>;

    /// Identity of the loaded document. Changes on every navigation or
    /// reload, even to the same URL.
    async fn document_id(&self) -> Result<u64>;

    /// Current document URL.
    async fn url(&self) -> Result<String>;
}
