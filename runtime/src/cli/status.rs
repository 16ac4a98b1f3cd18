//! Show the status of the running tagger.

use crate::cli::client::{self, RemoteError};
use crate::cli::output::{self, Styled};
use crate::config::RuntimeConfig;
use crate::protocol::StatusReply;
use anyhow::Result;
use serde_json::{json, Value};

/// What the status line says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    Ready(StatusReply),
    /// The page is not on the supported host.
    OffHost(String),
    /// The status request failed.
    Error(String),
}

impl StatusView {
    pub fn from_reply(reply: Result<std::result::Result<Value, RemoteError>>) -> Self {
        match reply {
            Ok(Ok(value)) => match serde_json::from_value::<StatusReply>(value) {
                Ok(status) => StatusView::Ready(status),
                Err(e) => StatusView::Error(format!("unexpected status reply: {e}")),
            },
            Ok(Err(err)) if err.code == "E_UNSUPPORTED_PAGE" => StatusView::OffHost(err.message),
            Ok(Err(err)) => StatusView::Error(err.message),
            Err(e) => StatusView::Error(format!("{e:#}")),
        }
    }

    /// The popup's status label.
    pub fn label(&self) -> &str {
        match self {
            StatusView::Ready(s) if s.enabled => "Active",
            StatusView::Ready(_) => "Inactive",
            StatusView::OffHost(message) => message,
            StatusView::Error(_) => "Error",
        }
    }

    fn to_json(&self) -> Value {
        match self {
            StatusView::Ready(s) => json!({
                "status": self.label(),
                "enabled": s.enabled,
                "daysFound": s.days_found,
            }),
            StatusView::OffHost(_) => json!({ "status": self.label() }),
            StatusView::Error(reason) => json!({ "status": "Error", "message": reason }),
        }
    }
}

/// Ask the daemon for its status and print it.
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load()?;
    let reply = client::request(&config.socket_path, json!({ "action": "getStatus" })).await;
    let view = StatusView::from_reply(reply);

    if output::is_json() {
        output::print_json(&view.to_json());
        return Ok(());
    }

    let s = Styled::new();
    match &view {
        StatusView::Ready(status) => {
            let label = if status.enabled {
                s.green(view.label())
            } else {
                s.dim(view.label())
            };
            println!("Status:     {label}");
            println!("Days found: {}", status.days_found);
        }
        StatusView::OffHost(_) => println!("Status:     {}", view.label()),
        StatusView::Error(reason) => {
            println!("Status:     {}", s.red("Error"));
            if !output::is_quiet() {
                eprintln!("  {} {reason}", s.err_sym());
            }
        }
    }
    Ok(())
}
