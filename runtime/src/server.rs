//! Unix domain socket server for the tagger control protocol.
//!
//! Handles connection lifecycle, inactivity timeouts, malformed JSON,
//! rate limiting, and dispatch of popup messages to the page controller.

use crate::background::HistoryStore;
use crate::config::url_on_host;
use crate::controller::Controller;
use crate::events::EventBus;
use crate::protocol::{self, Message};
use crate::settings::SettingsStore;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

/// Inactivity timeout per connection.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum request line size (1 MB).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Maximum requests per second per connection.
const MAX_REQUESTS_PER_SEC: u32 = 100;

/// Number of history entries returned by `getHistory`.
const HISTORY_LIMIT: usize = 10;

/// State shared by the socket server and the REST API.
pub struct SharedState {
    pub started_at: Instant,
    pub seen_ids: Mutex<HashSet<String>>,
    pub controller: Arc<Controller>,
    pub history: Arc<HistoryStore>,
    /// Persisted settings; toggles are written back here when present.
    pub settings: Option<Arc<SettingsStore>>,
    pub event_bus: Arc<EventBus>,
    /// Host the page must be on for status to be meaningful.
    pub host: String,
}

impl SharedState {
    pub fn new(
        controller: Arc<Controller>,
        history: Arc<HistoryStore>,
        event_bus: Arc<EventBus>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            seen_ids: Mutex::new(HashSet::new()),
            controller,
            history,
            settings: None,
            event_bus,
            host: host.into(),
        }
    }

    pub fn with_settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// The tagger socket server.
pub struct Server {
    socket_path: PathBuf,
    shutdown: Arc<Notify>,
    state: Arc<SharedState>,
}

impl Server {
    /// Create a new server bound to the given socket path.
    pub fn new(socket_path: &Path, state: Arc<SharedState>) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
            shutdown: Arc::new(Notify::new()),
            state,
        }
    }

    /// Get the shutdown notifier (for external shutdown signaling).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Start accepting connections and serving requests.
    pub async fn start(&self) -> Result<()> {
        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("failed to remove stale socket file")?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).context("failed to bind Unix socket")?;

        info!("tagger server listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let st = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, st).await {
                                    warn!("connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        info!("server stopped");
        Ok(())
    }
}

/// Handle a single client connection with inactivity timeout and rate limiting.
async fn handle_connection(stream: tokio::net::UnixStream, state: Arc<SharedState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let mut rate_window_start = Instant::now();
    let mut rate_count: u32 = 0;

    loop {
        line.clear();

        let read_result =
            tokio::time::timeout(INACTIVITY_TIMEOUT, reader.read_line(&mut line)).await;

        match read_result {
            Ok(Ok(0)) => break, // connection closed
            Ok(Ok(_)) => {
                if line.len() > MAX_REQUEST_SIZE {
                    let resp = protocol::format_error(
                        "unknown",
                        "E_MESSAGE_TOO_LARGE",
                        &format!(
                            "Request exceeds maximum size of {}MB",
                            MAX_REQUEST_SIZE / (1024 * 1024)
                        ),
                    );
                    writer.write_all(resp.as_bytes()).await.ok();
                    writer.flush().await.ok();
                    continue;
                }

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                if rate_window_start.elapsed() >= Duration::from_secs(1) {
                    rate_window_start = Instant::now();
                    rate_count = 0;
                }
                rate_count += 1;
                if rate_count > MAX_REQUESTS_PER_SEC {
                    let resp = protocol::format_error(
                        "unknown",
                        "E_RATE_LIMITED",
                        &format!(
                            "Rate limit exceeded: max {} requests/second",
                            MAX_REQUESTS_PER_SEC
                        ),
                    );
                    writer.write_all(resp.as_bytes()).await.ok();
                    writer.flush().await.ok();
                    continue;
                }

                let response = match protocol::parse_request(trimmed) {
                    Ok(req) => {
                        let mut ids = state.seen_ids.lock().await;
                        if ids.contains(&req.id) {
                            protocol::format_error(
                                &req.id,
                                "E_DUPLICATE_ID",
                                &format!("Request ID '{}' has already been used", req.id),
                            )
                        } else {
                            ids.insert(req.id.clone());
                            if ids.len() > 10000 {
                                ids.clear();
                            }
                            drop(ids);
                            handle_request(req, Arc::clone(&state)).await
                        }
                    }
                    Err(e) => {
                        // Malformed input gets an error but the connection stays open
                        let msg = format!("{e:#}");
                        if msg.contains("not valid JSON") {
                            protocol::format_error(
                                "unknown",
                                "E_INVALID_JSON",
                                &format!("Malformed JSON: {msg}"),
                            )
                        } else {
                            protocol::format_error("unknown", "E_INVALID_PARAMS", &msg)
                        }
                    }
                };

                if writer.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                warn!("read error: {e}");
                break;
            }
            Err(_) => {
                let resp = protocol::format_error(
                    "timeout",
                    "E_INACTIVITY_TIMEOUT",
                    "Connection closed due to inactivity",
                );
                writer.write_all(resp.as_bytes()).await.ok();
                writer.flush().await.ok();
                info!("closing inactive connection");
                break;
            }
        }
    }

    Ok(())
}

/// Handle a parsed request and return a JSON response line.
pub async fn handle_request(req: protocol::Request, state: Arc<SharedState>) -> String {
    match req.message {
        Message::GetHistory => match state.history.recent_maps(HISTORY_LIMIT) {
            Ok(maps) => protocol::format_response(&req.id, serde_json::json!({ "taggedMaps": maps })),
            Err(e) => protocol::format_error(&req.id, "E_HISTORY", &format!("{e:#}")),
        },
        Message::GetStatus => {
            let url = match state.controller.page().url().await {
                Ok(url) => url,
                Err(e) => return protocol::format_error(&req.id, "E_PAGE", &e.to_string()),
            };
            if !url_on_host(&url, &state.host) {
                return protocol::format_error(
                    &req.id,
                    "E_UNSUPPORTED_PAGE",
                    &format!("Not on {}", state.host),
                );
            }
            dispatch_to_controller(&req.id, Message::GetStatus, &state).await
        }
        Message::ToggleAutoTag { enabled } => {
            if let Some(settings) = &state.settings {
                if let Err(e) = settings.set_auto_tag(enabled) {
                    warn!(error = %e, "failed to persist autoTagEnabled");
                }
            }
            dispatch_to_controller(&req.id, Message::ToggleAutoTag { enabled }, &state).await
        }
        message => dispatch_to_controller(&req.id, message, &state).await,
    }
}

async fn dispatch_to_controller(id: &str, message: Message, state: &SharedState) -> String {
    match state.controller.handle(message).await {
        Ok(result) => protocol::format_response(id, result),
        Err(e) => protocol::format_error(id, "E_PAGE", &e.to_string()),
    }
}
