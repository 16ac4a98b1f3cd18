// Copyright 2026 Tagger Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for the tagger.
//!
//! Provides a REST interface alongside the Unix socket server. Every
//! endpoint maps 1:1 to a popup message, using the same [`SharedState`]
//! and [`handle_request`] dispatch.

use crate::protocol;
use crate::server::{handle_request, SharedState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<SharedState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/toggle", post(handle_toggle))
        .route("/api/v1/tag", post(handle_tag))
        .route("/api/v1/history", get(handle_history))
        .route("/api/v1/events", get(events_sse))
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server on the given port.
///
/// Runs concurrently with the Unix socket server and shares the same
/// state. Shut down by dropping the returned future.
pub async fn start(port: u16, state: Arc<SharedState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn next_request_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("rest-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Run a message through the protocol layer and unwrap the reply.
///
/// Successful replies return the bare `result`; errors keep the
/// `{"error": {...}}` envelope with a matching HTTP status.
async fn dispatch(mut message: Value, state: Arc<SharedState>) -> (StatusCode, Json<Value>) {
    if let Some(obj) = message.as_object_mut() {
        obj.insert("id".into(), Value::String(next_request_id()));
    }

    let req = match protocol::parse_request(&message.to_string()) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "code": "E_INVALID_PARAMS", "message": format!("{e:#}") } })),
            );
        }
    };

    let line = handle_request(req, state).await;
    match serde_json::from_str::<Value>(&line) {
        Ok(mut v) => {
            if let Some(result) = v.get_mut("result").map(Value::take) {
                return (StatusCode::OK, Json(result));
            }
            if let Some(obj) = v.as_object_mut() {
                obj.remove("id");
            }
            let status = match v["error"]["code"].as_str() {
                Some("E_UNSUPPORTED_PAGE") => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(v))
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": "E_INTERNAL", "message": "Failed to parse internal response" } })),
        ),
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<SharedState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
    }))
}

async fn handle_status(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    dispatch(json!({ "action": "getStatus" }), state).await
}

#[derive(Deserialize)]
struct ToggleBody {
    enabled: bool,
}

async fn handle_toggle(
    State(state): State<Arc<SharedState>>,
    Json(body): Json<ToggleBody>,
) -> impl IntoResponse {
    dispatch(
        json!({ "action": "toggleAutoTag", "enabled": body.enabled }),
        state,
    )
    .await
}

async fn handle_tag(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    dispatch(json!({ "action": "tagMap" }), state).await
}

async fn handle_history(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    dispatch(json!({ "action": "getHistory" }), state).await
}

/// Server-Sent Events endpoint streaming every tagger event as JSON.
async fn events_sse(
    State(state): State<Arc<SharedState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::HistoryStore;
    use crate::controller::Controller;
    use crate::events::EventBus;
    use crate::page::memory::MemoryPage;
    use crate::page::TaggerPage;
    use crate::settings::Settings;
    use crate::tagger::Timings;
    use tempfile::TempDir;

    fn state(url: &str, dir: &TempDir) -> Arc<SharedState> {
        let page: Arc<dyn TaggerPage> = Arc::new(MemoryPage::from_html("<body></body>", url));
        let bus = Arc::new(EventBus::default());
        let controller = Arc::new(Controller::spawn(
            page,
            &Settings::default(),
            Timings::default(),
            Arc::clone(&bus),
        ));
        let history = Arc::new(HistoryStore::open(dir.path().join("history.json")).unwrap());
        Arc::new(SharedState::new(controller, history, bus, "bookmundi.com"))
    }

    #[test]
    fn test_request_ids_unique() {
        assert_ne!(next_request_id(), next_request_id());
    }

    #[tokio::test]
    async fn test_dispatch_status_unwraps_result() {
        let dir = TempDir::new().unwrap();
        let (status, Json(body)) = dispatch(
            json!({ "action": "getStatus" }),
            state("https://www.bookmundi.com/t/1", &dir),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "enabled": false, "daysFound": 0 }));
    }

    #[tokio::test]
    async fn test_dispatch_off_host_is_conflict() {
        let dir = TempDir::new().unwrap();
        let (status, Json(body)) =
            dispatch(json!({ "action": "getStatus" }), state("https://example.com", &dir)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "Not on bookmundi.com");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let dir = TempDir::new().unwrap();
        let (status, _) = dispatch(
            json!({ "action": "explode" }),
            state("https://www.bookmundi.com", &dir),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
