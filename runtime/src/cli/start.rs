//! Start the tagger daemon on an itinerary page.

use crate::background::{self, HistoryStore, Notifier, TabInfo};
use super::pid::PidFile;
use crate::cli::output::{self, Styled};
use crate::config::{self, RuntimeConfig};
use crate::controller::Controller;
use crate::events::EventBus;
use crate::page::{LivePage, TaggerPage};
use crate::renderer::chromium::{ChromiumRenderer, LaunchOptions};
use crate::renderer::Renderer;
use crate::rest;
use crate::server::{Server, SharedState};
use crate::settings::SettingsStore;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Navigation timeout for the initial page load.
const NAVIGATION_TIMEOUT_MS: u64 = 60_000;

/// Open `url` in Chromium and serve the popup messages until interrupted.
pub async fn run(url: &str, http_port: Option<u16>) -> Result<()> {
    let s = Styled::new();

    let pid_file = PidFile::new(config::pid_file_path());
    if let Some(pid) = pid_file.running() {
        bail!("tagger is already running (PID {pid}). Use 'tagger stop' first.");
    }

    let config = RuntimeConfig::load()?;
    let http_port = http_port.or(config.http_port);
    if !config.is_supported_url(url) {
        warn!(%url, host = %config.host, "URL is not on the supported host; passes will find no days");
    }

    let home = config::tagger_home();
    std::fs::create_dir_all(&home)
        .with_context(|| format!("failed to create {}", home.display()))?;
    let settings = Arc::new(SettingsStore::load_or_install(config::settings_path())?);
    let history = Arc::new(HistoryStore::open(config::history_path())?);

    let renderer = ChromiumRenderer::launch(&LaunchOptions {
        chromium_path: config.chromium_path.clone(),
        headless: config.headless,
        user_data_dir: config
            .user_data_dir
            .clone()
            .or_else(|| Some(home.join("profile"))),
    })
    .await?;
    info!("Chromium renderer initialized");

    let live = LivePage::new(renderer.open_tab().await?);
    let final_url = live.open(url, NAVIGATION_TIMEOUT_MS).await?;
    let page: Arc<dyn TaggerPage> = Arc::new(live);

    let bus = Arc::new(EventBus::default());
    let controller = Arc::new(Controller::spawn(
        Arc::clone(&page),
        &settings.get()?,
        config.timings.clone(),
        Arc::clone(&bus),
    ));
    let worker = background::spawn(
        &bus,
        Arc::clone(&history),
        Notifier::Desktop,
        TabInfo::new(&final_url),
    );

    let state = Arc::new(
        SharedState::new(
            Arc::clone(&controller),
            history,
            Arc::clone(&bus),
            config.host.clone(),
        )
        .with_settings(settings),
    );

    pid_file.write_current()?;

    let server = Server::new(&config.socket_path, Arc::clone(&state));
    let shutdown = server.shutdown_handle();

    let rest_task = http_port.map(|port| {
        let st = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = rest::start(port, st).await {
                warn!("REST API stopped: {e:#}");
            }
        })
    });

    if !output::is_quiet() {
        eprintln!(
            "  {} tagger v{} started on {} (PID {})",
            s.ok_sym(),
            env!("CARGO_PKG_VERSION"),
            final_url,
            std::process::id()
        );
        eprintln!("  Listening on {}", config.socket_path.display());
        if let Some(port) = http_port {
            eprintln!("  REST API on http://127.0.0.1:{port}");
        }
    }

    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        shutdown_signal.notify_one();
    });

    let result = server.start().await;

    controller.shutdown().await;
    if let Some(task) = rest_task {
        task.abort();
    }
    worker.abort();
    let _ = renderer.shutdown().await;
    pid_file.remove();
    let _ = std::fs::remove_file(&config.socket_path);

    if !output::is_quiet() {
        eprintln!("  {} tagger stopped.", s.ok_sym());
    }

    result
}
