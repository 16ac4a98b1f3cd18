//! Page controller: triggers, the pass queue and inbound messages.
//!
//! Two background tasks run per page:
//! - the pass worker, sole owner of the [`Orchestrator`] and its processed
//!   set, which drains a single queue of pass requests;
//! - the page watcher, which requests one pass shortly after each document
//!   load and another once the DOM has been quiet for the debounce period.
//!
//! A navigation or reload in the tab is a new document: the watcher tells
//! the worker to forget the processed set and re-arms the load grace.
//!
//! Requests that pile up while a pass is running are coalesced into one
//! pass. If any of them was manual, that pass is manual.

use crate::error::{Result, TagError};
use crate::events::{EventBus, TaggerEvent};
use crate::page::TaggerPage;
use crate::protocol::{Ack, Message, StatusReply};
use crate::settings::{Settings, TagSettings};
use crate::tagger::{count_days, Orchestrator, PassOptions, PassReport, Timings};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassRequest {
    /// Load grace, DOM mutation or enabling auto-tag. Honors the enabled flag.
    Auto,
    /// Explicit `tagMap`: clears the processed set and runs regardless.
    Manual,
    /// The tab loaded a new document. Clears the processed set, no pass.
    PageChanged,
}

/// Requests drained from the queue in one go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Batch {
    /// At least one request asked for a pass.
    pub pass: bool,
    pub manual: bool,
    pub page_changed: bool,
}

impl Batch {
    fn add(&mut self, request: PassRequest) {
        match request {
            PassRequest::Auto => self.pass = true,
            PassRequest::Manual => {
                self.pass = true;
                self.manual = true;
            }
            PassRequest::PageChanged => self.page_changed = true,
        }
    }

    /// Whether the processed set must be cleared before the pass.
    pub fn resets(&self) -> bool {
        self.manual || self.page_changed
    }
}

/// Merge every request already queued behind `first`.
pub fn coalesce(first: PassRequest, rx: &mut mpsc::UnboundedReceiver<PassRequest>) -> Batch {
    let mut batch = Batch::default();
    batch.add(first);
    while let Ok(next) = rx.try_recv() {
        batch.add(next);
    }
    batch
}

pub struct Controller {
    page: Arc<dyn TaggerPage>,
    bus: Arc<EventBus>,
    enabled: Arc<AtomicBool>,
    tag_settings: watch::Sender<TagSettings>,
    requests: mpsc::UnboundedSender<PassRequest>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    watcher: JoinHandle<()>,
}

impl Controller {
    /// Start the controller tasks for `page`.
    pub fn spawn(page: Arc<dyn TaggerPage>, settings: &Settings, timings: Timings, bus: Arc<EventBus>) -> Self {
        let enabled = Arc::new(AtomicBool::new(settings.auto_tag_enabled));
        let (tag_settings, tag_settings_rx) = watch::channel(settings.tag_settings.clone());
        let (requests, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let orchestrator = Orchestrator::new(Arc::clone(&page), timings.clone(), Arc::clone(&bus));
        let worker = tokio::spawn(pass_worker(
            orchestrator,
            rx,
            Arc::clone(&enabled),
            tag_settings_rx.clone(),
            shutdown_rx,
        ));

        let watcher = tokio::spawn(watch_page(
            Arc::clone(&page),
            timings,
            Arc::clone(&enabled),
            tag_settings_rx,
            Arc::clone(&bus),
            requests.clone(),
        ));

        info!(enabled = settings.auto_tag_enabled, "controller started");
        Self {
            page,
            bus,
            enabled,
            tag_settings,
            requests,
            shutdown,
            worker: Mutex::new(Some(worker)),
            watcher,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn page(&self) -> &Arc<dyn TaggerPage> {
        &self.page
    }

    /// Queue a pass.
    pub fn request_pass(&self, request: PassRequest) {
        if self.requests.send(request).is_err() {
            warn!(?request, "pass worker has stopped, request dropped");
        }
    }

    /// Replace the per-feature settings used by subsequent passes.
    pub fn update_tag_settings(&self, settings: TagSettings) {
        self.tag_settings.send_replace(settings);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.bus.emit(TaggerEvent::AutoTagToggled { enabled });
        if enabled {
            self.request_pass(PassRequest::Auto);
        }
    }

    pub async fn status(&self) -> Result<StatusReply> {
        Ok(StatusReply {
            enabled: self.is_enabled(),
            days_found: count_days(self.page.as_ref()).await?,
        })
    }

    /// Handle a popup message and build its reply.
    pub async fn handle(&self, message: Message) -> Result<Value> {
        match message {
            Message::ToggleAutoTag { enabled } => {
                self.set_enabled(enabled);
                Ok(serde_json::to_value(Ack::ok())?)
            }
            Message::TagMap => {
                self.request_pass(PassRequest::Manual);
                Ok(serde_json::to_value(Ack::ok())?)
            }
            Message::GetStatus => Ok(serde_json::to_value(self.status().await?)?),
            Message::GetHistory => Err(TagError::Page(
                "history is kept by the background worker, not the page".into(),
            )),
        }
    }

    /// Stop the watcher and let the worker finish its current pass.
    pub async fn shutdown(&self) {
        self.watcher.abort();
        self.shutdown.send_replace(true);
        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        debug!("controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.watcher.abort();
        if let Ok(slot) = self.worker.lock() {
            if let Some(worker) = slot.as_ref() {
                worker.abort();
            }
        }
    }
}

async fn pass_worker(
    mut orchestrator: Orchestrator,
    mut rx: mpsc::UnboundedReceiver<PassRequest>,
    enabled: Arc<AtomicBool>,
    tag_settings: watch::Receiver<TagSettings>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown.changed() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        if *shutdown.borrow() {
            break;
        }
        let batch = coalesce(first, &mut rx);
        if batch.resets() {
            orchestrator.reset();
        }
        if !batch.pass {
            continue;
        }
        let options = PassOptions {
            enabled: enabled.load(Ordering::SeqCst),
            force: batch.manual,
            extract_location: tag_settings.borrow().extract_location,
        };
        match orchestrator.run_pass(options).await {
            Ok(PassReport { ran: false, .. }) => {}
            Ok(report) => debug!(days = report.days_found, tagged = report.tagged(), "pass done"),
            Err(e) => warn!(error = %e, "pass aborted"),
        }
    }
    debug!("pass worker stopped");
}

async fn watch_page(
    page: Arc<dyn TaggerPage>,
    timings: Timings,
    enabled: Arc<AtomicBool>,
    tag_settings: watch::Receiver<TagSettings>,
    bus: Arc<EventBus>,
    requests: mpsc::UnboundedSender<PassRequest>,
) {
    let mut document = page.document_id().await.ok();
    let mut last = page.mutation_count().await.unwrap_or(0);
    let mut load: Option<Instant> = Some(Instant::now() + timings.load_grace());
    let mut settle: Option<Instant> = None;
    let mut ticker = tokio::time::interval(timings.mutation_poll());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let navigated = match page.document_id().await {
                    Ok(id) => document.replace(id).is_some_and(|previous| previous != id),
                    Err(e) => {
                        debug!(error = %e, "reading document id failed");
                        false
                    }
                };
                if navigated {
                    let url = page.url().await.unwrap_or_default();
                    info!(%url, "new document loaded, forgetting processed days");
                    bus.emit(TaggerEvent::PageChanged { url });
                    if requests.send(PassRequest::PageChanged).is_err() {
                        break;
                    }
                    last = page.mutation_count().await.unwrap_or(0);
                    settle = None;
                    load = Some(Instant::now() + timings.load_grace());
                } else {
                    match page.mutation_count().await {
                        Ok(count) if count != last => {
                            last = count;
                            if enabled.load(Ordering::SeqCst) {
                                settle = Some(Instant::now() + timings.mutation_debounce());
                            }
                        }
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "reading mutation counter failed"),
                    }
                }
            }
            _ = tokio::time::sleep_until(load.unwrap_or_else(Instant::now)), if load.is_some() => {
                load = None;
                let on_load = tag_settings.borrow().auto_tag_on_load;
                if enabled.load(Ordering::SeqCst) && on_load {
                    debug!("load grace elapsed, requesting pass");
                    if requests.send(PassRequest::Auto).is_err() {
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(settle.unwrap_or_else(Instant::now)), if settle.is_some() => {
                settle = None;
                debug!("page settled after mutations, requesting pass");
                if requests.send(PassRequest::Auto).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::MemoryPage;
    use std::time::Duration;

    const PAGE: &str = r#"<html><head><title>Trip</title></head><body>
        <div class="itinerary-holder" id="d1"><div class="itinerary-title">Day 1Rome</div></div>
        <div class="itinerary-holder" id="d2"><div class="itinerary-title">Day 2Milan</div></div>
    </body></html>"#;

    fn settings(enabled: bool) -> Settings {
        Settings {
            auto_tag_enabled: enabled,
            ..Settings::default()
        }
    }

    #[test]
    fn test_coalesce_prefers_manual() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(PassRequest::Auto).unwrap();
        tx.send(PassRequest::Manual).unwrap();
        tx.send(PassRequest::Auto).unwrap();
        let batch = coalesce(PassRequest::Auto, &mut rx);
        assert!(batch.pass && batch.manual && batch.resets());
        assert!(rx.try_recv().is_err());

        tx.send(PassRequest::Auto).unwrap();
        let batch = coalesce(PassRequest::Auto, &mut rx);
        assert!(batch.pass && !batch.resets());
    }

    #[test]
    fn test_coalesce_page_change_resets_without_pass() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batch = coalesce(PassRequest::PageChanged, &mut rx);
        assert_eq!(
            batch,
            Batch {
                pass: false,
                manual: false,
                page_changed: true
            }
        );
        assert!(batch.resets());

        tx.send(PassRequest::PageChanged).unwrap();
        let batch = coalesce(PassRequest::Auto, &mut rx);
        assert!(batch.pass && batch.resets() && !batch.manual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_days() {
        let page: Arc<dyn TaggerPage> = Arc::new(MemoryPage::from_html(PAGE, "https://www.bookmundi.com/x"));
        let controller = Controller::spawn(page, &settings(false), Timings::default(), Arc::new(EventBus::default()));
        let reply = controller.handle(Message::GetStatus).await.unwrap();
        assert_eq!(reply, serde_json::json!({"enabled": false, "daysFound": 2}));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_emits_and_replies() {
        let page: Arc<dyn TaggerPage> = Arc::new(MemoryPage::from_html(PAGE, "about:blank"));
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let controller = Controller::spawn(page, &settings(false), Timings::default(), Arc::clone(&bus));

        let reply = controller
            .handle(Message::ToggleAutoTag { enabled: true })
            .await
            .unwrap();
        assert_eq!(reply, serde_json::json!({"success": true}));
        assert!(controller.is_enabled());
        assert_eq!(events.recv().await.unwrap(), TaggerEvent::AutoTagToggled { enabled: true });
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_grace_runs_pass_when_enabled() {
        let page: Arc<dyn TaggerPage> = Arc::new(MemoryPage::from_html(PAGE, "about:blank"));
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let controller = Controller::spawn(page, &settings(true), Timings::default(), Arc::clone(&bus));

        let start = Instant::now();
        loop {
            match events.recv().await.unwrap() {
                TaggerEvent::PassCompleted { days_found, manual, .. } => {
                    assert_eq!(days_found, 2);
                    assert!(!manual);
                    break;
                }
                _ => continue,
            }
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_debounce_requests_pass() {
        let memory = Arc::new(MemoryPage::from_html(PAGE, "about:blank"));
        let page: Arc<dyn TaggerPage> = memory.clone();
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let mut s = settings(true);
        s.tag_settings.auto_tag_on_load = false;
        let controller = Controller::spawn(page, &s, Timings::default(), Arc::clone(&bus));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err(), "no pass without a trigger");

        memory.touch();
        let start = Instant::now();
        loop {
            if let TaggerEvent::PassCompleted { .. } = events.recv().await.unwrap() {
                break;
            }
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_rearms_load_grace() {
        let memory = Arc::new(MemoryPage::from_html(PAGE, "https://www.bookmundi.com/a"));
        let page: Arc<dyn TaggerPage> = memory.clone();
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let controller = Controller::spawn(page, &settings(true), Timings::default(), Arc::clone(&bus));

        loop {
            if let TaggerEvent::PassCompleted { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        memory
            .navigate(
                r#"<body><div class="itinerary-holder"><div class="itinerary-title">Day 1Oslo</div></div></body>"#,
                "https://www.bookmundi.com/b",
            )
            .unwrap();
        let start = Instant::now();
        assert_eq!(
            events.recv().await.unwrap(),
            TaggerEvent::PageChanged {
                url: "https://www.bookmundi.com/b".into()
            }
        );
        loop {
            if let TaggerEvent::PassCompleted { days_found, manual, .. } = events.recv().await.unwrap() {
                assert_eq!(days_found, 1);
                assert!(!manual);
                break;
            }
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
        controller.shutdown().await;
    }
}
