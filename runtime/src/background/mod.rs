//! Background worker: turns outbound tagger notices into history entries
//! and notifications.

pub mod history;
pub mod notify;

pub use history::{format_relative, HistoryStore, TabInfo};
pub use notify::{Notification, Notifier};

use crate::events::{EventBus, TaggerEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Subscribe to `bus` and record every history notice until the bus closes.
/// Records carry the URL of the document the tab shows at the time.
pub fn spawn(
    bus: &EventBus,
    history: Arc<HistoryStore>,
    notifier: Notifier,
    mut tab: TabInfo,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "background worker lagged behind the event bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let TaggerEvent::PageChanged { url } = &event {
                tab.url.clone_from(url);
                continue;
            }
            if !event.is_history_notice() {
                continue;
            }
            match history.record(&event, &tab) {
                Ok(Some(recorded)) => {
                    if let Err(e) = history.save().await {
                        tracing::warn!(error = %e, "failed to save history");
                    }
                    notifier.send(&Notification::for_record(&recorded)).await;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to record history"),
            }
        }
        tracing::debug!("background worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_worker_records_notices() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path().join("history.json")).unwrap());
        let bus = EventBus::default();
        let handle = spawn(
            &bus,
            Arc::clone(&history),
            Notifier::Log,
            TabInfo::new("https://www.bookmundi.com/t/1"),
        );

        bus.emit(TaggerEvent::AutoTagToggled { enabled: true });
        bus.emit(TaggerEvent::LocationTagged {
            day: 1,
            destination: "Rome".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        });

        for _ in 0..50 {
            if !history.snapshot().unwrap().tagged_locations.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snap = history.snapshot().unwrap();
        assert_eq!(snap.tagged_locations.len(), 1);
        assert_eq!(snap.tagged_locations[0].url, "https://www.bookmundi.com/t/1");
        assert!(snap.tagged_maps.is_empty());

        drop(bus);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_follows_page_changes() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path().join("history.json")).unwrap());
        let bus = EventBus::default();
        let handle = spawn(
            &bus,
            Arc::clone(&history),
            Notifier::Log,
            TabInfo::new("https://www.bookmundi.com/t/1"),
        );

        bus.emit(TaggerEvent::PageChanged {
            url: "https://www.bookmundi.com/t/2".into(),
        });
        bus.emit(TaggerEvent::MapTagged {
            title: Some("Norway".into()),
            location: None,
            coordinates: None,
        });
        drop(bus);
        handle.await.unwrap();

        let maps = history.snapshot().unwrap().tagged_maps;
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].url, "https://www.bookmundi.com/t/2");
        let reopened = HistoryStore::open(history.path()).unwrap().snapshot().unwrap();
        assert_eq!(reopened.tagged_maps, maps);
    }
}
