//! Per-day state machine and the pass loop.
//!
//! A pass re-scans the page, extracts every day's destination up front and
//! then works through the days strictly one at a time. A day only enters the
//! [`ProcessedSet`] once its field has been read back as tagged, or when it
//! was found already filled. Everything else stays eligible for the next
//! pass.

use super::autofill::AutofillDriver;
use super::extractor::{extract_destination, normalize_destination, SectionView};
use super::inputs::{has_prefilled_input, is_meaningful_value, locate_day_field, DayField};
use super::locator::{day_key, find_day_sections, DaySection};
use super::timing::Timings;
use crate::dom::{DomTree, NodeHandle};
use crate::error::{Result, TagError};
use crate::events::{now_timestamp, EventBus, TaggerEvent};
use crate::page::TaggerPage;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ancestor levels searched when the day block has no usable field.
pub(crate) const ANCESTOR_SEARCH_LEVELS: usize = 3;

/// Day keys completed during this controller's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    keys: HashSet<String>,
}

impl ProcessedSet {
    pub fn contains(&self, day: u32) -> bool {
        self.keys.contains(&day_key(day))
    }

    pub fn insert(&mut self, day: u32) -> bool {
        self.keys.insert(day_key(day))
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in ascending day order.
    pub fn keys(&self) -> Vec<String> {
        let mut days: Vec<u32> = self
            .keys
            .iter()
            .filter_map(|k| k.strip_prefix("day-")?.parse().ok())
            .collect();
        days.sort_unstable();
        days.into_iter().map(day_key).collect()
    }
}

/// How one day ended in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DayOutcome {
    /// Filled and verified.
    Tagged,
    /// A field already held a destination; nothing was typed.
    AlreadyFilled,
    /// No destination could be extracted and no field was filled.
    NoDestination,
    /// No eligible field was found.
    InputNotFound,
    /// Filled, but the field never read back as tagged.
    NotVerified,
    /// The typing sequence hit a page error.
    FillFailed,
    /// Completed in an earlier pass.
    AlreadyProcessed,
    /// The page failed underneath the day (stale block, script error).
    Failed,
}

impl DayOutcome {
    /// Terminal for the controller lifetime.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            DayOutcome::Tagged | DayOutcome::AlreadyFilled | DayOutcome::AlreadyProcessed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayReport {
    pub day: u32,
    pub outcome: DayOutcome,
    /// Extracted destination, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Field value after a confirmed fill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagged_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// False when the pass was skipped because tagging is disabled.
    pub ran: bool,
    pub days_found: usize,
    pub days: Vec<DayReport>,
}

impl PassReport {
    pub fn tagged(&self) -> usize {
        self.days
            .iter()
            .filter(|d| d.outcome == DayOutcome::Tagged)
            .count()
    }
}

/// Inputs to a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOptions {
    pub enabled: bool,
    /// Run even when disabled (manual trigger).
    pub force: bool,
    /// Include the last tagged destination in `mapTagged`.
    pub extract_location: bool,
}

/// Result of one day's state machine plus the pause before the next day.
struct DayStep {
    outcome: DayOutcome,
    tagged_value: Option<String>,
    pause: Duration,
}

pub struct Orchestrator {
    page: Arc<dyn TaggerPage>,
    timings: Timings,
    processed: ProcessedSet,
    bus: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(page: Arc<dyn TaggerPage>, timings: Timings, bus: Arc<EventBus>) -> Self {
        Self {
            page,
            timings,
            processed: ProcessedSet::default(),
            bus,
        }
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Forget every completed day (manual re-tag).
    pub fn reset(&mut self) {
        self.processed.clear();
    }

    /// Run one pass over the page.
    pub async fn run_pass(&mut self, options: PassOptions) -> Result<PassReport> {
        if !options.enabled && !options.force {
            debug!("tagging disabled, pass skipped");
            return Ok(PassReport::default());
        }
        let started = Instant::now();

        let tree = self.page.snapshot().await?;
        let sections = find_day_sections(&tree);
        if sections.is_empty() {
            debug!("no day sections on page");
            return Ok(PassReport {
                ran: true,
                ..PassReport::default()
            });
        }
        info!(days = sections.len(), force = options.force, "tagging pass started");

        let destinations = self.extract_all(&tree, &sections).await;
        let title = tree.title().trim().to_string();
        drop(tree);

        let mut report = PassReport {
            ran: true,
            days_found: sections.len(),
            days: Vec::with_capacity(sections.len()),
        };

        for section in &sections {
            let destination = destinations.get(&section.day).cloned();
            if self.processed.contains(section.day) {
                report.days.push(DayReport {
                    day: section.day,
                    outcome: DayOutcome::AlreadyProcessed,
                    destination,
                    tagged_value: None,
                });
                continue;
            }

            let step = match self.process_day(section, destination.as_deref()).await {
                Ok(step) => step,
                Err(e) => self.recover(section.day, e),
            };
            info!(day = section.day, outcome = ?step.outcome, "day processed");
            report.days.push(DayReport {
                day: section.day,
                outcome: step.outcome,
                destination,
                tagged_value: step.tagged_value,
            });
            if !step.pause.is_zero() {
                tokio::time::sleep(step.pause).await;
            }
        }

        let last_tagged = report
            .days
            .iter()
            .rev()
            .find_map(|d| d.tagged_value.clone());
        if let Some(location) = last_tagged {
            self.bus.emit(TaggerEvent::MapTagged {
                title: (!title.is_empty()).then_some(title),
                location: options.extract_location.then_some(location),
                coordinates: None,
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            days = report.days_found,
            tagged = report.tagged(),
            processed = self.processed.len(),
            elapsed_ms,
            "tagging pass finished"
        );
        self.bus.emit(TaggerEvent::PassCompleted {
            days_found: report.days_found,
            tagged: report.tagged(),
            manual: options.force,
            elapsed_ms,
        });
        Ok(report)
    }

    /// Destinations for every section, keyed by day. A section whose cached
    /// text yields nothing is retried once against a fresh snapshot.
    async fn extract_all(&self, tree: &DomTree, sections: &[DaySection]) -> BTreeMap<u32, String> {
        let mut out = BTreeMap::new();
        let mut fresh: Option<DomTree> = None;

        for section in sections {
            let mut found =
                extract_destination(&SectionView::new(&section.text, tree.get(section.element)));

            if found.is_none() {
                if fresh.is_none() {
                    match self.page.snapshot().await {
                        Ok(t) => fresh = Some(t),
                        Err(e) => debug!(error = %e, "fresh snapshot for extraction failed"),
                    }
                }
                if let Some(el) = fresh.as_ref().and_then(|t| t.get(section.element)) {
                    let text = el.text();
                    found = extract_destination(&SectionView::new(text.trim(), Some(el)));
                }
            }

            match found.as_deref().and_then(normalize_destination) {
                Some(destination) => {
                    out.insert(section.day, destination);
                }
                None => debug!(day = section.day, "no destination extracted"),
            }
        }
        out
    }

    async fn process_day(&mut self, section: &DaySection, destination: Option<&str>) -> Result<DayStep> {
        let day = section.day;
        let tree = self.page.snapshot().await?;
        let block = tree
            .get(section.element)
            .ok_or(TagError::StaleNode(section.element))?;

        let Some(destination) = destination else {
            if has_prefilled_input(&block) {
                self.processed.insert(day);
                return Ok(DayStep {
                    outcome: DayOutcome::AlreadyFilled,
                    tagged_value: None,
                    pause: self.timings.inter_day(),
                });
            }
            return Err(TagError::ExtractionFailure { day });
        };

        let input = match locate_day_field(&block, ANCESTOR_SEARCH_LEVELS) {
            DayField::Open(input) => input.handle(),
            DayField::Prefilled => {
                debug!(day, "field already filled, nothing to type");
                self.processed.insert(day);
                return Ok(DayStep {
                    outcome: DayOutcome::AlreadyFilled,
                    tagged_value: None,
                    pause: Duration::ZERO,
                });
            }
            DayField::Missing => return Err(TagError::InputNotFound { day }),
        };
        drop(tree);

        debug!(day, %destination, input = %input, "filling destination");
        let outcome = AutofillDriver::new(self.page.as_ref(), &self.timings)
            .fill(input, destination)
            .await
            .map_err(|e| TagError::FillFailure {
                day,
                reason: e.to_string(),
            })?;
        debug!(day, ?outcome, "fill sequence finished");

        let value = self.verify(input).await;
        if !is_meaningful_value(&value) {
            return Err(TagError::VerificationFailure { day, value });
        }

        self.processed.insert(day);
        self.bus.emit(TaggerEvent::LocationTagged {
            day,
            destination: value.clone(),
            timestamp: now_timestamp(),
        });
        Ok(DayStep {
            outcome: DayOutcome::Tagged,
            tagged_value: Some(value),
            pause: self.timings.inter_day(),
        })
    }

    /// Read the field back until it looks tagged or the rechecks run out.
    /// Returns the last trimmed value.
    async fn verify(&self, input: NodeHandle) -> String {
        let waits = std::iter::once(self.timings.verify_initial()).chain(self.timings.verify_rechecks());
        let mut value = String::new();
        for wait in waits {
            tokio::time::sleep(wait).await;
            value = match self.page.read_value(input).await {
                Ok(v) => v.trim().to_string(),
                Err(e) => {
                    debug!(error = %e, "reading field back failed");
                    String::new()
                }
            };
            if is_meaningful_value(&value) {
                break;
            }
        }
        value
    }

    /// Map a per-day error to its outcome and back-off.
    fn recover(&self, day: u32, err: TagError) -> DayStep {
        warn!(day, error = %err, "day not tagged");
        let (outcome, pause) = match &err {
            TagError::ExtractionFailure { .. } => (DayOutcome::NoDestination, self.timings.inter_day()),
            TagError::InputNotFound { .. } => (
                DayOutcome::InputNotFound,
                self.timings.input_retry() + self.timings.inter_day(),
            ),
            TagError::FillFailure { .. } => (DayOutcome::FillFailed, self.timings.inter_day()),
            TagError::VerificationFailure { .. } => (DayOutcome::NotVerified, self.timings.inter_day()),
            TagError::StaleNode(_) | TagError::Page(_) => (DayOutcome::Failed, self.timings.error_backoff()),
        };
        DayStep {
            outcome,
            tagged_value: None,
            pause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::MemoryPage;

    #[test]
    fn test_processed_set() {
        let mut set = ProcessedSet::default();
        assert!(set.insert(10));
        assert!(set.insert(2));
        assert!(!set.insert(2));
        assert!(set.contains(2));
        assert_eq!(set.keys(), vec!["day-2", "day-10"]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_outcome_terminality() {
        assert!(DayOutcome::Tagged.is_done());
        assert!(DayOutcome::AlreadyFilled.is_done());
        assert!(!DayOutcome::NotVerified.is_done());
        assert!(!DayOutcome::InputNotFound.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_pass_is_skipped() {
        let page = Arc::new(MemoryPage::from_html(
            r#"<body><div class="itinerary-holder"><div class="itinerary-title">Day 1</div></div></body>"#,
            "about:blank",
        ));
        let mut orch = Orchestrator::new(page, Timings::default(), Arc::new(EventBus::default()));
        let report = orch.run_pass(PassOptions::default()).await.unwrap();
        assert!(!report.ran);
        assert!(report.days.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_block_fails_with_short_backoff() {
        let page = Arc::new(MemoryPage::from_html(
            r#"<body><div class="itinerary-holder" id="d1"><div class="itinerary-title">Day 1Rome</div></div></body>"#,
            "about:blank",
        ));
        let orch = Orchestrator::new(page.clone(), Timings::default(), Arc::new(EventBus::default()));
        let step = orch.recover(1, TagError::StaleNode(NodeHandle(9)));
        assert_eq!(step.outcome, DayOutcome::Failed);
        assert_eq!(step.pause, Duration::from_millis(500));
        let step = orch.recover(1, TagError::InputNotFound { day: 1 });
        assert_eq!(step.pause, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_not_found_keeps_day_eligible() {
        let page = Arc::new(MemoryPage::from_html(
            r#"<body><div class="itinerary-holder"><div class="itinerary-title">Day 1Rome</div></div></body>"#,
            "about:blank",
        ));
        let mut orch = Orchestrator::new(page.clone(), Timings::default(), Arc::new(EventBus::default()));
        let report = orch
            .run_pass(PassOptions {
                enabled: true,
                ..PassOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(report.days_found, 1);
        assert_eq!(report.days[0].outcome, DayOutcome::InputNotFound);
        assert_eq!(report.days[0].destination.as_deref(), Some("Rome"));
        assert!(orch.processed().is_empty());
        assert!(page.actions().is_empty());
    }
}
