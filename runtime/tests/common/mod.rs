//! Scripted itinerary page with a working autocomplete widget.
//!
//! Wraps [`MemoryPage`]. Typing into a destination input renders a
//! `.suggestionbox` below it listing every catalogue entry containing the
//! typed text. Clicking an entry writes its `data-value` into the input;
//! the list closes on mouseup.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use tagger_runtime::dom::{DomTree, NodeHandle};
use tagger_runtime::error::Result;
use tagger_runtime::page::memory::{MemoryPage, PageAction};
use tagger_runtime::page::{SyntheticEvent, TaggerPage};

pub const URL: &str = "https://www.bookmundi.com/tour/1234/itinerary";

pub const CATALOGUE: &[&str] = &[
    "San Sebastián, Spain",
    "San Sebastián de los Reyes",
    "Bilbao, Spain",
    "Bilbao Airport (BIO)",
    "Madrid, Spain",
    "Toledo, Spain",
];

/// Three days: a comma-listed title, a plain title, and a field that is
/// already filled.
pub const SPAIN_TRIP: &str = r#"<html><head><title>Spain Highlights</title></head><body>
<div class="itinerary">
  <div class="itinerary-holder" id="day-1">
    <div class="itinerary-title">Day 1Bilbao</div>
    <input type="text" class="form-control itidestination" id="dest-1" data-rect="100,20,300,30">
  </div>
  <div class="itinerary-holder" id="day-2">
    <div class="itinerary-title">Day 2Bilbao, Guernica, San Sebastián</div>
    <input type="text" class="form-control itidestination" id="dest-2" data-rect="300,20,300,30">
  </div>
  <div class="itinerary-holder" id="day-3">
    <div class="itinerary-title">Day 3Rome</div>
    <input type="text" class="form-control itidestination" id="dest-3" value="Rome" data-rect="500,20,300,30">
  </div>
</div>
</body></html>"#;

/// How the widget reacts to a click on a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickBehavior {
    /// Write the suggestion's value into the input.
    Commit,
    /// The host page rejects the choice and clears the field.
    Reject,
    /// The value lands late: it becomes visible on the n-th read of the
    /// field after the click.
    CommitOnRead(u32),
}

struct LateCommit {
    input: NodeHandle,
    value: String,
    reads_left: u32,
}

type SnapshotHook = Box<dyn FnOnce(&MemoryPage) + Send>;

#[derive(Default)]
struct Widget {
    dropdown: Option<NodeHandle>,
    input: Option<NodeHandle>,
    closing: bool,
}

pub struct AutocompletePage {
    inner: MemoryPage,
    catalogue: Vec<String>,
    behavior: Mutex<ClickBehavior>,
    widget: Mutex<Widget>,
    late: Mutex<Option<LateCommit>>,
    snapshots: Mutex<u32>,
    hook: Mutex<Option<(u32, SnapshotHook)>>,
}

impl AutocompletePage {
    pub fn new(html: &str, catalogue: &[&str]) -> Self {
        Self {
            inner: MemoryPage::from_html(html, URL),
            catalogue: catalogue.iter().map(|s| s.to_string()).collect(),
            behavior: Mutex::new(ClickBehavior::Commit),
            widget: Mutex::new(Widget::default()),
            late: Mutex::new(None),
            snapshots: Mutex::new(0),
            hook: Mutex::new(None),
        }
    }

    pub fn spain_trip() -> Self {
        Self::new(SPAIN_TRIP, CATALOGUE)
    }

    pub fn memory(&self) -> &MemoryPage {
        &self.inner
    }

    pub fn set_behavior(&self, behavior: ClickBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Run `f` right after the `n`-th snapshot has been taken, so that
    /// snapshot still shows the old page.
    pub fn after_snapshot(&self, n: u32, f: impl FnOnce(&MemoryPage) + Send + 'static) {
        *self.hook.lock().unwrap() = Some((n, Box::new(f)));
    }

    /// Load another itinerary into the tab.
    pub fn navigate(&self, html: &str) {
        *self.widget.lock().unwrap() = Widget::default();
        self.late.lock().unwrap().take();
        self.inner.navigate(html, URL).unwrap();
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.inner.actions()
    }

    /// Handle of the element with `id`.
    pub async fn by_id(&self, id: &str) -> NodeHandle {
        self.inner
            .resolve_selector(&format!("#{id}"))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("no element #{id}"))
    }

    pub async fn value_of(&self, id: &str) -> String {
        let node = self.by_id(id).await;
        self.inner.read_value(node).await.unwrap()
    }

    /// Every value the tagger wrote into `node`, in order.
    pub fn values_set(&self, node: NodeHandle) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::SetValue { node: n, value } if n == node => Some(value),
                _ => None,
            })
            .collect()
    }

    fn close_dropdown(&self) {
        let old = self.widget.lock().unwrap().dropdown.take();
        if let Some(old) = old {
            let _ = self.inner.remove(old);
        }
    }

    async fn on_input(&self, input: NodeHandle) -> Result<()> {
        self.close_dropdown();

        let tree = self.inner.snapshot().await?;
        let Some(el) = tree.get(input) else {
            return Ok(());
        };
        if !el.class_contains("itidestination") {
            return Ok(());
        }
        let typed = el.value().trim().to_lowercase();
        if typed.chars().count() < 2 {
            return Ok(());
        }
        let matches: Vec<&String> = self
            .catalogue
            .iter()
            .filter(|entry| entry.to_lowercase().contains(&typed))
            .collect();
        if matches.is_empty() {
            return Ok(());
        }
        let Some(parent) = el.parent().map(|p| p.handle()) else {
            return Ok(());
        };
        let rect = el.rect();
        let items: String = matches
            .iter()
            .map(|m| format!(r#"<div class="suggestionbox-item" data-value="{m}">{m}</div>"#))
            .collect();
        let html = format!(
            r#"<div class="suggestionbox" data-rect="{},{},{},{}">{items}</div>"#,
            rect.top + rect.height,
            rect.left,
            rect.width,
            32 * matches.len()
        );
        drop(tree);

        let added = self.inner.append_html(parent, &html)?;
        let mut widget = self.widget.lock().unwrap();
        widget.dropdown = added.first().copied();
        widget.input = Some(input);
        widget.closing = false;
        Ok(())
    }

    fn option_value(tree: &DomTree, node: NodeHandle) -> Option<String> {
        let el = tree.get(node)?;
        el.has_class("suggestionbox-item")
            .then(|| el.attr("data-value").unwrap_or_default().to_string())
    }

    async fn on_click(&self, option: NodeHandle) -> Result<()> {
        let tree = self.inner.snapshot().await?;
        let Some(value) = Self::option_value(&tree, option) else {
            return Ok(());
        };
        drop(tree);
        let input = {
            let mut widget = self.widget.lock().unwrap();
            widget.closing = true;
            widget.input
        };
        let Some(input) = input else {
            return Ok(());
        };
        let written = match *self.behavior.lock().unwrap() {
            ClickBehavior::Commit => value,
            ClickBehavior::Reject => String::new(),
            ClickBehavior::CommitOnRead(reads) => {
                *self.late.lock().unwrap() = Some(LateCommit {
                    input,
                    value,
                    reads_left: reads,
                });
                return Ok(());
            }
        };
        self.inner.edit(|tree| {
            if let Some(el) = tree.element_mut(input) {
                el.value = Some(written);
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl TaggerPage for AutocompletePage {
    async fn snapshot(&self) -> Result<DomTree> {
        let tree = self.inner.snapshot().await?;
        let taken = {
            let mut count = self.snapshots.lock().unwrap();
            *count += 1;
            *count
        };
        let due = {
            let mut hook = self.hook.lock().unwrap();
            match hook.as_ref() {
                Some((n, _)) if *n == taken => hook.take(),
                _ => None,
            }
        };
        if let Some((_, f)) = due {
            f(&self.inner);
        }
        Ok(tree)
    }

    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<()> {
        self.inner.set_value(node, value).await
    }

    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<()> {
        self.inner.dispatch(node, event).await?;
        match event {
            SyntheticEvent::Input { .. } => self.on_input(node).await,
            SyntheticEvent::Click => self.on_click(node).await,
            SyntheticEvent::MouseUp => {
                let closing = self.widget.lock().unwrap().closing;
                if closing {
                    self.close_dropdown();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()> {
        self.inner.scroll_into_view(node).await
    }

    async fn resolve_selector(&self, selector: &str) -> Result<Option<NodeHandle>> {
        self.inner.resolve_selector(selector).await
    }

    async fn read_value(&self, node: NodeHandle) -> Result<String> {
        let landed = {
            let mut late = self.late.lock().unwrap();
            match late.as_mut() {
                Some(commit) if commit.input == node => {
                    commit.reads_left = commit.reads_left.saturating_sub(1);
                    if commit.reads_left == 0 {
                        late.take()
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(commit) = landed {
            self.inner.edit(|tree| {
                if let Some(el) = tree.element_mut(commit.input) {
                    el.value = Some(commit.value);
                }
            })?;
        }
        self.inner.read_value(node).await
    }

    async fn mutation_count(&self) -> Result<u64> {
        self.inner.mutation_count().await
    }

    async fn document_id(&self) -> Result<u64> {
        self.inner.document_id().await
    }

    async fn url(&self) -> Result<String> {
        self.inner.url().await
    }
}
