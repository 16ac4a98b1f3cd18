//! A page held in memory.
//!
//! Backs the offline `extract` command and the test suite. Writes and
//! events are applied to the stored [`DomTree`] and recorded in an action
//! log so callers can see exactly what the tagger did.

use super::{SyntheticEvent, TaggerPage};
use crate::dom::parse::{append_html, parse_html};
use crate::dom::{DomTree, NodeHandle};
use crate::error::{Result, TagError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// One recorded interaction with the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    SetValue { node: NodeHandle, value: String },
    Dispatch { node: NodeHandle, event: SyntheticEvent },
    Scroll { node: NodeHandle },
}

impl PageAction {
    pub fn node(&self) -> NodeHandle {
        match self {
            PageAction::SetValue { node, .. }
            | PageAction::Dispatch { node, .. }
            | PageAction::Scroll { node } => *node,
        }
    }
}

struct MemoryState {
    tree: DomTree,
    url: String,
    mutations: u64,
    document: u64,
    actions: Vec<PageAction>,
}

pub struct MemoryPage {
    state: Mutex<MemoryState>,
}

impl MemoryPage {
    pub fn new(tree: DomTree, url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                tree,
                url: url.into(),
                mutations: 0,
                document: 1,
                actions: Vec::new(),
            }),
        }
    }

    /// Parse a full HTML document.
    pub fn from_html(html: &str, url: impl Into<String>) -> Self {
        Self::new(parse_html(html), url)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| TagError::Page("page state lock poisoned".into()))
    }

    /// Append an HTML fragment under `parent` and count it as a mutation.
    pub fn append_html(&self, parent: NodeHandle, html: &str) -> Result<Vec<NodeHandle>> {
        let mut state = self.lock()?;
        let added = append_html(&mut state.tree, parent, html).ok_or(TagError::StaleNode(parent))?;
        state.mutations += 1;
        Ok(added)
    }

    /// Detach an element and count it as a mutation.
    pub fn remove(&self, node: NodeHandle) -> Result<()> {
        let mut state = self.lock()?;
        if !state.tree.remove(node) {
            return Err(TagError::StaleNode(node));
        }
        state.mutations += 1;
        Ok(())
    }

    /// Everything the tagger did to the page, in order.
    pub fn actions(&self) -> Vec<PageAction> {
        self.lock().map(|s| s.actions.clone()).unwrap_or_default()
    }

    pub fn clear_actions(&self) {
        if let Ok(mut state) = self.lock() {
            state.actions.clear();
        }
    }

    /// Bump the mutation counter without changing the tree.
    pub fn touch(&self) {
        if let Ok(mut state) = self.lock() {
            state.mutations += 1;
        }
    }

    /// Load a new document in place, as a navigation or reload would. The
    /// mutation counter starts over; the action log is kept.
    pub fn navigate(&self, html: &str, url: impl Into<String>) -> Result<()> {
        let mut state = self.lock()?;
        state.tree = parse_html(html);
        state.url = url.into();
        state.mutations = 0;
        state.document += 1;
        Ok(())
    }

    /// Run `f` against the stored tree. Counts as a mutation.
    pub fn edit<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> Result<R> {
        let mut state = self.lock()?;
        state.mutations += 1;
        Ok(f(&mut state.tree))
    }
}

#[async_trait]
impl TaggerPage for MemoryPage {
    async fn snapshot(&self) -> Result<DomTree> {
        Ok(self.lock()?.tree.clone())
    }

    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<()> {
        let mut state = self.lock()?;
        let el = state.tree.element_mut(node).ok_or(TagError::StaleNode(node))?;
        el.value = Some(value.to_string());
        state.actions.push(PageAction::SetValue {
            node,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<()> {
        let mut state = self.lock()?;
        if state.tree.index_of(node).is_none() {
            return Err(TagError::StaleNode(node));
        }
        state.actions.push(PageAction::Dispatch {
            node,
            event: event.clone(),
        });
        Ok(())
    }

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()> {
        let mut state = self.lock()?;
        if state.tree.index_of(node).is_none() {
            return Err(TagError::StaleNode(node));
        }
        state.actions.push(PageAction::Scroll { node });
        Ok(())
    }

    async fn resolve_selector(&self, selector: &str) -> Result<Option<NodeHandle>> {
        Ok(self.lock()?.tree.query(selector).map(|e| e.handle()))
    }

    async fn read_value(&self, node: NodeHandle) -> Result<String> {
        let state = self.lock()?;
        let el = state.tree.get(node).ok_or(TagError::StaleNode(node))?;
        Ok(el.value().to_string())
    }

    async fn mutation_count(&self) -> Result<u64> {
        Ok(self.lock()?.mutations)
    }

    async fn document_id(&self) -> Result<u64> {
        Ok(self.lock()?.document)
    }

    async fn url(&self) -> Result<String> {
        Ok(self.lock()?.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><head><title>T</title></head><body>
        <div id="host"><input type="text" id="dest" class="itidestination"></div>
    </body></html>"#;

    #[tokio::test]
    async fn test_set_and_read_value() {
        let page = MemoryPage::from_html(HTML, "https://www.bookmundi.com/t/1");
        let input = page.resolve_selector("#dest").await.unwrap().unwrap();

        page.set_value(input, "Bilbao").await.unwrap();
        assert_eq!(page.read_value(input).await.unwrap(), "Bilbao");
        let snap = page.snapshot().await.unwrap();
        assert_eq!(snap.get(input).unwrap().value(), "Bilbao");
        assert_eq!(
            page.actions(),
            vec![PageAction::SetValue {
                node: input,
                value: "Bilbao".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_stale_handles() {
        let page = MemoryPage::from_html(HTML, "about:blank");
        let input = page.resolve_selector("#dest").await.unwrap().unwrap();
        page.remove(input).unwrap();

        assert!(matches!(
            page.read_value(input).await,
            Err(TagError::StaleNode(h)) if h == input
        ));
        assert!(page.dispatch(input, &SyntheticEvent::Click).await.is_err());
        assert!(page.scroll_into_view(input).await.is_err());
        assert!(page.resolve_selector("#dest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_counted() {
        let page = MemoryPage::from_html(HTML, "about:blank");
        assert_eq!(page.mutation_count().await.unwrap(), 0);
        let host = page.resolve_selector("#host").await.unwrap().unwrap();
        page.append_html(host, "<ul><li>x</li></ul>").unwrap();
        page.touch();
        assert_eq!(page.mutation_count().await.unwrap(), 2);
        // Value writes are not child-list mutations.
        let input = page.resolve_selector("#dest").await.unwrap().unwrap();
        page.set_value(input, "x").await.unwrap();
        assert_eq!(page.mutation_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_navigate_replaces_document() {
        let page = MemoryPage::from_html(HTML, "https://www.bookmundi.com/t/1");
        let host = page.resolve_selector("#host").await.unwrap().unwrap();
        page.append_html(host, "<p>x</p>").unwrap();
        let before = page.document_id().await.unwrap();

        page.navigate("<body><p id=\"other\"></p></body>", "https://www.bookmundi.com/t/2")
            .unwrap();
        assert_ne!(page.document_id().await.unwrap(), before);
        assert_eq!(page.mutation_count().await.unwrap(), 0);
        assert_eq!(page.url().await.unwrap(), "https://www.bookmundi.com/t/2");
        assert!(page.resolve_selector("#dest").await.unwrap().is_none());
        assert!(page.resolve_selector("#other").await.unwrap().is_some());
    }
}
