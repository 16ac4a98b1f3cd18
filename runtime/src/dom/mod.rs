//! Snapshot model of a page's DOM.
//!
//! A [`DomTree`] is an arena of element and text nodes captured at one
//! instant, together with the layout facts the tagger needs (visibility,
//! computed `display`, bounding box, live `value`, `disabled`, `readOnly`).
//! Trees are cheap to throw away: the tagger takes a fresh snapshot at the
//! start of every unit of work and never keeps [`ElementRef`]s across a
//! suspension point. Only [`NodeHandle`]s survive, and those are resolved
//! again by the page at the moment of use.

pub mod parse;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write};

/// Attribute carrying an element's [`NodeHandle`] in the page and in
/// serialized snapshots.
pub const HANDLE_ATTR: &str = "data-tagger-node";

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// Stable identity of an element for as long as it stays attached.
///
/// The live page stamps each element with a `data-tagger-node` attribute the
/// first time a snapshot sees it, so the same element keeps the same handle
/// across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element box in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Per-element facts captured by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementData {
    pub handle: NodeHandle,
    /// Lowercase tag name.
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Live `value` property for form controls.
    pub value: Option<String>,
    /// Element has layout (`offsetParent !== null`).
    pub visible: bool,
    /// Computed `display` is `none`.
    pub display_none: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub rect: BoundingBox,
}

impl ElementData {
    /// Minimal element with no attributes and default layout.
    pub fn new(handle: NodeHandle, tag: &str) -> Self {
        Self {
            handle,
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            value: None,
            visible: true,
            display_none: false,
            disabled: false,
            read_only: false,
            rect: BoundingBox::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct DomNode {
    data: NodeData,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena-backed DOM snapshot.
#[derive(Debug, Clone, Default)]
pub struct DomTree {
    nodes: Vec<DomNode>,
    roots: Vec<usize>,
    by_handle: HashMap<NodeHandle, usize>,
    title: String,
    next_handle: u64,
}

impl DomTree {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            next_handle: 1,
            ..Default::default()
        }
    }

    /// Document title at snapshot time.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// A handle not used by any node pushed so far.
    pub fn next_handle(&self) -> NodeHandle {
        NodeHandle(self.next_handle.max(1))
    }

    /// Append an element under `parent` (or as a new root) and return its
    /// arena index. Children must be pushed after their parent.
    pub fn push_element(&mut self, parent: Option<usize>, data: ElementData) -> usize {
        let handle = data.handle;
        let idx = self.push(parent, NodeData::Element(data));
        self.by_handle.insert(handle, idx);
        self.next_handle = self.next_handle.max(handle.0 + 1);
        idx
    }

    /// Append a text node under `parent`.
    pub fn push_text(&mut self, parent: Option<usize>, text: impl Into<String>) -> usize {
        self.push(parent, NodeData::Text(text.into()))
    }

    fn push(&mut self, parent: Option<usize>, data: NodeData) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(DomNode {
            data,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) if p < idx => self.nodes[p].children.push(idx),
            _ => self.roots.push(idx),
        }
        idx
    }

    /// Detach an element and its subtree. Returns false if the handle is
    /// unknown.
    pub fn remove(&mut self, handle: NodeHandle) -> bool {
        let Some(idx) = self.by_handle.get(&handle).copied() else {
            return false;
        };
        match self.nodes[idx].parent {
            Some(p) => self.nodes[p].children.retain(|&c| c != idx),
            None => self.roots.retain(|&r| r != idx),
        }
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            if let NodeData::Element(el) = &self.nodes[i].data {
                self.by_handle.remove(&el.handle);
            }
            stack.extend(self.nodes[i].children.iter().copied());
        }
        true
    }

    /// Number of attached elements.
    pub fn element_count(&self) -> usize {
        self.by_handle.len()
    }

    /// Arena index of an attached element.
    pub fn index_of(&self, handle: NodeHandle) -> Option<usize> {
        self.by_handle.get(&handle).copied()
    }

    /// Look up an attached element by handle.
    pub fn get(&self, handle: NodeHandle) -> Option<ElementRef<'_>> {
        self.index_of(handle).map(|idx| ElementRef { tree: self, idx })
    }

    /// Mutable access to an element's captured facts.
    pub fn element_mut(&mut self, handle: NodeHandle) -> Option<&mut ElementData> {
        let idx = self.index_of(handle)?;
        match &mut self.nodes[idx].data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    /// Top-level elements in document order.
    pub fn root_elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.roots
            .iter()
            .filter(|&&i| matches!(self.nodes[i].data, NodeData::Element(_)))
            .map(move |&idx| ElementRef { tree: self, idx })
    }

    /// Every attached element in document order.
    pub fn elements(&self) -> Vec<ElementRef<'_>> {
        let mut out = Vec::new();
        for root in self.root_elements() {
            out.push(root);
            out.extend(root.descendants());
        }
        out
    }

    /// Every attached element satisfying `pred`, in document order.
    pub fn select<F>(&self, pred: F) -> Vec<ElementRef<'_>>
    where
        F: Fn(&ElementRef<'_>) -> bool,
    {
        self.elements().into_iter().filter(|e| pred(e)).collect()
    }

    /// First element matching a CSS selector. `None` for an invalid
    /// selector.
    pub fn query(&self, selector: &str) -> Option<ElementRef<'_>> {
        self.query_all(selector).into_iter().next()
    }

    /// Every element matching a CSS selector, in document order.
    ///
    /// The snapshot is serialized with its handles and matched by
    /// `scraper`, so the full selector grammar is available.
    pub fn query_all(&self, selector: &str) -> Vec<ElementRef<'_>> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.to_html());
        let matches: Vec<ElementRef<'_>> = document
            .select(&selector)
            .filter_map(|el| el.value().attr(HANDLE_ATTR)?.parse::<u64>().ok())
            .filter_map(|n| self.get(NodeHandle(n)))
            .collect();
        matches
    }

    /// Serialize the attached elements as HTML, each stamped with its
    /// handle attribute.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.write_node(root, &mut out);
        }
        out
    }

    fn write_node(&self, idx: usize, out: &mut String) {
        let node = &self.nodes[idx];
        let el = match &node.data {
            NodeData::Text(text) => {
                out.push_str(&escape_text(text));
                return;
            }
            NodeData::Element(el) => el,
        };
        let _ = write!(out, "<{} {}=\"{}\"", el.tag, HANDLE_ATTR, el.handle.0);
        for (name, value) in &el.attrs {
            if name != HANDLE_ATTR {
                let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
            }
        }
        out.push('>');
        if VOID_TAGS.contains(&el.tag.as_str()) {
            return;
        }
        for &child in &node.children {
            self.write_node(child, out);
        }
        let _ = write!(out, "</{}>", el.tag);
    }

    fn element_data(&self, idx: usize) -> &ElementData {
        match &self.nodes[idx].data {
            NodeData::Element(el) => el,
            // ElementRef is only ever built for element indices.
            NodeData::Text(_) => unreachable!("ElementRef points at a text node"),
        }
    }
}

/// Borrowed view of one element inside a [`DomTree`].
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    tree: &'a DomTree,
    idx: usize,
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("handle", &self.handle())
            .field("tag", &self.tag())
            .finish()
    }
}

impl PartialEq for ElementRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.idx == other.idx
    }
}

impl<'a> ElementRef<'a> {
    pub fn data(&self) -> &'a ElementData {
        self.tree.element_data(self.idx)
    }

    pub fn handle(&self) -> NodeHandle {
        self.data().handle
    }

    pub fn tag(&self) -> &'a str {
        &self.data().tag
    }

    /// Tag name comparison, case-insensitive.
    pub fn is(&self, tag: &str) -> bool {
        self.tag().eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.data().attrs.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&'a str> {
        self.attr("id")
    }

    pub fn classes(&self) -> impl Iterator<Item = &'a str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Class list contains exactly `class` (`.class` selector).
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Raw class attribute contains `needle` (`[class*=needle]` selector).
    pub fn class_contains(&self, needle: &str) -> bool {
        self.attr("class").is_some_and(|c| c.contains(needle))
    }

    pub fn value(&self) -> &'a str {
        self.data().value.as_deref().unwrap_or("")
    }

    pub fn is_visible(&self) -> bool {
        self.data().visible
    }

    pub fn is_displayed(&self) -> bool {
        !self.data().display_none
    }

    pub fn is_disabled(&self) -> bool {
        self.data().disabled
    }

    pub fn is_read_only(&self) -> bool {
        self.data().read_only
    }

    pub fn rect(&self) -> BoundingBox {
        self.data().rect
    }

    /// Concatenated text of every descendant text node (`textContent`).
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<usize> = self.tree.nodes[self.idx].children.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            let node = &self.tree.nodes[i];
            match &node.data {
                NodeData::Text(t) => out.push_str(t),
                NodeData::Element(_) => stack.extend(node.children.iter().rev().copied()),
            }
        }
        out
    }

    pub fn parent(&self) -> Option<ElementRef<'a>> {
        let p = self.tree.nodes[self.idx].parent?;
        match self.tree.nodes[p].data {
            NodeData::Element(_) => Some(ElementRef {
                tree: self.tree,
                idx: p,
            }),
            NodeData::Text(_) => None,
        }
    }

    /// Ancestors from the parent outwards.
    pub fn ancestors(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.parent(), |e| e.parent())
    }

    /// Element children in order.
    pub fn children(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let tree = self.tree;
        tree.nodes[self.idx]
            .children
            .iter()
            .filter(move |&&i| matches!(tree.nodes[i].data, NodeData::Element(_)))
            .map(move |&idx| ElementRef { tree, idx })
    }

    /// Element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<ElementRef<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.tree.nodes[self.idx].children.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            let node = &self.tree.nodes[i];
            if let NodeData::Element(_) = node.data {
                out.push(ElementRef {
                    tree: self.tree,
                    idx: i,
                });
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// First descendant matching `pred` (`querySelector`).
    pub fn find<F>(&self, pred: F) -> Option<ElementRef<'a>>
    where
        F: Fn(&ElementRef<'a>) -> bool,
    {
        self.descendants().into_iter().find(|e| pred(e))
    }

    /// All descendants matching `pred` (`querySelectorAll`).
    pub fn find_all<F>(&self, pred: F) -> Vec<ElementRef<'a>>
    where
        F: Fn(&ElementRef<'a>) -> bool,
    {
        self.descendants().into_iter().filter(|e| pred(e)).collect()
    }

    /// Nearest ancestor (or self) satisfying `pred`.
    pub fn closest<F>(&self, pred: F) -> Option<ElementRef<'a>>
    where
        F: Fn(&ElementRef<'a>) -> bool,
    {
        std::iter::once(*self).chain(self.ancestors()).find(|e| pred(e))
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
