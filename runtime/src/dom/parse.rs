//! Static HTML to [`DomTree`] conversion.
//!
//! Used for offline extraction and for the in-memory page. There is no
//! layout engine here, so layout facts come from markup conventions:
//! `hidden`, `style="display:none"` and `type="hidden"` make an element
//! invisible, and `data-rect="top,left,width,height"` supplies its box.

use super::{BoundingBox, DomTree, ElementData, NodeHandle, HANDLE_ATTR};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Parse a full HTML document. The `<body>` becomes the single root.
pub fn parse_html(html: &str) -> DomTree {
    let document = Html::parse_document(html);
    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut tree = DomTree::new(title);
    let mut builder = Builder::new(document.root_element(), 1);

    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());
    match body {
        Some(body) => builder.element(&mut tree, None, body, true, false),
        None => builder.element(&mut tree, None, document.root_element(), true, false),
    };
    tree
}

/// Parse `html` as a fragment and append its top-level elements under
/// `parent`. Returns the handles of the appended top-level elements, or
/// `None` if `parent` is not attached.
pub fn append_html(tree: &mut DomTree, parent: NodeHandle, html: &str) -> Option<Vec<NodeHandle>> {
    let parent_idx = tree.index_of(parent)?;
    let parent_visible = tree.get(parent).map(|p| p.is_visible()).unwrap_or(true);
    let parent_none = tree.get(parent).map(|p| !p.is_displayed()).unwrap_or(false);

    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();
    let mut builder = Builder::new(root, tree.next_handle().0);
    let mut appended = Vec::new();
    for child in root.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    if let Some(handle) =
                        builder.element(tree, Some(parent_idx), el, parent_visible, parent_none)
                    {
                        appended.push(handle);
                    }
                }
            }
            Node::Text(text) => {
                let text: &str = text;
                tree.push_text(Some(parent_idx), text);
            }
            _ => {}
        }
    }
    Some(appended)
}

struct Builder {
    next: u64,
    reserved: HashSet<u64>,
}

impl Builder {
    fn new(scope: ElementRef<'_>, start: u64) -> Self {
        let reserved = scope
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter_map(|e| e.value().attr(HANDLE_ATTR))
            .filter_map(|v| v.trim().parse::<u64>().ok())
            .collect();
        Self {
            next: start.max(1),
            reserved,
        }
    }

    fn allocate(&mut self, declared: Option<&str>) -> NodeHandle {
        if let Some(n) = declared.and_then(|v| v.trim().parse::<u64>().ok()) {
            return NodeHandle(n);
        }
        while self.reserved.contains(&self.next) {
            self.next += 1;
        }
        let handle = NodeHandle(self.next);
        self.next += 1;
        handle
    }

    fn element(
        &mut self,
        tree: &mut DomTree,
        parent: Option<usize>,
        el: ElementRef<'_>,
        parent_visible: bool,
        parent_none: bool,
    ) -> Option<NodeHandle> {
        let raw = el.value();
        let tag = raw.name().to_ascii_lowercase();
        if SKIPPED_TAGS.contains(&tag.as_str()) {
            return None;
        }

        let handle = self.allocate(raw.attr(HANDLE_ATTR));
        let mut data = ElementData::new(handle, &tag);
        for (name, value) in raw.attrs() {
            data.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        }
        data.attrs
            .insert(HANDLE_ATTR.to_string(), handle.0.to_string());

        let own_none = raw.attr("hidden").is_some() || style_hides(raw.attr("style"));
        data.display_none = own_none;
        let type_hidden = tag == "input"
            && raw
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
        data.visible = parent_visible && !parent_none && !own_none && !type_hidden;
        data.disabled = raw.attr("disabled").is_some();
        data.read_only = raw.attr("readonly").is_some();
        if let Some(rect) = raw.attr("data-rect").and_then(parse_rect) {
            data.rect = rect;
        }
        data.value = match tag.as_str() {
            "input" => Some(raw.attr("value").unwrap_or("").to_string()),
            "textarea" => Some(el.text().collect()),
            _ => None,
        };

        let visible = data.visible;
        let idx = tree.push_element(parent, data);
        for child in el.children() {
            match child.value() {
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(tree, Some(idx), child_el, visible, false);
                    }
                }
                Node::Text(text) => {
                    let text: &str = text;
                    tree.push_text(Some(idx), text);
                }
                _ => {}
            }
        }
        Some(handle)
    }
}

fn style_hides(style: Option<&str>) -> bool {
    style.is_some_and(|s| {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        compact.to_ascii_lowercase().contains("display:none")
    })
}

fn parse_rect(raw: &str) -> Option<BoundingBox> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [top, left, width, height] => Some(BoundingBox {
            top: *top,
            left: *left,
            width: *width,
            height: *height,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Spain Highlights</title></head><body>
        <div class="itinerary-holder">
          <div class="itinerary-title">Day 1</div>
          <input type="text" class="itidestination" value="Bilbao" data-rect="120,40,200,30">
          <input type="hidden" name="token" value="x">
          <script>var x = 1;</script>
        </div>
        <div style="display: none"><input type="text" id="ghost"></div>
        <textarea id="notes">free text</textarea>
    </body></html>"#;

    #[test]
    fn test_title_and_body_root() {
        let tree = parse_html(PAGE);
        assert_eq!(tree.title(), "Spain Highlights");
        let roots: Vec<_> = tree.root_elements().collect();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is("body"));
    }

    #[test]
    fn test_form_values_and_rect() {
        let tree = parse_html(PAGE);
        let input = tree.query("input.itidestination").unwrap();
        assert_eq!(input.value(), "Bilbao");
        assert_eq!(input.rect().top, 120.0);
        assert_eq!(input.rect().width, 200.0);
        assert_eq!(tree.query("#notes").unwrap().value(), "free text");
    }

    #[test]
    fn test_visibility_rules() {
        let tree = parse_html(PAGE);
        assert!(tree.query("input.itidestination").unwrap().is_visible());
        assert!(!tree.query("[name=token]").unwrap().is_visible());
        let ghost = tree.query("#ghost").unwrap();
        assert!(!ghost.is_visible());
        assert!(ghost.is_displayed());
    }

    #[test]
    fn test_scripts_are_skipped() {
        let tree = parse_html(PAGE);
        assert!(tree.query("script").is_none());
        let holder = tree.query(".itinerary-holder").unwrap();
        assert!(!holder.text().contains("var x"));
    }

    #[test]
    fn test_declared_handles_are_kept() {
        let tree = parse_html(
            r#"<body><div data-tagger-node="7"><span>a</span></div><p>b</p></body>"#,
        );
        let div = tree.query("div").unwrap();
        assert_eq!(div.handle(), NodeHandle(7));
        let handles: Vec<u64> = tree.elements().iter().map(|e| e.handle().0).collect();
        let unique: HashSet<u64> = handles.iter().copied().collect();
        assert_eq!(unique.len(), handles.len());
    }

    #[test]
    fn test_append_fragment() {
        let mut tree = parse_html(r#"<body><div id="host"></div></body>"#);
        let host = tree.query("#host").unwrap().handle();
        let added = append_html(
            &mut tree,
            host,
            r#"<div class="suggestionbox"><div class="suggestionbox-item">Paris, France</div></div>"#,
        )
        .unwrap();
        assert_eq!(added.len(), 1);
        let item = tree.query(".suggestionbox-item").unwrap();
        assert_eq!(item.text(), "Paris, France");
        assert_eq!(item.parent().unwrap().handle(), added[0]);
        assert!(append_html(&mut tree, NodeHandle(999), "<p></p>").is_none());
    }
}
