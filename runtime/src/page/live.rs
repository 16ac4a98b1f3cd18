//! A page in a real browser tab.
//!
//! Snapshots are taken by a walker script that stamps every element with a
//! `data-tagger-node` attribute, so handles stay stable between snapshots.
//! Every other operation looks the element up by that stamp first and
//! reports `stale` when it is gone.

use super::{SyntheticEvent, TaggerPage};
use crate::dom::{BoundingBox, DomTree, ElementData, NodeHandle};
use crate::error::{Result, TagError};
use crate::renderer::RenderContext;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

const SNAPSHOT_JS: &str = r#"(() => {
  const root = document.body;
  if (!root) return { title: document.title || '', nodes: [] };
  if (typeof window.__taggerNextId !== 'number') window.__taggerNextId = 1;
  const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'svg']);
  const nodes = [];
  const walk = (node, parent) => {
    if (node.nodeType === Node.TEXT_NODE) {
      nodes.push({ kind: 'text', parent, text: node.nodeValue || '' });
      return;
    }
    if (node.nodeType !== Node.ELEMENT_NODE || SKIP.has(node.tagName)) return;
    let id = node.getAttribute('data-tagger-node');
    if (!id) {
      id = String(window.__taggerNextId++);
      node.setAttribute('data-tagger-node', id);
    }
    const attrs = {};
    for (const a of node.attributes) attrs[a.name] = a.value;
    const r = node.getBoundingClientRect();
    const style = window.getComputedStyle(node);
    const idx = nodes.length;
    nodes.push({
      kind: 'element',
      parent,
      handle: Number(id),
      tag: node.tagName.toLowerCase(),
      attrs,
      value: typeof node.value === 'string' ? node.value : null,
      visible: node.offsetParent !== null,
      displayNone: style.display === 'none',
      disabled: !!node.disabled,
      readOnly: !!node.readOnly,
      rect: { top: r.top, left: r.left, width: r.width, height: r.height },
    });
    for (const child of node.childNodes) walk(child, idx);
  };
  walk(root, null);
  return { title: document.title || '', nodes };
})()"#;

const OBSERVER_JS: &str = r#"(() => {
  if (!window.__taggerObserver && document.body) {
    window.__taggerMutations = 0;
    window.__taggerObserver = new MutationObserver(() => { window.__taggerMutations++; });
    window.__taggerObserver.observe(document.body, { childList: true, subtree: true });
  }
  return window.__taggerMutations || 0;
})()"#;

const DOCUMENT_ID_JS: &str = r#"(() => {
  if (typeof window.__taggerDocumentId !== 'number') {
    window.__taggerDocumentId = Date.now() * 1000 + Math.floor(Math.random() * 1000);
  }
  return window.__taggerDocumentId;
})()"#;

/// Snapshot payload produced by the walker script.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    title: String,
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawNode {
    Text {
        parent: Option<usize>,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Element {
        parent: Option<usize>,
        handle: u64,
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        value: Option<String>,
        visible: bool,
        display_none: bool,
        disabled: bool,
        read_only: bool,
        rect: BoundingBox,
    },
}

impl RawSnapshot {
    /// Rebuild the arena. The walker emits nodes in pre-order, so every
    /// parent index refers to an element already pushed.
    fn into_tree(self) -> DomTree {
        let mut tree = DomTree::new(self.title);
        // Walker index -> arena index.
        let mut index = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let mapped = match node {
                RawNode::Text { parent, text } => {
                    let parent = parent.and_then(|p| index.get(p).copied().flatten());
                    tree.push_text(parent, text);
                    None
                }
                RawNode::Element {
                    parent,
                    handle,
                    tag,
                    attrs,
                    value,
                    visible,
                    display_none,
                    disabled,
                    read_only,
                    rect,
                } => {
                    let parent = parent.and_then(|p| index.get(p).copied().flatten());
                    let mut data = ElementData::new(NodeHandle(handle), &tag);
                    data.attrs = attrs;
                    data.value = value;
                    data.visible = visible;
                    data.display_none = display_none;
                    data.disabled = disabled;
                    data.read_only = read_only;
                    data.rect = rect;
                    Some(tree.push_element(parent, data))
                }
            };
            index.push(mapped);
        }
        tree
    }
}

/// Wrap `body` so it runs against the element stamped with `node`.
/// `body` may reference `el` and must return an object with `ok: true`.
fn with_element(node: NodeHandle, body: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector('[data-tagger-node="{node}"]');
  if (!el) return {{ ok: false, stale: true }};
  try {{
    {body}
  }} catch (e) {{
    return {{ ok: false, error: String(e) }};
  }}
}})()"#
    )
}

fn event_script(event: &SyntheticEvent) -> String {
    match event {
        SyntheticEvent::Input { data: Some(data) } => format!(
            "el.dispatchEvent(new InputEvent('input', {{ bubbles: true, cancelable: true, data: '{}' }})); return {{ ok: true }};",
            sanitize_js_string(data)
        ),
        SyntheticEvent::Input { data: None } => {
            "el.dispatchEvent(new Event('input', { bubbles: true })); return { ok: true };".to_string()
        }
        SyntheticEvent::KeyDown { key, code } | SyntheticEvent::KeyUp { key, code } => format!(
            "el.dispatchEvent(new KeyboardEvent('{}', {{ key: '{}', code: '{}', bubbles: true, cancelable: true }})); return {{ ok: true }};",
            event.name(),
            sanitize_js_string(key),
            sanitize_js_string(code)
        ),
        SyntheticEvent::Change => {
            "el.dispatchEvent(new Event('change', { bubbles: true })); return { ok: true };".to_string()
        }
        SyntheticEvent::Focus => "el.focus(); return { ok: true };".to_string(),
        SyntheticEvent::Blur => "el.blur(); return { ok: true };".to_string(),
        SyntheticEvent::Click => "el.click(); return { ok: true };".to_string(),
        SyntheticEvent::MouseDown | SyntheticEvent::MouseUp => format!(
            "el.dispatchEvent(new MouseEvent('{}', {{ bubbles: true, cancelable: true, view: window }})); return {{ ok: true }};",
            event.name()
        ),
    }
}

/// Escape a string for embedding in a single-quoted JS literal.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\u{2028}' => result.push_str("\\u2028"),
            '\u{2029}' => result.push_str("\\u2029"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

/// Interpret the `{ok, stale, error, ...}` reply of a [`with_element`] script.
fn check_reply(node: NodeHandle, reply: Value) -> Result<Value> {
    if reply.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(reply);
    }
    if reply.get("stale").and_then(Value::as_bool) == Some(true) {
        return Err(TagError::StaleNode(node));
    }
    let message = reply
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("script returned no result");
    Err(TagError::Page(message.to_string()))
}

/// [`TaggerPage`] over a browser tab.
pub struct LivePage {
    ctx: Mutex<Box<dyn RenderContext>>,
}

impl LivePage {
    pub fn new(ctx: Box<dyn RenderContext>) -> Self {
        Self {
            ctx: Mutex::new(ctx),
        }
    }

    /// Navigate the tab and install the mutation counter.
    pub async fn open(&self, url: &str, timeout_ms: u64) -> Result<String> {
        let mut ctx = self.ctx.lock().await;
        let nav = ctx.navigate(url, timeout_ms).await?;
        ctx.execute_js(OBSERVER_JS).await?;
        tracing::info!(url = %nav.final_url, load_ms = nav.load_time_ms, "page loaded");
        Ok(nav.final_url)
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let ctx = self.ctx.lock().await;
        Ok(ctx.execute_js(script).await?)
    }

    async fn on_element(&self, node: NodeHandle, body: &str) -> Result<Value> {
        let reply = self.eval(&with_element(node, body)).await?;
        check_reply(node, reply)
    }
}

#[async_trait]
impl TaggerPage for LivePage {
    async fn snapshot(&self) -> Result<DomTree> {
        let raw: RawSnapshot = serde_json::from_value(self.eval(SNAPSHOT_JS).await?)?;
        Ok(raw.into_tree())
    }

    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<()> {
        let body = format!("el.value = '{}'; return {{ ok: true }};", sanitize_js_string(value));
        self.on_element(node, &body).await.map(|_| ())
    }

    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<()> {
        self.on_element(node, &event_script(event)).await.map(|_| ())
    }

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()> {
        self.on_element(
            node,
            "el.scrollIntoView({ behavior: 'smooth', block: 'nearest' }); return { ok: true };",
        )
        .await
        .map(|_| ())
    }

    async fn resolve_selector(&self, selector: &str) -> Result<Option<NodeHandle>> {
        let script = format!(
            r#"(() => {{
  let el;
  try {{ el = document.querySelector('{}'); }} catch (e) {{ return null; }}
  if (!el) return null;
  if (typeof window.__taggerNextId !== 'number') window.__taggerNextId = 1;
  let id = el.getAttribute('data-tagger-node');
  if (!id) {{ id = String(window.__taggerNextId++); el.setAttribute('data-tagger-node', id); }}
  return Number(id);
}})()"#,
            sanitize_js_string(selector)
        );
        let reply = self.eval(&script).await?;
        Ok(reply.as_u64().map(NodeHandle))
    }

    async fn read_value(&self, node: NodeHandle) -> Result<String> {
        let reply = self
            .on_element(
                node,
                "return { ok: true, value: typeof el.value === 'string' ? el.value : '' };",
            )
            .await?;
        Ok(reply
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn mutation_count(&self) -> Result<u64> {
        Ok(self.eval(OBSERVER_JS).await?.as_u64().unwrap_or(0))
    }

    async fn document_id(&self) -> Result<u64> {
        self.eval(DOCUMENT_ID_JS)
            .await?
            .as_u64()
            .ok_or_else(|| TagError::Page("document id is not a number".into()))
    }

    async fn url(&self) -> Result<String> {
        let ctx = self.ctx.lock().await;
        Ok(ctx.get_url().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_js_string() {
        assert_eq!(sanitize_js_string("O'Hare"), "O\\'Hare");
        assert_eq!(sanitize_js_string("</script>"), "\\x3c/script\\x3e");
        assert_eq!(sanitize_js_string("a\nb\0"), "a\\nb");
        assert_eq!(sanitize_js_string("San Sebastián"), "San Sebastián");
    }

    #[test]
    fn test_raw_snapshot_into_tree() {
        let raw: RawSnapshot = serde_json::from_value(json!({
            "title": "Trip",
            "nodes": [
                {"kind": "element", "parent": null, "handle": 1, "tag": "body", "attrs": {},
                 "value": null, "visible": false, "displayNone": false, "disabled": false,
                 "readOnly": false, "rect": {"top": 0, "left": 0, "width": 800, "height": 600}},
                {"kind": "element", "parent": 0, "handle": 5, "tag": "input",
                 "attrs": {"class": "itidestination"}, "value": "Rome", "visible": true,
                 "displayNone": false, "disabled": false, "readOnly": true,
                 "rect": {"top": 10, "left": 20, "width": 100, "height": 30}},
                {"kind": "text", "parent": 0, "text": "Day 1"}
            ]
        }))
        .unwrap();
        let tree = raw.into_tree();
        assert_eq!(tree.title(), "Trip");
        let input = tree.get(NodeHandle(5)).unwrap();
        assert_eq!(input.value(), "Rome");
        assert!(input.is_read_only());
        assert_eq!(input.rect().left, 20.0);
        assert_eq!(input.parent().unwrap().handle(), NodeHandle(1));
        assert_eq!(tree.get(NodeHandle(1)).unwrap().text(), "Day 1");
    }

    #[test]
    fn test_check_reply() {
        let node = NodeHandle(3);
        assert!(check_reply(node, json!({"ok": true})).is_ok());
        assert!(matches!(
            check_reply(node, json!({"ok": false, "stale": true})),
            Err(TagError::StaleNode(NodeHandle(3)))
        ));
        assert!(matches!(
            check_reply(node, json!({"ok": false, "error": "TypeError"})),
            Err(TagError::Page(m)) if m == "TypeError"
        ));
        assert!(check_reply(node, Value::Null).is_err());
    }

    #[test]
    fn test_event_scripts() {
        let typed = event_script(&SyntheticEvent::Input {
            data: Some("'".into()),
        });
        assert!(typed.contains("InputEvent('input'"));
        assert!(typed.contains("data: '\\''"));
        let key = event_script(&SyntheticEvent::KeyUp {
            key: "a".into(),
            code: "KeyA".into(),
        });
        assert!(key.contains("KeyboardEvent('keyup'"));
        assert!(event_script(&SyntheticEvent::Click).contains("el.click()"));
    }

    #[test]
    fn test_with_element_embeds_handle() {
        let script = with_element(NodeHandle(42), "return { ok: true };");
        assert!(script.contains(r#"[data-tagger-node="42"]"#));
    }
}
