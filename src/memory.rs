//! In-memory live tree
//!
//! Flat arena implementation of [`Dom`]: nodes live in one `Vec`, a
//! [`LiveNode`] is the slot index, and a parent index gives O(1) parent
//! lookup. Used by tests and by hosts that render to something other than
//! a browser document (snapshots, server-side markup).
//!
//! Reads through [`Dom::child_at`] are counted so callers can check how
//! much of the tree a patch pass actually visited.
//!
//! Author: Moroya Sakamoto

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde_json::Value;

use crate::dom::{Dom, ListenerId, ListenerOptions, LiveNode, NodeView};

/// What a memory node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemKind {
    Element { tag: String, namespace: Option<String> },
    Text(String),
    Fragment,
}

/// One node of the in-memory tree.
#[derive(Debug, Clone)]
pub struct MemNode {
    pub kind: MemKind,
    pub children: Vec<LiveNode>,
    pub attributes: BTreeMap<String, String>,
    /// `(namespace, key) → value`
    pub ns_attributes: BTreeMap<(String, String), String>,
    pub styles: BTreeMap<String, String>,
    pub properties: BTreeMap<String, Value>,
    pub listeners: BTreeMap<String, (ListenerId, ListenerOptions)>,
}

impl MemNode {
    fn new(kind: MemKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            ns_attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            properties: BTreeMap::new(),
            listeners: BTreeMap::new(),
        }
    }
}

/// Arena-backed [`Dom`].
#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: Vec<MemNode>,
    /// Maps child → parent for O(1) parent lookup
    parent_index: HashMap<LiveNode, LiveNode>,
    reads: Cell<usize>,
    passive_listeners: bool,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report passive listener support to [`Capabilities::detect`].
    ///
    /// [`Capabilities::detect`]: crate::renderer::Capabilities::detect
    pub fn with_passive_listeners(mut self, supported: bool) -> Self {
        self.passive_listeners = supported;
        self
    }

    fn alloc(&mut self, kind: MemKind) -> LiveNode {
        self.nodes.push(MemNode::new(kind));
        LiveNode((self.nodes.len() - 1) as u64)
    }

    pub fn node(&self, id: LiveNode) -> Option<&MemNode> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: LiveNode) -> Option<&mut MemNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    /// Nodes ever created, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: LiveNode) -> &[LiveNode] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Listener registered on `node` for `event`.
    pub fn listener(&self, node: LiveNode, event: &str) -> Option<ListenerId> {
        self.node(node)?.listeners.get(event).map(|(id, _)| *id)
    }

    /// `child_at` and `parent` calls since the last reset.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn reset_reads(&self) {
        self.reads.set(0);
    }

    fn detach(&mut self, child: LiveNode) {
        if let Some(parent) = self.parent_index.remove(&child) {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|&c| c != child);
            }
        }
    }

    fn is_fragment(&self, id: LiveNode) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(MemKind::Fragment))
    }

    // ── Serialisation ──────────────────────────────────────────────────

    /// Deterministic markup of the subtree at `id`, including properties,
    /// styles and listener names. Two trees with equal markup are
    /// observably equivalent.
    pub fn to_markup(&self, id: LiveNode) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: LiveNode, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            MemKind::Text(text) => out.push_str(text),
            MemKind::Fragment => {
                for &child in &node.children {
                    self.write_markup(child, out);
                }
            }
            MemKind::Element { tag, namespace } => {
                out.push('<');
                out.push_str(tag);
                if let Some(ns) = namespace {
                    let _ = write!(out, " xmlns=\"{ns}\"");
                }
                for (k, v) in &node.attributes {
                    let _ = write!(out, " {k}=\"{v}\"");
                }
                for ((ns, k), v) in &node.ns_attributes {
                    let _ = write!(out, " {{{ns}}}{k}=\"{v}\"");
                }
                if !node.styles.is_empty() {
                    out.push_str(" style=\"");
                    for (k, v) in &node.styles {
                        let _ = write!(out, "{k}:{v};");
                    }
                    out.push('"');
                }
                for (k, v) in &node.properties {
                    let _ = write!(out, " .{k}={v}");
                }
                for (event, (_, options)) in &node.listeners {
                    let _ = write!(out, " @{event}");
                    if options.passive == Some(true) {
                        out.push_str(".passive");
                    }
                }
                out.push('>');
                for &child in &node.children {
                    self.write_markup(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// Structural hash of a subtree (FNV-1a over its markup).
    pub fn subtree_hash(&self, id: LiveNode) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in self.to_markup(id).bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }
}

impl Dom for MemoryDom {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> LiveNode {
        self.alloc(MemKind::Element {
            tag: tag.to_owned(),
            namespace: namespace.map(str::to_owned),
        })
    }

    fn create_text(&mut self, text: &str) -> LiveNode {
        self.alloc(MemKind::Text(text.to_owned()))
    }

    fn create_fragment(&mut self) -> LiveNode {
        self.alloc(MemKind::Fragment)
    }

    fn set_text(&mut self, node: LiveNode, text: &str) {
        if let Some(MemNode {
            kind: MemKind::Text(current),
            ..
        }) = self.node_mut(node)
        {
            *current = text.to_owned();
        }
    }

    fn property(&self, node: LiveNode, key: &str) -> Option<Value> {
        self.node(node)?.properties.get(key).cloned()
    }

    /// `null` and `""` clear the property.
    fn set_property(&mut self, node: LiveNode, key: &str, value: &Value) {
        if let Some(n) = self.node_mut(node) {
            match value {
                Value::Null => {
                    n.properties.remove(key);
                }
                Value::String(s) if s.is_empty() => {
                    n.properties.remove(key);
                }
                _ => {
                    n.properties.insert(key.to_owned(), value.clone());
                }
            }
        }
    }

    fn set_attribute(&mut self, node: LiveNode, key: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            n.attributes.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove_attribute(&mut self, node: LiveNode, key: &str) {
        if let Some(n) = self.node_mut(node) {
            n.attributes.remove(key);
        }
    }

    fn set_attribute_ns(&mut self, node: LiveNode, namespace: &str, key: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            n.ns_attributes
                .insert((namespace.to_owned(), key.to_owned()), value.to_owned());
        }
    }

    fn remove_attribute_ns(&mut self, node: LiveNode, namespace: &str, key: &str) {
        if let Some(n) = self.node_mut(node) {
            n.ns_attributes
                .remove(&(namespace.to_owned(), key.to_owned()));
        }
    }

    fn set_style(&mut self, node: LiveNode, key: &str, value: &str) {
        if let Some(n) = self.node_mut(node) {
            if value.is_empty() {
                n.styles.remove(key);
            } else {
                n.styles.insert(key.to_owned(), value.to_owned());
            }
        }
    }

    fn add_listener(
        &mut self,
        node: LiveNode,
        event: &str,
        listener: ListenerId,
        options: ListenerOptions,
    ) {
        if let Some(n) = self.node_mut(node) {
            n.listeners.insert(event.to_owned(), (listener, options));
        }
    }

    fn remove_listener(&mut self, node: LiveNode, event: &str, listener: ListenerId) {
        if let Some(n) = self.node_mut(node) {
            if n.listeners.get(event).map(|(id, _)| *id) == Some(listener) {
                n.listeners.remove(event);
            }
        }
    }

    fn insert_before(&mut self, parent: LiveNode, child: LiveNode, reference: Option<LiveNode>) {
        let moving = if self.is_fragment(child) {
            let kids = self
                .node_mut(child)
                .map(|f| std::mem::take(&mut f.children))
                .unwrap_or_default();
            for kid in &kids {
                self.parent_index.remove(kid);
            }
            kids
        } else {
            self.detach(child);
            vec![child]
        };

        let Some(p) = self.node_mut(parent) else {
            return;
        };
        let at = reference
            .and_then(|r| p.children.iter().position(|&c| c == r))
            .unwrap_or(p.children.len());
        p.children.splice(at..at, moving.iter().copied());
        for node in moving {
            self.parent_index.insert(node, parent);
        }
    }

    fn remove_child(&mut self, parent: LiveNode, child: LiveNode) {
        if self.parent_index.get(&child) == Some(&parent) {
            self.detach(child);
        }
    }

    fn replace_child(&mut self, parent: LiveNode, new_child: LiveNode, old_child: LiveNode) {
        if new_child == old_child {
            return;
        }
        self.detach(new_child);
        let Some(p) = self.node_mut(parent) else {
            return;
        };
        if let Some(at) = p.children.iter().position(|&c| c == old_child) {
            p.children[at] = new_child;
            self.parent_index.remove(&old_child);
            self.parent_index.insert(new_child, parent);
        }
    }

    fn parent(&self, node: LiveNode) -> Option<LiveNode> {
        self.reads.set(self.reads.get() + 1);
        self.parent_index.get(&node).copied()
    }

    fn child_at(&self, node: LiveNode, position: usize) -> Option<LiveNode> {
        self.reads.set(self.reads.get() + 1);
        self.node(node)?.children.get(position).copied()
    }

    fn child_count(&self, node: LiveNode) -> usize {
        self.children(node).len()
    }

    fn last_child(&self, node: LiveNode) -> Option<LiveNode> {
        self.children(node).last().copied()
    }

    fn inspect(&self, node: LiveNode) -> NodeView {
        match self.node(node) {
            Some(MemNode {
                kind: MemKind::Text(t),
                ..
            }) => NodeView::Text(t.clone()),
            Some(MemNode {
                kind: MemKind::Element { tag, namespace },
                attributes,
                ..
            }) => NodeView::Element {
                tag: tag.clone(),
                namespace: namespace.clone(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
            _ => NodeView::Other,
        }
    }

    fn supports_passive_listeners(&self) -> bool {
        self.passive_listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> (MemoryDom, LiveNode, [LiveNode; 3]) {
        let mut dom = MemoryDom::new();
        let root = dom.create_element("ul", None);
        let kids = [
            dom.create_text("a"),
            dom.create_text("b"),
            dom.create_text("c"),
        ];
        for k in kids {
            dom.append_child(root, k);
        }
        (dom, root, kids)
    }

    #[test]
    fn test_append_and_markup() {
        let (dom, root, _) = tree();
        assert_eq!(dom.to_markup(root), "<ul>abc</ul>");
        assert_eq!(dom.child_count(root), 3);
    }

    #[test]
    fn test_insert_moves_existing_node() {
        let (mut dom, root, [a, _, c]) = tree();
        dom.insert_before(root, c, Some(a));
        assert_eq!(dom.to_markup(root), "<ul>cab</ul>");
        assert_eq!(dom.parent(c), Some(root));
    }

    #[test]
    fn test_fragment_moves_children() {
        let (mut dom, root, _) = tree();
        let frag = dom.create_fragment();
        let x = dom.create_text("x");
        let y = dom.create_text("y");
        dom.append_child(frag, x);
        dom.append_child(frag, y);
        dom.append_child(root, frag);
        assert_eq!(dom.to_markup(root), "<ul>abcxy</ul>");
        assert_eq!(dom.parent(x), Some(root));
        assert!(dom.children(frag).is_empty());
    }

    #[test]
    fn test_remove_and_replace() {
        let (mut dom, root, [a, b, _]) = tree();
        dom.remove_child(root, b);
        assert_eq!(dom.parent(b), None);
        let z = dom.create_text("z");
        dom.replace_child(root, z, a);
        assert_eq!(dom.to_markup(root), "<ul>zc</ul>");
        assert_eq!(dom.parent(a), None);
        assert!(!dom.contains(root, a));
        assert!(dom.contains(root, z));
    }

    #[test]
    fn test_facts_in_markup() {
        let mut dom = MemoryDom::new();
        let el = dom.create_element("input", None);
        dom.set_attribute(el, "id", "name");
        dom.set_style(el, "color", "red");
        dom.set_property(el, "value", &json!("hi"));
        dom.set_attribute_ns(el, "ns", "k", "v");
        dom.add_listener(
            el,
            "input",
            ListenerId(0),
            ListenerOptions {
                passive: Some(true),
            },
        );
        assert_eq!(
            dom.to_markup(el),
            concat!(
                "<input id=\"name\" {ns}k=\"v\" style=\"color:red;\" .value=\"hi\" ",
                "@input.passive></input>",
            )
        );

        dom.set_style(el, "color", "");
        dom.set_property(el, "value", &json!(""));
        dom.remove_attribute(el, "id");
        dom.remove_attribute_ns(el, "ns", "k");
        dom.remove_listener(el, "input", ListenerId(0));
        assert_eq!(dom.to_markup(el), "<input></input>");
    }

    #[test]
    fn test_reads_counted() {
        let (dom, root, _) = tree();
        assert_eq!(dom.reads(), 0);
        dom.child_at(root, 1);
        dom.child_at(root, 2);
        assert_eq!(dom.reads(), 2);
        dom.parent(root);
        assert_eq!(dom.reads(), 3);
        dom.reset_reads();
        assert_eq!(dom.reads(), 0);
    }

    #[test]
    fn test_inspect() {
        let mut dom = MemoryDom::new();
        let el = dom.create_element("DIV", None);
        dom.set_attribute(el, "id", "x");
        assert_eq!(
            dom.inspect(el),
            NodeView::Element {
                tag: "DIV".into(),
                namespace: None,
                attributes: vec![("id".into(), "x".into())],
            }
        );
        let f = dom.create_fragment();
        assert_eq!(dom.inspect(f), NodeView::Other);
    }

    #[test]
    fn test_subtree_hash() {
        let (dom, root, [a, ..]) = tree();
        let (other, other_root, _) = tree();
        assert_eq!(dom.subtree_hash(root), other.subtree_hash(other_root));
        assert_ne!(dom.subtree_hash(root), dom.subtree_hash(a));
    }
}
