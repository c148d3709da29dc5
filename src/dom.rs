//! Host capability: the live render tree
//!
//! The engine never touches a concrete document. Every mutation it performs
//! goes through the [`Dom`] trait, implemented by the host (a browser
//! binding, a native widget tree, or the in-memory [`MemoryDom`]).
//! Live nodes are opaque [`LiveNode`] handles chosen by the host.
//!
//! [`MemoryDom`]: crate::memory::MemoryDom
//!
//! Author: Moroya Sakamoto

use serde_json::Value;

/// Opaque handle to a node in the host's live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveNode(pub u64);

/// Handle the engine gives the host for a registered event listener.
///
/// The host stores it alongside the native listener and hands it back to
/// [`Renderer::dispatch_event`](crate::renderer::Renderer::dispatch_event)
/// when the event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    /// Raw value (for host-side bookkeeping only).
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Options passed with `add_listener`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListenerOptions {
    /// `Some(passive)` when the host supports passive listeners, else `None`.
    pub passive: Option<bool>,
}

/// Read-only view of a live node, used to virtualize existing markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeView {
    Text(String),
    Element {
        tag: String,
        namespace: Option<String>,
        attributes: Vec<(String, String)>,
    },
    /// Comments, fragments, anything that is neither text nor element.
    Other,
}

/// Primitive live-tree operations supplied by the host.
///
/// Insertion follows document semantics: inserting a node that already has
/// a parent moves it, and inserting a fragment moves the fragment's children
/// (leaving the fragment empty).
pub trait Dom {
    // ── Creation ──────────────────────────────────────────────────────

    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> LiveNode;
    fn create_text(&mut self, text: &str) -> LiveNode;
    fn create_fragment(&mut self) -> LiveNode;

    // ── Content & facts ───────────────────────────────────────────────

    /// Replace the character data of a text node.
    fn set_text(&mut self, node: LiveNode, text: &str);

    /// Current value of a DOM property, if the host tracks it.
    fn property(&self, node: LiveNode, key: &str) -> Option<Value>;
    fn set_property(&mut self, node: LiveNode, key: &str, value: &Value);

    fn set_attribute(&mut self, node: LiveNode, key: &str, value: &str);
    fn remove_attribute(&mut self, node: LiveNode, key: &str);
    fn set_attribute_ns(&mut self, node: LiveNode, namespace: &str, key: &str, value: &str);
    fn remove_attribute_ns(&mut self, node: LiveNode, namespace: &str, key: &str);

    /// Set an inline style. An empty `value` removes the style.
    fn set_style(&mut self, node: LiveNode, key: &str, value: &str);

    fn add_listener(
        &mut self,
        node: LiveNode,
        event: &str,
        listener: ListenerId,
        options: ListenerOptions,
    );
    fn remove_listener(&mut self, node: LiveNode, event: &str, listener: ListenerId);

    // ── Topology ──────────────────────────────────────────────────────

    /// Insert `child` before `reference`, or at the end when `reference` is `None`.
    fn insert_before(&mut self, parent: LiveNode, child: LiveNode, reference: Option<LiveNode>);
    fn remove_child(&mut self, parent: LiveNode, child: LiveNode);
    fn replace_child(&mut self, parent: LiveNode, new_child: LiveNode, old_child: LiveNode);

    fn parent(&self, node: LiveNode) -> Option<LiveNode>;
    fn child_at(&self, node: LiveNode, position: usize) -> Option<LiveNode>;
    fn child_count(&self, node: LiveNode) -> usize;

    fn append_child(&mut self, parent: LiveNode, child: LiveNode) {
        self.insert_before(parent, child, None);
    }

    fn last_child(&self, node: LiveNode) -> Option<LiveNode> {
        match self.child_count(node) {
            0 => None,
            n => self.child_at(node, n - 1),
        }
    }

    /// True if `node` is `ancestor` or lies beneath it.
    fn contains(&self, ancestor: LiveNode, node: LiveNode) -> bool {
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    // ── Inspection ────────────────────────────────────────────────────

    fn inspect(&self, node: LiveNode) -> NodeView;

    /// Feature probe, read once into [`Capabilities`](crate::renderer::Capabilities).
    fn supports_passive_listeners(&self) -> bool {
        false
    }
}
