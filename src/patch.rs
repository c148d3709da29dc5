//! Patch representation
//!
//! Output of the diff engine. Each patch is addressed by the preorder
//! position of its target in the OLD tree (root = 0). A patch list is
//! sorted by index, consumed once by the applier, then dropped.
//!
//! Author: Moroya Sakamoto

use std::fmt;
use std::rc::Rc;

use crate::dom::{Dom, LiveNode};
use crate::facts::FactsDiff;
use crate::node::{MapperChain, Node};

/// Index into [`Reorder::entries`].
pub type EntryId = usize;

/// One instruction against the live tree.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Preorder position in the old tree.
    pub index: usize,
    pub kind: PatchKind,
}

/// Closed set of patch kinds.
#[derive(Debug, Clone)]
pub enum PatchKind {
    /// Replace the node wholesale.
    Redraw(Node),
    /// Replace a text node's character data.
    SetText(String),
    /// Apply a fact diff.
    Facts(FactsDiff),
    /// Patches for a thunk's subtree, indexed from the thunk's own root.
    EnterThunk(Vec<Patch>),
    /// Replace the mapper chain of a tagger.
    Retag(MapperChain),
    /// Drop the last `count` children, keeping `from` of them.
    RemoveTrailing { from: usize, count: usize },
    /// Render and append `nodes[from..]`.
    AppendTrailing { from: usize, nodes: Vec<Node> },
    /// Keyed children reconciliation for one parent.
    ReorderKeyed(Reorder),
    /// Detach a keyed child. `Some` when the node is re-inserted elsewhere.
    RemoveKeyed(Option<KeyedMove>),
    /// Widget-defined patch.
    Custom(CustomPatch),
}

impl PatchKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatchKind::Redraw(_) => "redraw",
            PatchKind::SetText(_) => "set-text",
            PatchKind::Facts(_) => "facts",
            PatchKind::EnterThunk(_) => "enter-thunk",
            PatchKind::Retag(_) => "retag",
            PatchKind::RemoveTrailing { .. } => "remove-trailing",
            PatchKind::AppendTrailing { .. } => "append-trailing",
            PatchKind::ReorderKeyed(_) => "reorder-keyed",
            PatchKind::RemoveKeyed(_) => "remove-keyed",
            PatchKind::Custom(_) => "custom",
        }
    }
}

// ── Keyed reorder payload ──────────────────────────────────────────────

/// A new keyed child, either rendered fresh or reusing a detached node.
#[derive(Debug, Clone)]
pub struct Entry {
    pub node: Node,
    /// True when the live node comes from a matching `RemoveKeyed`.
    pub moved: bool,
}

/// Positioned insert, executed in ascending `position` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insert {
    /// Child position in the new list.
    pub position: usize,
    pub entry: EntryId,
}

/// Removal half of a keyed move.
#[derive(Debug, Clone)]
pub struct KeyedMove {
    pub entry: EntryId,
    /// Diff of the removed node against its new version, indexed from the
    /// removed node's old position.
    pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, Default)]
pub struct Reorder {
    /// In-place diffs of children that kept their relative order.
    pub patches: Vec<Patch>,
    /// `RemoveKeyed` patches, sorted by index.
    pub removals: Vec<Patch>,
    pub inserts: Vec<Insert>,
    /// Appended as one batch after all positioned inserts.
    pub end_inserts: Vec<EntryId>,
    pub entries: Vec<Entry>,
}

impl Reorder {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
            && self.removals.is_empty()
            && self.inserts.is_empty()
            && self.end_inserts.is_empty()
    }

    /// Number of keyed children reused rather than re-rendered.
    pub fn move_count(&self) -> usize {
        self.entries.iter().filter(|e| e.moved).count()
    }
}

// ── Custom widget patches ──────────────────────────────────────────────

/// Widget-defined update. Returns the node now standing in for the widget.
#[derive(Clone)]
pub struct CustomPatch(Rc<dyn Fn(&mut dyn Dom, LiveNode) -> LiveNode>);

impl CustomPatch {
    pub fn new(f: impl Fn(&mut dyn Dom, LiveNode) -> LiveNode + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn apply(&self, dom: &mut dyn Dom, node: LiveNode) -> LiveNode {
        (self.0)(dom, node)
    }
}

impl fmt::Debug for CustomPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomPatch({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Total patches, counting nested thunk, reorder and move sub-lists.
pub fn patch_count(patches: &[Patch]) -> usize {
    patches
        .iter()
        .map(|p| {
            1 + match &p.kind {
                PatchKind::EnterThunk(sub) => patch_count(sub),
                PatchKind::ReorderKeyed(r) => patch_count(&r.patches) + patch_count(&r.removals),
                PatchKind::RemoveKeyed(Some(mv)) => patch_count(&mv.patches),
                _ => 0,
            }
        })
        .sum()
}
