//! Patch locator
//!
//! Binds index-addressed patches to live nodes with one preorder walk of
//! the OLD virtual tree, in lockstep with the sorted patch list. A subtree
//! whose range `[low, low + descendants]` holds no pending index is skipped
//! without touching the live tree. Thunk, reorder and keyed-move sub-lists
//! get a nested pass with the same rule.
//!
//! Author: Moroya Sakamoto

use crate::dom::{Dom, LiveNode};
use crate::error::RenderError;
use crate::event::{ContextId, Registry};
use crate::node::{Node, NodeKind};
use crate::patch::{Patch, PatchKind};

/// A patch bound to its live target.
#[derive(Debug)]
pub(crate) struct Located<'p> {
    pub patch: &'p Patch,
    pub target: LiveNode,
    /// Dispatch context in effect at the target.
    pub context: ContextId,
    /// How many tagger bindings of `target` lie outside this patch.
    pub depth: usize,
    /// Bound sub-patches: thunk contents, in-place reorder diffs, or the
    /// diff carried by a keyed move.
    pub nested: Vec<Located<'p>>,
    /// Bound `RemoveKeyed` patches of a reorder.
    pub removals: Vec<Located<'p>>,
}

/// Bind `patches` against the live tree rooted at `live`, whose old
/// virtual shape is `old`.
pub(crate) fn locate<'p>(
    dom: &dyn Dom,
    registry: &Registry,
    live: LiveNode,
    old: &Node,
    patches: &'p [Patch],
    context: ContextId,
) -> Result<Vec<Located<'p>>, RenderError> {
    Walk::new(dom, registry, patches).run(live, old, 0, context, 0)
}

struct Walk<'a, 'p> {
    dom: &'a dyn Dom,
    registry: &'a Registry,
    patches: &'p [Patch],
    cursor: usize,
    out: Vec<Located<'p>>,
}

impl<'a, 'p> Walk<'a, 'p> {
    fn new(dom: &'a dyn Dom, registry: &'a Registry, patches: &'p [Patch]) -> Self {
        Self {
            dom,
            registry,
            patches,
            cursor: 0,
            out: Vec::with_capacity(patches.len()),
        }
    }

    fn run(
        mut self,
        live: LiveNode,
        vnode: &Node,
        low: usize,
        context: ContextId,
        depth: usize,
    ) -> Result<Vec<Located<'p>>, RenderError> {
        if !self.patches.is_empty() {
            self.walk(live, vnode, low, context, depth)?;
        }
        if self.cursor < self.patches.len() {
            tracing::warn!(
                unbound = self.patches.len() - self.cursor,
                "patches left unbound; descendant counts disagree with the tree"
            );
        }
        Ok(self.out)
    }

    fn pending(&self) -> Option<usize> {
        self.patches.get(self.cursor).map(|p| p.index)
    }

    fn walk(
        &mut self,
        live: LiveNode,
        vnode: &Node,
        low: usize,
        context: ContextId,
        depth: usize,
    ) -> Result<(), RenderError> {
        while let Some(patch) = self.patches.get(self.cursor) {
            if patch.index != low {
                break;
            }
            let located = self.bind(patch, live, vnode, low, context, depth)?;
            self.out.push(located);
            self.cursor += 1;
        }

        let high = low + vnode.descendant_count();
        match self.pending() {
            Some(index) if index <= high => {}
            _ => return Ok(()),
        }

        match vnode.kind() {
            NodeKind::Tagger(tagger) => {
                let (chain, child) = tagger.collapse();
                let inner = self.registry.context_at(live, depth).unwrap_or(context);
                self.walk(live, child, low + chain.len(), inner, depth + 1)
            }
            NodeKind::Element(element) => {
                self.walk_children(live, element.children.iter(), low, high, context)
            }
            NodeKind::Keyed(keyed) => {
                self.walk_children(live, keyed.children.iter().map(|(_, n)| n), low, high, context)
            }
            NodeKind::Text(_) | NodeKind::Thunk(_) | NodeKind::Custom(_) => Ok(()),
        }
    }

    fn walk_children<'n>(
        &mut self,
        live: LiveNode,
        children: impl Iterator<Item = &'n Node>,
        mut low: usize,
        high: usize,
        context: ContextId,
    ) -> Result<(), RenderError> {
        for (position, child) in children.enumerate() {
            low += 1;
            let next_low = low + child.descendant_count();
            let Some(index) = self.pending() else {
                return Ok(());
            };
            if index > high {
                return Ok(());
            }
            if low <= index && index <= next_low {
                let live_child = self
                    .dom
                    .child_at(live, position)
                    .ok_or(RenderError::MissingChild {
                        parent: live,
                        position,
                    })?;
                self.walk(live_child, child, low, context, 0)?;
            } else {
                tracing::trace!(low, high = next_low, "subtree skipped");
            }
            low = next_low;
        }
        Ok(())
    }

    fn bind(
        &self,
        patch: &'p Patch,
        live: LiveNode,
        vnode: &Node,
        low: usize,
        context: ContextId,
        depth: usize,
    ) -> Result<Located<'p>, RenderError> {
        let mut located = Located {
            patch,
            target: live,
            context,
            depth,
            nested: Vec::new(),
            removals: Vec::new(),
        };

        match &patch.kind {
            PatchKind::EnterThunk(sub) => {
                if let NodeKind::Thunk(thunk) = vnode.kind() {
                    located.nested = self.nested(sub, live, thunk.force(), 0, context, depth)?;
                }
            }
            PatchKind::ReorderKeyed(reorder) => {
                located.nested = self.nested(&reorder.patches, live, vnode, low, context, depth)?;
                located.removals =
                    self.nested(&reorder.removals, live, vnode, low, context, depth)?;
            }
            PatchKind::RemoveKeyed(Some(moved)) => {
                located.nested = self.nested(&moved.patches, live, vnode, low, context, depth)?;
            }
            _ => {}
        }

        Ok(located)
    }

    fn nested(
        &self,
        patches: &'p [Patch],
        live: LiveNode,
        vnode: &Node,
        low: usize,
        context: ContextId,
        depth: usize,
    ) -> Result<Vec<Located<'p>>, RenderError> {
        Walk::new(self.dom, self.registry, patches).run(live, vnode, low, context, depth)
    }
}
