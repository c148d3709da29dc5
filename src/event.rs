//! Event registry and dispatch contexts
//!
//! Tagger chains become dispatch contexts stored in a generational arena.
//! Each context owns its mapper chain and a non-owning [`ContextId`] to
//! the context it was rendered inside. Live nodes that sit directly under
//! one or more taggers carry a binding stack of context ids, outermost
//! first, so a `Retag` patch can rewrite the right one in place.
//!
//! Listeners are registered per `(live node, event name)` and remember the
//! innermost context in effect where they were attached. Dispatch decodes
//! the native payload, then remaps the message innermost mapper first,
//! walking parent links out to the root.
//!
//! The applier hands every subtree it detaches for good to
//! [`Registry::release`], so bookkeeping cost follows the patch set.
//! [`Registry::sweep`] is the full mark-sweep over live listeners and
//! bindings, for hosts that mutate the live tree behind the renderer's back.
//!
//! Author: Moroya Sakamoto

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;
use smallvec::SmallVec;

use crate::dom::{Dom, ListenerId, LiveNode};
use crate::error::RenderError;
use crate::facts::{Handler, HandlerKind};
use crate::node::{MapperChain, Message};

// ── Context arena ──────────────────────────────────────────────────────

/// Handle to a dispatch context. Stale handles fail lookup after the slot
/// is reclaimed and reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId {
    idx: u32,
    generation: u32,
}

impl ContextId {
    #[inline]
    pub fn index(self) -> u32 {
        self.idx
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({}@gen{})", self.idx, self.generation)
    }
}

/// Mapper chain of one collapsed tagger run.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Outermost first; applied in reverse.
    pub mappers: MapperChain,
    /// Context this one was rendered inside. `None` only for the root.
    pub parent: Option<ContextId>,
}

struct Slot {
    generation: u32,
    context: Option<DispatchContext>,
}

struct Listener {
    node: LiveNode,
    event: String,
    handler: Handler,
    context: ContextId,
}

/// Decoded and remapped event, ready for the application.
pub struct Routed {
    pub message: Message,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

// ── Sweep Result ───────────────────────────────────────────────────────

/// Statistics from one [`Registry::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Listeners still attached under the root.
    pub retained: usize,
    pub listeners_collected: usize,
    pub bindings_collected: usize,
    pub contexts_collected: usize,
}

impl SweepResult {
    #[inline]
    pub fn did_collect(&self) -> bool {
        self.listeners_collected + self.bindings_collected + self.contexts_collected > 0
    }
}

// ── Registry ───────────────────────────────────────────────────────────

/// Listener and dispatch-context bookkeeping for one render root.
pub struct Registry {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: ContextId,
    bindings: HashMap<LiveNode, SmallVec<[ContextId; 1]>>,
    listeners: HashMap<ListenerId, Listener>,
    by_node: HashMap<LiveNode, HashMap<String, ListenerId>>,
    next_listener: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            root: ContextId {
                idx: 0,
                generation: 0,
            },
            bindings: HashMap::new(),
            listeners: HashMap::new(),
            by_node: HashMap::new(),
            next_listener: 0,
        };
        registry.root = registry.spawn(MapperChain::new(), None);
        registry
    }

    /// Context with no mappers, parent of every top-level tagger.
    #[inline]
    pub fn root(&self) -> ContextId {
        self.root
    }

    // -- Contexts --

    pub fn spawn(&mut self, mappers: MapperChain, parent: Option<ContextId>) -> ContextId {
        let context = Some(DispatchContext { mappers, parent });
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.context = context;
            return ContextId {
                idx,
                generation: slot.generation,
            };
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            context,
        });
        ContextId { idx, generation: 0 }
    }

    pub fn context(&self, id: ContextId) -> Option<&DispatchContext> {
        self.slots
            .get(id.idx as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.context.as_ref())
    }

    fn context_mut(&mut self, id: ContextId) -> Option<&mut DispatchContext> {
        self.slots
            .get_mut(id.idx as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.context.as_mut())
    }

    pub fn context_count(&self) -> usize {
        self.slots.iter().filter(|s| s.context.is_some()).count()
    }

    // -- Bindings --

    /// Contexts bound to `node`, outermost first.
    pub fn bindings(&self, node: LiveNode) -> &[ContextId] {
        self.bindings.get(&node).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Context bound at `depth` of `node`'s stack.
    pub fn context_at(&self, node: LiveNode, depth: usize) -> Option<ContextId> {
        self.bindings(node).get(depth).copied()
    }

    /// Bind `context` outside every context already bound to `node`.
    pub fn prepend(&mut self, node: LiveNode, context: ContextId) {
        self.bindings.entry(node).or_default().insert(0, context);
    }

    /// Give `to` the outer `depth` bindings of `from`, outside its own.
    pub fn carry(&mut self, from: LiveNode, to: LiveNode, depth: usize) {
        if depth == 0 || from == to {
            return;
        }
        let outer: SmallVec<[ContextId; 1]> = self
            .bindings(from)
            .iter()
            .take(depth)
            .copied()
            .collect();
        if outer.is_empty() {
            return;
        }
        let stack = self.bindings.entry(to).or_default();
        stack.insert_many(0, outer);
    }

    /// Replace the mapper chain bound at `depth` of `node`, or bind a new
    /// context there if none exists.
    pub fn retag(&mut self, node: LiveNode, depth: usize, mappers: MapperChain, parent: ContextId) {
        if let Some(id) = self.context_at(node, depth) {
            if let Some(context) = self.context_mut(id) {
                context.mappers = mappers;
                return;
            }
        }
        let id = self.spawn(mappers, Some(parent));
        let stack = self.bindings.entry(node).or_default();
        let at = depth.min(stack.len());
        if at < stack.len() {
            stack[at] = id;
        } else {
            stack.push(id);
        }
    }

    // -- Listeners --

    pub fn listen(
        &mut self,
        node: LiveNode,
        event: &str,
        handler: Handler,
        context: ContextId,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(
            id,
            Listener {
                node,
                event: event.to_owned(),
                handler,
                context,
            },
        );
        self.by_node
            .entry(node)
            .or_default()
            .insert(event.to_owned(), id);
        id
    }

    pub fn listener_for(&self, node: LiveNode, event: &str) -> Option<ListenerId> {
        self.by_node.get(&node)?.get(event).copied()
    }

    pub fn handler_kind(&self, id: ListenerId) -> Option<HandlerKind> {
        self.listeners.get(&id).map(|l| l.handler.kind())
    }

    /// Keep the native listener, change what it decodes.
    pub fn swap_handler(&mut self, id: ListenerId, handler: Handler) {
        if let Some(listener) = self.listeners.get_mut(&id) {
            listener.handler = handler;
        }
    }

    pub fn unlisten(&mut self, id: ListenerId) {
        let Some(listener) = self.listeners.remove(&id) else {
            return;
        };
        if let Some(events) = self.by_node.get_mut(&listener.node) {
            events.remove(&listener.event);
            if events.is_empty() {
                self.by_node.remove(&listener.node);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // -- Dispatch --

    /// Decode `event` for `listener` and remap the message outward.
    ///
    /// `Ok(None)` when the decoder rejects the payload or the listener's
    /// context chain has been reclaimed; the event is dropped either way.
    pub fn dispatch(
        &self,
        listener: ListenerId,
        event: &Value,
    ) -> Result<Option<Routed>, RenderError> {
        let entry = self
            .listeners
            .get(&listener)
            .ok_or(RenderError::UnknownListener(listener))?;

        let decoded = match entry.handler.decode(event) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(event = %entry.event, error = %e, "event dropped");
                return Ok(None);
            }
        };

        let mut message = decoded.message;
        let mut current = Some(entry.context);
        while let Some(id) = current {
            let Some(context) = self.context(id) else {
                tracing::debug!(
                    event = %entry.event,
                    context = ?id,
                    "stale dispatch context; event dropped"
                );
                return Ok(None);
            };
            for mapper in context.mappers.iter().rev() {
                message = mapper.apply(message);
            }
            current = context.parent;
        }

        Ok(Some(Routed {
            message,
            stop_propagation: decoded.stop_propagation,
            prevent_default: decoded.prevent_default,
        }))
    }

    // ── Release ────────────────────────────────────────────────────────

    /// Drop every registration inside the detached subtree at `node`.
    ///
    /// The outer `keep` bindings of `node` itself survive as contexts: a
    /// replacement node has already been given them by [`Registry::carry`].
    /// Every other context bound in the subtree was spawned for it and is
    /// freed.
    pub fn release(&mut self, dom: &dyn Dom, node: LiveNode, keep: usize) -> SweepResult {
        let mut result = SweepResult::default();
        let mut owned: SmallVec<[ContextId; 4]> = SmallVec::new();
        let mut pending = vec![node];

        while let Some(current) = pending.pop() {
            if let Some(events) = self.by_node.remove(&current) {
                for id in events.into_values() {
                    self.listeners.remove(&id);
                    result.listeners_collected += 1;
                }
            }
            if let Some(bound) = self.bindings.remove(&current) {
                let skip = if current == node { keep } else { 0 };
                owned.extend(bound.into_iter().skip(skip));
                result.bindings_collected += 1;
            }
            let children = (0..dom.child_count(current)).filter_map(|i| dom.child_at(current, i));
            pending.extend(children);
        }

        for id in owned {
            if self.free(id) {
                result.contexts_collected += 1;
            }
        }
        result.retained = self.listeners.len();
        if result.did_collect() {
            tracing::trace!(?node, ?result, "released detached subtree");
        }
        result
    }

    fn free(&mut self, id: ContextId) -> bool {
        if id == self.root {
            return false;
        }
        match self.slots.get_mut(id.idx as usize) {
            Some(slot) if slot.generation == id.generation && slot.context.is_some() => {
                slot.context = None;
                slot.generation += 1;
                self.free_list.push(id.idx);
                true
            }
            _ => false,
        }
    }

    // ── Mark-Sweep ─────────────────────────────────────────────────────

    /// Drop registrations for nodes no longer under `root`, then reclaim
    /// contexts no surviving registration can reach.
    ///
    /// 1. **Retain**: listeners and bindings whose node `root` contains.
    /// 2. **Mark**: the root context plus every context a survivor refers
    ///    to, following parent links.
    /// 3. **Sweep**: free unmarked slots and bump their generation.
    pub fn sweep(&mut self, dom: &dyn Dom, root: LiveNode) -> SweepResult {
        let listeners_before = self.listeners.len();
        let bindings_before = self.bindings.len();

        self.listeners.retain(|_, l| dom.contains(root, l.node));
        let listeners = &self.listeners;
        self.by_node.retain(|_, events| {
            events.retain(|_, id| listeners.contains_key(id));
            !events.is_empty()
        });
        self.bindings.retain(|node, _| dom.contains(root, *node));

        let reachable = self.mark();

        let mut contexts_collected = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.context.is_some() && !reachable.contains(&(idx as u32)) {
                slot.context = None;
                slot.generation += 1;
                self.free_list.push(idx as u32);
                contexts_collected += 1;
            }
        }

        let result = SweepResult {
            retained: self.listeners.len(),
            listeners_collected: listeners_before - self.listeners.len(),
            bindings_collected: bindings_before - self.bindings.len(),
            contexts_collected,
        };
        if result.did_collect() {
            tracing::debug!(?result, "registry sweep");
        }
        result
    }

    fn mark(&self) -> HashSet<u32> {
        let mut reachable = HashSet::new();
        let mut queue: Vec<ContextId> = vec![self.root];
        queue.extend(self.listeners.values().map(|l| l.context));
        queue.extend(self.bindings.values().flatten().copied());

        while let Some(id) = queue.pop() {
            let Some(context) = self.context(id) else {
                continue;
            };
            if reachable.insert(id.idx) {
                queue.extend(context.parent);
            }
        }

        reachable
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
