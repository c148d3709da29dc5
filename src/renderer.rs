//! Render root
//!
//! A [`Renderer`] owns one mounted view: the live root node, the virtual
//! tree it was last rendered from, and the listener/context registry.
//! Each [`Renderer::update`] is one atomic diff → locate → apply pass.
//! Events coming back from the host go through
//! [`Renderer::dispatch_event`].
//!
//! Host feature detection lives in [`Capabilities`], built once and handed
//! in through [`RendererConfig`].
//!
//! Author: Moroya Sakamoto

use serde_json::Value;

use crate::apply::{apply_patches, Patcher};
use crate::diff::diff;
use crate::dom::{Dom, ListenerId, LiveNode};
use crate::error::RenderError;
use crate::event::{Registry, SweepResult};
use crate::node::{Message, Node};
use crate::patch::patch_count;
use crate::virtualize::virtualize;

// ── Configuration ──────────────────────────────────────────────────────

/// Host features probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Listeners may be registered with a `passive` flag.
    pub passive_listeners: bool,
}

impl Capabilities {
    pub fn detect(dom: &dyn Dom) -> Self {
        Self {
            passive_listeners: dom.supports_passive_listeners(),
        }
    }
}

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererConfig {
    pub capabilities: Capabilities,
    /// Run a full registry sweep after every update with patches.
    /// Detached subtrees are released by the applier regardless; this is
    /// only needed when the host removes rendered nodes on its own.
    pub sweep_after_update: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            sweep_after_update: false,
        }
    }
}

impl RendererConfig {
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn sweep_after_update(mut self, enabled: bool) -> Self {
        self.sweep_after_update = enabled;
        self
    }
}

// ── Results ────────────────────────────────────────────────────────────

/// Statistics of one update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Patches produced, nested ones included.
    pub patches: usize,
    /// True if the root live node was replaced.
    pub root_replaced: bool,
    pub sweep: Option<SweepResult>,
}

/// What the host should do with the native event after dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// A message reached the application.
    pub handled: bool,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

// ── Renderer ───────────────────────────────────────────────────────────

/// One mounted view.
pub struct Renderer {
    config: RendererConfig,
    registry: Registry,
    root: LiveNode,
    current: Node,
    dispatch: Box<dyn FnMut(Message)>,
    updates: u64,
}

impl Renderer {
    /// Render `view` and append it to `container`.
    pub fn mount(
        dom: &mut dyn Dom,
        container: LiveNode,
        view: Node,
        config: RendererConfig,
        dispatch: impl FnMut(Message) + 'static,
    ) -> Self {
        let mut registry = Registry::new();
        let context = registry.root();
        let root = Patcher {
            dom: &mut *dom,
            registry: &mut registry,
            capabilities: config.capabilities,
        }
        .render(&view, context);
        dom.append_child(container, root);
        tracing::debug!(root = ?root, "view mounted");

        Self {
            config,
            registry,
            root,
            current: view,
            dispatch: Box::new(dispatch),
            updates: 0,
        }
    }

    /// Take over existing markup at `existing`, then bring it in line with
    /// `view` through a normal update.
    pub fn adopt(
        dom: &mut dyn Dom,
        existing: LiveNode,
        view: Node,
        config: RendererConfig,
        dispatch: impl FnMut(Message) + 'static,
    ) -> Result<Self, RenderError> {
        let mut renderer = Self {
            config,
            registry: Registry::new(),
            root: existing,
            current: virtualize(&*dom, existing),
            dispatch: Box::new(dispatch),
            updates: 0,
        };
        renderer.update(dom, view)?;
        Ok(renderer)
    }

    /// Diff `next` against the current view and patch the live tree.
    ///
    /// On error the live tree may be partially patched; the previous view
    /// is kept as current.
    pub fn update(&mut self, dom: &mut dyn Dom, next: Node) -> Result<RenderStats, RenderError> {
        let patches = diff(&self.current, &next);
        let mut stats = RenderStats {
            patches: patch_count(&patches),
            ..RenderStats::default()
        };

        let root = apply_patches(
            &mut *dom,
            &mut self.registry,
            self.config.capabilities,
            self.root,
            &self.current,
            &patches,
        )?;
        stats.root_replaced = root != self.root;
        self.root = root;
        self.current = next;
        self.updates += 1;

        if self.config.sweep_after_update && !patches.is_empty() {
            stats.sweep = Some(self.registry.sweep(&*dom, self.root));
        }

        tracing::debug!(
            update = self.updates,
            patches = stats.patches,
            root_replaced = stats.root_replaced,
            "render pass"
        );
        Ok(stats)
    }

    /// Route a native event for `listener` to the application.
    pub fn dispatch_event(
        &mut self,
        listener: ListenerId,
        event: &Value,
    ) -> Result<EventOutcome, RenderError> {
        let Some(routed) = self.registry.dispatch(listener, event)? else {
            return Ok(EventOutcome::default());
        };
        (self.dispatch)(routed.message);
        Ok(EventOutcome {
            handled: true,
            stop_propagation: routed.stop_propagation,
            prevent_default: routed.prevent_default,
        })
    }

    /// Reclaim registrations of every node no longer under the root. Walks
    /// each registered node's ancestry.
    pub fn sweep(&mut self, dom: &dyn Dom) -> SweepResult {
        self.registry.sweep(dom, self.root)
    }

    pub fn root(&self) -> LiveNode {
        self.root
    }

    pub fn current(&self) -> &Node {
        &self.current
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Completed update passes.
    pub fn update_count(&self) -> u64 {
        self.updates
    }
}
