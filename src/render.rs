//! Initial rendering and fact application
//!
//! Builds live nodes from virtual ones, registering listeners and tagger
//! contexts as it goes. Also applies a [`FactsDiff`] to an existing live
//! node; initial rendering is the same operation against empty facts.
//!
//! Author: Moroya Sakamoto

use crate::apply::Patcher;
use crate::dom::{ListenerOptions, LiveNode};
use crate::event::ContextId;
use crate::facts::{is_live_property, Facts, FactsDiff, Handler};
use crate::node::{Node, NodeKind};

impl Patcher<'_> {
    /// Render `node` detached, inside dispatch context `context`.
    pub(crate) fn render(&mut self, node: &Node, context: ContextId) -> LiveNode {
        match node.kind() {
            NodeKind::Text(text) => self.dom.create_text(text),

            NodeKind::Thunk(thunk) => self.render(thunk.force(), context),

            NodeKind::Tagger(tagger) => {
                let (mappers, child) = tagger.collapse();
                let inner = self.registry.spawn(mappers, Some(context));
                let live = self.render(child, inner);
                self.registry.prepend(live, inner);
                live
            }

            NodeKind::Custom(custom) => {
                let live = custom.render(&mut *self.dom);
                self.apply_initial_facts(live, &custom.facts, context);
                live
            }

            NodeKind::Element(element) => {
                let live = self
                    .dom
                    .create_element(&element.tag, element.namespace.as_deref());
                self.apply_initial_facts(live, &element.facts, context);
                for child in &element.children {
                    let kid = self.render(child, context);
                    self.dom.append_child(live, kid);
                }
                live
            }

            NodeKind::Keyed(keyed) => {
                let live = self
                    .dom
                    .create_element(&keyed.tag, keyed.namespace.as_deref());
                self.apply_initial_facts(live, &keyed.facts, context);
                for (_, child) in &keyed.children {
                    let kid = self.render(child, context);
                    self.dom.append_child(live, kid);
                }
                live
            }
        }
    }

    fn apply_initial_facts(&mut self, live: LiveNode, facts: &Facts, context: ContextId) {
        if !facts.is_empty() {
            self.apply_facts(live, &facts.to_initial_diff(), context);
        }
    }

    /// Apply a fact diff to `live`. New listeners dispatch through `context`.
    pub(crate) fn apply_facts(&mut self, live: LiveNode, diff: &FactsDiff, context: ContextId) {
        for (event, handler) in &diff.events {
            self.apply_event(live, event, handler.as_ref(), context);
        }

        for (key, value) in &diff.styles {
            self.dom.set_style(live, key, value);
        }

        for (key, value) in &diff.attributes {
            match value {
                Some(v) => self.dom.set_attribute(live, key, v),
                None => self.dom.remove_attribute(live, key),
            }
        }

        for (key, (namespace, value)) in &diff.ns_attributes {
            match value {
                Some(v) => self.dom.set_attribute_ns(live, namespace, key, v),
                None => self.dom.remove_attribute_ns(live, namespace, key),
            }
        }

        for (key, value) in &diff.properties {
            // User input may already have put the live value there.
            if is_live_property(key) && self.dom.property(live, key).as_ref() == Some(value) {
                continue;
            }
            self.dom.set_property(live, key, value);
        }
    }

    fn apply_event(
        &mut self,
        live: LiveNode,
        event: &str,
        handler: Option<&Handler>,
        context: ContextId,
    ) {
        let existing = self.registry.listener_for(live, event);

        if let (Some(id), Some(handler)) = (existing, handler) {
            if self.registry.handler_kind(id) == Some(handler.kind()) {
                self.registry.swap_handler(id, handler.clone());
                return;
            }
        }

        if let Some(id) = existing {
            self.dom.remove_listener(live, event, id);
            self.registry.unlisten(id);
        }

        if let Some(handler) = handler {
            let id = self.registry.listen(live, event, handler.clone(), context);
            let options = ListenerOptions {
                passive: self
                    .capabilities
                    .passive_listeners
                    .then(|| handler.is_passive()),
            };
            self.dom.add_listener(live, event, id, options);
        }
    }
}
