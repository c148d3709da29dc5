//! Patch applier
//!
//! Executes located patches in order as primitive [`Dom`] mutations and
//! reports the node now standing at the root, which changes only when the
//! root itself is redrawn.
//!
//! Every subtree detached for good is released from the registry on the
//! spot, so no later pass has to search the live tree for it.
//!
//! Keyed reorders run in four steps: in-place child diffs, detaching every
//! removed or moved child (moved ones are patched while detached and kept),
//! positioned inserts in ascending order, then one appended fragment
//! holding all end inserts.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use crate::dom::{Dom, LiveNode};
use crate::error::RenderError;
use crate::event::{ContextId, Registry};
use crate::locate::{locate, Located};
use crate::node::Node;
use crate::patch::{EntryId, Patch, PatchKind, Reorder};
use crate::renderer::Capabilities;

/// Mutable state of one patch pass.
pub(crate) struct Patcher<'a> {
    pub dom: &'a mut dyn Dom,
    pub registry: &'a mut Registry,
    pub capabilities: Capabilities,
}

/// Apply `patches` (diffed against `old`) to the live tree at `root`.
/// Returns the possibly replaced root.
pub(crate) fn apply_patches(
    dom: &mut dyn Dom,
    registry: &mut Registry,
    capabilities: Capabilities,
    root: LiveNode,
    old: &Node,
    patches: &[Patch],
) -> Result<LiveNode, RenderError> {
    if patches.is_empty() {
        return Ok(root);
    }
    let located = locate(&*dom, registry, root, old, patches, registry.root())?;
    Patcher {
        dom,
        registry,
        capabilities,
    }
    .apply_all(root, located)
}

impl Patcher<'_> {
    fn apply_all(
        &mut self,
        mut root: LiveNode,
        located: Vec<Located<'_>>,
    ) -> Result<LiveNode, RenderError> {
        for item in located {
            let target = item.target;
            let now = self.apply_one(item)?;
            if target == root {
                root = now;
            }
        }
        Ok(root)
    }

    /// Apply one bound patch; returns the node now in `target`'s place.
    fn apply_one(&mut self, item: Located<'_>) -> Result<LiveNode, RenderError> {
        let Located {
            patch,
            target,
            context,
            depth,
            nested,
            removals,
        } = item;

        match &patch.kind {
            PatchKind::Redraw(node) => {
                let fresh = self.render(node, context);
                self.replace(target, fresh, depth);
                Ok(fresh)
            }

            PatchKind::SetText(text) => {
                self.dom.set_text(target, text);
                Ok(target)
            }

            PatchKind::Facts(diff) => {
                self.apply_facts(target, diff, context);
                Ok(target)
            }

            PatchKind::EnterThunk(_) => self.apply_all(target, nested),

            PatchKind::Retag(mappers) => {
                self.registry.retag(target, depth, mappers.clone(), context);
                Ok(target)
            }

            PatchKind::RemoveTrailing { from, count } => {
                let present = self.dom.child_count(target);
                if present < from + count {
                    return Err(RenderError::MissingChild {
                        parent: target,
                        position: present,
                    });
                }
                for offset in (0..*count).rev() {
                    let last = self.dom.last_child(target).ok_or(RenderError::MissingChild {
                        parent: target,
                        position: from + offset,
                    })?;
                    self.dom.remove_child(target, last);
                    self.registry.release(&*self.dom, last, 0);
                }
                Ok(target)
            }

            PatchKind::AppendTrailing { from, nodes } => {
                let fragment = self.dom.create_fragment();
                for node in nodes.iter().skip(*from) {
                    let live = self.render(node, context);
                    self.dom.append_child(fragment, live);
                }
                self.dom.append_child(target, fragment);
                Ok(target)
            }

            PatchKind::ReorderKeyed(reorder) => {
                self.apply_reorder(target, context, reorder, nested, removals)?;
                Ok(target)
            }

            PatchKind::RemoveKeyed(_) => {
                if let Some(parent) = self.dom.parent(target) {
                    self.dom.remove_child(parent, target);
                }
                Ok(target)
            }

            PatchKind::Custom(custom) => {
                let fresh = custom.apply(&mut *self.dom, target);
                self.replace(target, fresh, depth);
                Ok(fresh)
            }
        }
    }

    /// Put `fresh` where `old` stands. `fresh` inherits the outer `depth`
    /// tagger bindings of `old`; the rest of `old` is released.
    fn replace(&mut self, old: LiveNode, fresh: LiveNode, depth: usize) {
        if old == fresh {
            return;
        }
        self.registry.carry(old, fresh, depth);
        if let Some(parent) = self.dom.parent(old) {
            self.dom.replace_child(parent, fresh, old);
        }
        self.registry.release(&*self.dom, old, depth);
    }

    fn apply_reorder(
        &mut self,
        parent: LiveNode,
        context: ContextId,
        reorder: &Reorder,
        nested: Vec<Located<'_>>,
        removals: Vec<Located<'_>>,
    ) -> Result<(), RenderError> {
        self.apply_all(parent, nested)?;

        let mut moved: HashMap<EntryId, LiveNode> = HashMap::new();
        for removal in removals {
            let Located {
                patch,
                target,
                nested,
                ..
            } = removal;
            self.dom.remove_child(parent, target);
            match &patch.kind {
                PatchKind::RemoveKeyed(Some(mv)) => {
                    let live = self.apply_all(target, nested)?;
                    moved.insert(mv.entry, live);
                }
                _ => {
                    self.registry.release(&*self.dom, target, 0);
                }
            }
        }

        for insert in &reorder.inserts {
            let live = self.entry_node(reorder, insert.entry, &mut moved, context)?;
            let reference = self.dom.child_at(parent, insert.position);
            self.dom.insert_before(parent, live, reference);
        }

        if !reorder.end_inserts.is_empty() {
            let fragment = self.dom.create_fragment();
            for &entry in &reorder.end_inserts {
                let live = self.entry_node(reorder, entry, &mut moved, context)?;
                self.dom.append_child(fragment, live);
            }
            self.dom.append_child(parent, fragment);
        }

        Ok(())
    }

    fn entry_node(
        &mut self,
        reorder: &Reorder,
        entry: EntryId,
        moved: &mut HashMap<EntryId, LiveNode>,
        context: ContextId,
    ) -> Result<LiveNode, RenderError> {
        let Some(e) = reorder.entries.get(entry) else {
            return Err(RenderError::UnboundMove { entry });
        };
        if e.moved {
            moved.remove(&entry).ok_or(RenderError::UnboundMove { entry })
        } else {
            Ok(self.render(&e.node, context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::facts::Fact;
    use crate::memory::MemoryDom;
    use crate::node::{Mapper, MemoKey, Widget};
    use crate::patch::CustomPatch;
    use serde_json::json;
    use std::rc::Rc;

    struct Harness {
        dom: MemoryDom,
        registry: Registry,
        container: LiveNode,
        root: LiveNode,
        current: Node,
    }

    impl Harness {
        fn mount(view: Node) -> Self {
            let mut dom = MemoryDom::new();
            let mut registry = Registry::new();
            let container = dom.create_element("body", None);
            let ctx = registry.root();
            let root = Patcher {
                dom: &mut dom,
                registry: &mut registry,
                capabilities: Capabilities::default(),
            }
            .render(&view, ctx);
            dom.append_child(container, root);
            Self {
                dom,
                registry,
                container,
                root,
                current: view,
            }
        }

        fn update(&mut self, next: Node) {
            let patches = diff(&self.current, &next);
            self.root = apply_patches(
                &mut self.dom,
                &mut self.registry,
                Capabilities::default(),
                self.root,
                &self.current,
                &patches,
            )
            .unwrap();
            self.current = next;
        }

        fn markup(&self) -> String {
            self.dom.to_markup(self.container)
        }
    }

    fn fresh(view: &Node) -> String {
        Harness::mount(view.clone()).markup()
    }

    fn check(old: Node, new: Node) -> Harness {
        let mut h = Harness::mount(old);
        h.update(new.clone());
        assert_eq!(h.markup(), fresh(&new));
        h
    }

    fn keyed(items: &[(&str, &str)]) -> Node {
        Node::keyed(
            "ul",
            vec![],
            items
                .iter()
                .map(|(k, t)| (*k, Node::element("li", vec![], vec![Node::text(*t)])))
                .collect(),
        )
    }

    // ── Basic patches ──────────────────────────────────────────────────

    #[test]
    fn test_root_redraw_replaces_in_container() {
        let h = check(Node::text("a"), Node::element("p", vec![], vec![]));
        assert_eq!(h.dom.children(h.container), &[h.root]);
    }

    #[test]
    fn test_text_and_facts() {
        check(
            Node::element(
                "p",
                vec![Fact::attribute("id", "a"), Fact::style("color", "red")],
                vec![Node::text("x")],
            ),
            Node::element(
                "p",
                vec![Fact::attribute("class", "b"), Fact::property("title", "t")],
                vec![Node::text("y")],
            ),
        );
    }

    #[test]
    fn test_trailing_children() {
        let three = Node::element(
            "ul",
            vec![],
            vec![Node::text("a"), Node::text("b"), Node::text("c")],
        );
        let one = Node::element("ul", vec![], vec![Node::text("z")]);
        check(three.clone(), one.clone());
        check(one, three);
    }

    #[test]
    fn test_nested_redraw_keeps_siblings() {
        let mut h = check(
            Node::element("div", vec![], vec![Node::text("a"), Node::text("b")]),
            Node::element("div", vec![], vec![Node::text("a"), Node::element("i", vec![], vec![])]),
        );
        assert_eq!(h.markup(), "<body><div>a<i></i></div></body>");
        h.update(Node::element("div", vec![], vec![Node::text("a")]));
        assert_eq!(h.markup(), "<body><div>a</div></body>");
    }

    // ── Keyed ──────────────────────────────────────────────────────────

    #[test]
    fn test_keyed_swap_reuses_nodes() {
        let mut h = Harness::mount(keyed(&[("a", "1"), ("b", "2")]));
        let before = h.dom.children(h.root).to_vec();
        h.update(keyed(&[("b", "2"), ("a", "1")]));
        assert_eq!(h.markup(), "<body><ul><li>2</li><li>1</li></ul></body>");
        assert_eq!(h.dom.children(h.root), &[before[1], before[0]]);
    }

    #[test]
    fn test_keyed_shapes() {
        let base = keyed(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let cases: &[&[(&str, &str)]] = &[
            &[("x", "0"), ("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")],
            &[("b", "2"), ("c", "3"), ("d", "4")],
            &[("a", "1"), ("x", "9"), ("c", "3"), ("d", "4")],
            &[("d", "4"), ("c", "3"), ("b", "2"), ("a", "1")],
            &[("d", "4"), ("a", "1"), ("b", "2"), ("c", "3")],
            &[("b", "two"), ("a", "one"), ("d", "4"), ("c", "3")],
            &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6")],
            &[],
        ];
        for case in cases {
            check(base.clone(), keyed(case));
        }
    }

    #[test]
    fn test_keyed_reverse_reuses_every_node() {
        let mut h = Harness::mount(keyed(&[("a", "1"), ("b", "2"), ("c", "3")]));
        let before = h.dom.node_count();
        h.update(keyed(&[("c", "3"), ("b", "2"), ("a", "1")]));
        assert_eq!(h.markup(), "<body><ul><li>3</li><li>2</li><li>1</li></ul></body>");
        // Only the end-insert fragment was created.
        assert_eq!(h.dom.node_count(), before + 1);
    }

    #[test]
    fn test_keyed_duplicates_render_all() {
        check(
            keyed(&[("k", "1"), ("k", "2")]),
            keyed(&[("k", "2"), ("k", "1"), ("k", "3")]),
        );
    }

    #[test]
    fn test_moved_node_kind_change() {
        let old = Node::keyed(
            "ul",
            vec![],
            vec![("a", Node::text("a")), ("b", Node::text("b")), ("c", Node::text("c"))],
        );
        let new = Node::keyed(
            "ul",
            vec![],
            vec![
                ("c", Node::element("em", vec![], vec![])),
                ("a", Node::text("a")),
                ("b", Node::text("b")),
            ],
        );
        check(old, new);
    }

    // ── Thunks, taggers, custom ────────────────────────────────────────

    #[test]
    fn test_thunk_patch() {
        let view = |key: u32, text: &'static str| {
            let thunk = Node::lazy(vec![MemoKey::new(key)], move || Node::text(text));
            Node::element("div", vec![], vec![thunk])
        };
        check(view(1, "a"), view(2, "b"));
    }

    #[test]
    fn test_retag_updates_dispatch() {
        let view = |m: &Mapper| {
            Node::element(
                "div",
                vec![],
                vec![Node::tagged(
                    m,
                    Node::element("button", vec![Fact::on_message("click", 5u8)], vec![]),
                )],
            )
        };
        let first = Mapper::new(|n: u8| n as u32);
        let second = Mapper::new(|n: u8| n as u32 * 100);
        let mut h = Harness::mount(view(&first));
        h.update(view(&second));

        let button = h.dom.children(h.root)[0];
        let id = h.dom.listener(button, "click").unwrap();
        let routed = h.registry.dispatch(id, &json!({})).unwrap().unwrap();
        assert_eq!(*routed.message.downcast::<u32>().unwrap(), 500);
    }

    #[test]
    fn test_redraw_under_tagger_keeps_context() {
        let mapper = Mapper::new(|n: u8| n as u32 + 1);
        let view = |tag: &str| {
            Node::tagged(
                &mapper,
                Node::element(tag, vec![Fact::on_message("click", 1u8)], vec![]),
            )
        };
        let mut h = Harness::mount(view("a"));
        h.update(view("button"));

        assert_eq!(h.markup(), "<body><button @click></button></body>");
        let id = h.dom.listener(h.root, "click").unwrap();
        let routed = h.registry.dispatch(id, &json!({})).unwrap().unwrap();
        assert_eq!(*routed.message.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_custom_patch_applied() {
        let widget = Widget::new(
            |model, dom| {
                let n = model.downcast_ref::<u32>().copied().unwrap_or_default();
                dom.create_text(&n.to_string())
            },
            |_, new| {
                let n = new.downcast_ref::<u32>().copied().unwrap_or_default();
                Some(CustomPatch::new(move |dom, node| {
                    dom.set_text(node, &n.to_string());
                    node
                }))
            },
        );
        let h = check(
            Node::element("div", vec![], vec![Node::custom(&widget, vec![], Rc::new(1u32))]),
            Node::element("div", vec![], vec![Node::custom(&widget, vec![], Rc::new(2u32))]),
        );
        assert_eq!(h.markup(), "<body><div>2</div></body>");
    }

    #[test]
    fn test_custom_replacement_keeps_tagger_bindings() {
        let mapper = Mapper::new(|n: u8| n as u32);
        let widget = Widget::new(
            |_, dom| dom.create_text("w"),
            |_, _| Some(CustomPatch::new(|dom, _| dom.create_text("fresh"))),
        );
        let view = |m: u32| Node::tagged(&mapper, Node::custom(&widget, vec![], Rc::new(m)));
        let mut h = Harness::mount(view(1));
        let old = h.root;
        let bound = h.registry.bindings(old).to_vec();
        assert_eq!(bound.len(), 1);

        h.update(view(2));
        assert_ne!(h.root, old);
        assert_eq!(h.markup(), "<body>fresh</body>");
        assert_eq!(h.registry.bindings(h.root), bound.as_slice());
        assert!(h.registry.bindings(old).is_empty());
        assert_eq!(h.registry.context_count(), 2);
    }

    #[test]
    fn test_remove_trailing_with_missing_children_is_error() {
        let old = Node::element(
            "ul",
            vec![],
            vec![Node::text("a"), Node::text("b"), Node::text("c")],
        );
        let mut h = Harness::mount(old.clone());
        for _ in 0..2 {
            let last = h.dom.last_child(h.root).unwrap();
            h.dom.remove_child(h.root, last);
        }

        let patches = diff(&old, &Node::element("ul", vec![], vec![Node::text("a")]));
        let err = apply_patches(
            &mut h.dom,
            &mut h.registry,
            Capabilities::default(),
            h.root,
            &old,
            &patches,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingChild {
                parent: h.root,
                position: 1
            }
        );
        assert_eq!(h.markup(), "<body><ul>a</ul></body>");
    }

    #[test]
    fn test_empty_patches_is_noop() {
        let mut h = Harness::mount(Node::text("same"));
        let root = h.root;
        h.dom.reset_reads();
        let current = h.current.clone();
        h.update(current);
        assert_eq!(h.root, root);
        assert_eq!(h.dom.reads(), 0);
    }
}
