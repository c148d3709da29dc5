//! Property tests: diff → apply against the in-memory live tree.

use alice_vdom::{
    diff, Dom, Fact, LiveNode, MemoKey, MemoryDom, Node, NodeKind, PatchKind, Renderer,
    RendererConfig,
};
use proptest::prelude::*;

// ── Tree shapes ────────────────────────────────────────────────────────

/// Plain description of a tree; built into fresh `Node`s per use.
#[derive(Debug, Clone)]
enum Shape {
    Text(String),
    Element {
        tag: &'static str,
        class: Option<&'static str>,
        children: Vec<Shape>,
    },
    Keyed {
        tag: &'static str,
        children: Vec<(u8, Shape)>,
    },
    Tagged(Box<Shape>),
    Lazy(Box<Shape>),
}

fn build(shape: &Shape) -> Node {
    match shape {
        Shape::Text(t) => Node::text(t.clone()),
        Shape::Element {
            tag,
            class,
            children,
        } => Node::element(
            tag,
            class.map(|c| Fact::attribute("class", c)).into_iter().collect(),
            children.iter().map(build).collect(),
        ),
        Shape::Keyed { tag, children } => Node::keyed(
            tag,
            vec![],
            children
                .iter()
                .map(|(k, s)| (k.to_string(), build(s)))
                .collect(),
        ),
        Shape::Tagged(inner) => build(inner).map(|n: u32| n + 1),
        Shape::Lazy(inner) => {
            let inner = (**inner).clone();
            Node::lazy(vec![MemoKey::new(())], move || build(&inner))
        }
    }
}

fn tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("div"), Just("p"), Just("span")]
}

fn unique_keys(mut children: Vec<(u8, Shape)>) -> Vec<(u8, Shape)> {
    let mut seen = std::collections::HashSet::new();
    children.retain(|(k, _)| seen.insert(*k));
    children
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = "[a-c]{0,2}".prop_map(Shape::Text);
    leaf.prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            3 => (
                tag(),
                proptest::option::of(prop_oneof![Just("x"), Just("y")]),
                prop::collection::vec(inner.clone(), 0..5),
            )
                .prop_map(|(tag, class, children)| Shape::Element {
                    tag,
                    class,
                    children,
                }),
            3 => (tag(), prop::collection::vec((0u8..8, inner.clone()), 0..6))
                .prop_map(|(tag, children)| Shape::Keyed {
                    tag,
                    children: unique_keys(children),
                }),
            1 => inner.clone().prop_map(|s| Shape::Tagged(Box::new(s))),
            1 => inner.prop_map(|s| Shape::Lazy(Box::new(s))),
        ]
    })
}

fn count_beneath(node: &Node) -> usize {
    match node.kind() {
        NodeKind::Element(e) => e.children.iter().map(|c| 1 + count_beneath(c)).sum(),
        NodeKind::Keyed(k) => k.children.iter().map(|(_, c)| 1 + count_beneath(c)).sum(),
        NodeKind::Tagger(t) => 1 + count_beneath(&t.child),
        _ => 0,
    }
}

fn fresh_markup(view: Node) -> String {
    let mut dom = MemoryDom::new();
    let body = dom.create_element("body", None);
    Renderer::mount(&mut dom, body, view, RendererConfig::default(), |_| {});
    dom.to_markup(body)
}

fn mount(view: Node) -> (MemoryDom, LiveNode, Renderer) {
    let mut dom = MemoryDom::new();
    let body = dom.create_element("body", None);
    let r = Renderer::mount(&mut dom, body, view, RendererConfig::default(), |_| {});
    (dom, body, r)
}

// ── Properties ─────────────────────────────────────────────────────────

/// Property: patching a render of T1 towards T2 looks like rendering T2.
#[test]
fn prop_update_matches_fresh_render() {
    proptest!(|(a in shape(), b in shape())| {
        let (mut dom, body, mut r) = mount(build(&a));
        r.update(&mut dom, build(&b)).unwrap();
        prop_assert_eq!(dom.to_markup(body), fresh_markup(build(&b)));
    });
}

/// Property: a chain of updates stays equivalent after every step.
#[test]
fn prop_update_chain_matches_fresh_render() {
    proptest!(|(steps in prop::collection::vec(shape(), 2..5))| {
        let (mut dom, body, mut r) = mount(build(&steps[0]));
        for step in &steps[1..] {
            r.update(&mut dom, build(step)).unwrap();
            prop_assert_eq!(dom.to_markup(body), fresh_markup(build(step)));
        }
    });
}

/// Property: descendant counts are exact.
#[test]
fn prop_descendant_count_exact() {
    proptest!(|(a in shape())| {
        let node = build(&a);
        prop_assert_eq!(node.descendant_count(), count_beneath(&node));
    });
}

/// Property: the same reference never produces patches.
#[test]
fn prop_same_reference_no_patches() {
    proptest!(|(a in shape())| {
        let node = build(&a);
        prop_assert!(diff(&node, &node.clone()).is_empty());
    });
}

/// Property: different kinds produce exactly one redraw at the root.
#[test]
fn prop_kind_mismatch_single_redraw() {
    proptest!(|(text in "[a-z]{0,4}", children in prop::collection::vec(shape(), 0..4))| {
        let element = Node::element("div", vec![], children.iter().map(build).collect());
        let text = Node::text(text);
        for (old, new) in [(&text, &element), (&element, &text)] {
            let patches = diff(old, new);
            prop_assert_eq!(patches.len(), 1);
            prop_assert_eq!(patches[0].index, 0);
            prop_assert!(matches!(patches[0].kind, PatchKind::Redraw(_)));
        }
    });
}

/// Property: permuting a keyed list is one reorder made only of moves.
#[test]
fn prop_keyed_permutation_is_one_reorder() {
    let keys = prop::collection::hash_set(0u16..500, 1..12)
        .prop_map(|s| s.into_iter().collect::<Vec<_>>())
        .prop_flat_map(|keys| (Just(keys.clone()), Just(keys).prop_shuffle()));

    proptest!(|((before, after) in keys)| {
        let list = |keys: &[u16]| {
            Node::keyed(
                "ul",
                vec![],
                keys.iter()
                    .map(|k| {
                        let item = Node::element("li", vec![], vec![Node::text(k.to_string())]);
                        (k.to_string(), item)
                    })
                    .collect(),
            )
        };
        let old = list(&before);
        let new = list(&after);
        let patches = diff(&old, &new);

        if before == after {
            prop_assert!(patches.is_empty());
        } else {
            prop_assert_eq!(patches.len(), 1);
            let PatchKind::ReorderKeyed(reorder) = &patches[0].kind else {
                return Err(TestCaseError::fail("expected a keyed reorder"));
            };
            prop_assert!(reorder.patches.is_empty());
            prop_assert!(reorder.entries.iter().all(|e| e.moved));
            for removal in &reorder.removals {
                let PatchKind::RemoveKeyed(Some(mv)) = &removal.kind else {
                    return Err(TestCaseError::fail("removal is not a move"));
                };
                prop_assert!(mv.patches.is_empty());
            }
        }

        let (mut dom, body, mut r) = mount(old);
        let nodes_before = dom.node_count();
        r.update(&mut dom, new.clone()).unwrap();
        prop_assert_eq!(dom.to_markup(body), fresh_markup(new));
        // Reuse only: at most one fragment for end inserts.
        prop_assert!(dom.node_count() <= nodes_before + 1);
    });
}

/// Concrete: identical memo keys produce nothing; a changed key produces
/// exactly the patches of diffing the forced subtrees.
#[test]
fn thunk_memo_scenarios() {
    let key = MemoKey::new(7u32);
    let make = |key: &MemoKey, text: &'static str| {
        Node::lazy(vec![key.clone()], move || {
            Node::element("p", vec![], vec![Node::text(text)])
        })
    };

    let old = make(&key, "a");
    if let NodeKind::Thunk(t) = old.kind() {
        t.force();
    }
    assert!(diff(&old, &make(&key, "ignored")).is_empty());

    let other = MemoKey::new(8u32);
    let patches = diff(&old, &make(&other, "b"));
    let plain = diff(
        &Node::element("p", vec![], vec![Node::text("a")]),
        &Node::element("p", vec![], vec![Node::text("b")]),
    );
    assert_eq!(patches.len(), 1);
    let PatchKind::EnterThunk(sub) = &patches[0].kind else {
        panic!("expected enter-thunk");
    };
    assert_eq!(sub.len(), plain.len());
    assert_eq!(sub[0].index, plain[0].index);
}
