//! Virtualize existing markup
//!
//! Reads a live subtree back into a virtual tree so a renderer can adopt
//! server-rendered or pre-existing markup and patch it instead of
//! replacing it. Attributes are taken verbatim; nothing is sanitised,
//! since the markup is already live.
//!
//! Author: Moroya Sakamoto

use crate::dom::{Dom, LiveNode, NodeView};
use crate::facts::{Fact, Facts};
use crate::node::{Element, Node};

/// Virtual tree mirroring the live subtree at `node`.
///
/// Tags are lowercased. Anything that is neither text nor element becomes
/// an empty text node.
pub fn virtualize(dom: &dyn Dom, node: LiveNode) -> Node {
    match dom.inspect(node) {
        NodeView::Text(text) => Node::text(text),
        NodeView::Other => Node::text(""),
        NodeView::Element {
            tag,
            namespace,
            attributes,
        } => {
            let facts = attributes
                .into_iter()
                .map(|(key, value)| Fact::Attribute { key, value })
                .collect();
            let children = (0..dom.child_count(node))
                .filter_map(|i| dom.child_at(node, i))
                .map(|child| virtualize(dom, child))
                .collect();
            Node::from_element(Element::new(
                tag.to_lowercase(),
                namespace,
                Facts::organize(facts),
                children,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::memory::MemoryDom;
    use crate::node::NodeKind;

    #[test]
    fn test_virtualize_round_trip_no_patches() {
        let mut dom = MemoryDom::new();
        let ul = dom.create_element("UL", None);
        dom.set_attribute(ul, "class", "list");
        for t in ["a", "b"] {
            let li = dom.create_element("li", None);
            let text = dom.create_text(t);
            dom.append_child(li, text);
            dom.append_child(ul, li);
        }

        let virtual_tree = virtualize(&dom, ul);
        assert_eq!(virtual_tree.descendant_count(), 4);
        let expected = Node::element(
            "ul",
            vec![Fact::attribute("class", "list")],
            vec![
                Node::element("li", vec![], vec![Node::text("a")]),
                Node::element("li", vec![], vec![Node::text("b")]),
            ],
        );
        assert!(diff(&virtual_tree, &expected).is_empty());
    }

    #[test]
    fn test_other_nodes_become_empty_text() {
        let mut dom = MemoryDom::new();
        let frag = dom.create_fragment();
        assert!(matches!(virtualize(&dom, frag).kind(), NodeKind::Text(t) if t.is_empty()));
    }

    #[test]
    fn test_attributes_kept_verbatim() {
        let mut dom = MemoryDom::new();
        let a = dom.create_element("a", None);
        dom.set_attribute(a, "onclick", "go()");
        let node = virtualize(&dom, a);
        let NodeKind::Element(e) = node.kind() else {
            panic!("expected element");
        };
        assert_eq!(e.facts.attributes["onclick"], "go()");
    }
}
