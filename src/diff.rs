//! Tree diff engine
//!
//! Recursive shape diff between two virtual trees. Produces patches
//! addressed by preorder position in the OLD tree. Reference-identical
//! subtrees are skipped outright; nodes of different kinds are redrawn
//! without descending. Keyed children are delegated to [`crate::keyed`].
//!
//! Author: Moroya Sakamoto

use crate::facts::diff_facts;
use crate::keyed::diff_keyed_children;
use crate::node::{same_chain, Element, KeyedElement, Node, NodeKind};
use crate::patch::{Patch, PatchKind};

/// Compute the patch list turning `old` into `new`.
pub fn diff(old: &Node, new: &Node) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_help(old, new, &mut patches, 0);
    patches
}

#[inline]
fn push(patches: &mut Vec<Patch>, index: usize, kind: PatchKind) {
    patches.push(Patch { index, kind });
}

pub(crate) fn diff_help(old: &Node, new: &Node, patches: &mut Vec<Patch>, index: usize) {
    if Node::ptr_eq(old, new) {
        return;
    }

    match (old.kind(), new.kind()) {
        (NodeKind::Thunk(x), NodeKind::Thunk(y)) => {
            if x.same_memo(y) {
                y.adopt(x);
                return;
            }
            let mut sub = Vec::new();
            diff_help(x.force(), y.force(), &mut sub, 0);
            if !sub.is_empty() {
                push(patches, index, PatchKind::EnterThunk(sub));
            }
        }

        (NodeKind::Tagger(x), NodeKind::Tagger(y)) => {
            let (old_chain, old_child) = x.collapse();
            let (new_chain, new_child) = y.collapse();
            if old_chain.len() != new_chain.len() {
                push(patches, index, PatchKind::Redraw(new.clone()));
                return;
            }
            let depth = old_chain.len();
            if !same_chain(&old_chain, &new_chain) {
                push(patches, index, PatchKind::Retag(new_chain));
            }
            diff_help(old_child, new_child, patches, index + depth);
        }

        (NodeKind::Text(x), NodeKind::Text(y)) => {
            if x != y {
                push(patches, index, PatchKind::SetText(y.clone()));
            }
        }

        (NodeKind::Element(x), NodeKind::Element(y)) => diff_element(x, y, new, patches, index),
        (NodeKind::Element(x), NodeKind::Keyed(y)) => {
            diff_element(x, &y.dekey(), new, patches, index)
        }
        (NodeKind::Keyed(x), NodeKind::Element(y)) => {
            diff_element(&x.dekey(), y, new, patches, index)
        }

        (NodeKind::Keyed(x), NodeKind::Keyed(y)) => {
            if !same_tag_keyed(x, y) {
                push(patches, index, PatchKind::Redraw(new.clone()));
                return;
            }
            if let Some(facts) = diff_facts(&x.facts, &y.facts) {
                push(patches, index, PatchKind::Facts(facts));
            }
            diff_keyed_children(x, y, patches, index);
        }

        (NodeKind::Custom(x), NodeKind::Custom(y)) => {
            if !x.widget.same_as(&y.widget) {
                push(patches, index, PatchKind::Redraw(new.clone()));
                return;
            }
            if let Some(facts) = diff_facts(&x.facts, &y.facts) {
                push(patches, index, PatchKind::Facts(facts));
            }
            if let Some(patch) = x.diff(y) {
                push(patches, index, PatchKind::Custom(patch));
            }
        }

        // Unrelated content: replace, never descend.
        _ => push(patches, index, PatchKind::Redraw(new.clone())),
    }
}

fn same_tag_keyed(x: &KeyedElement, y: &KeyedElement) -> bool {
    x.tag == y.tag && x.namespace == y.namespace
}

fn diff_element(x: &Element, y: &Element, new: &Node, patches: &mut Vec<Patch>, index: usize) {
    if x.tag != y.tag || x.namespace != y.namespace {
        push(patches, index, PatchKind::Redraw(new.clone()));
        return;
    }
    if let Some(facts) = diff_facts(&x.facts, &y.facts) {
        push(patches, index, PatchKind::Facts(facts));
    }
    diff_children(x, y, patches, index);
}

fn diff_children(x: &Element, y: &Element, patches: &mut Vec<Patch>, mut index: usize) {
    let old_len = x.children.len();
    let new_len = y.children.len();

    if old_len > new_len {
        push(
            patches,
            index,
            PatchKind::RemoveTrailing {
                from: new_len,
                count: old_len - new_len,
            },
        );
    } else if old_len < new_len {
        push(
            patches,
            index,
            PatchKind::AppendTrailing {
                from: old_len,
                nodes: y.children.clone(),
            },
        );
    }

    for (old_child, new_child) in x.children.iter().zip(&y.children) {
        index += 1;
        diff_help(old_child, new_child, patches, index);
        index += old_child.descendant_count();
    }
}
