//! Keyed children reconciliation
//!
//! Two pointers over the old and new `(key, node)` lists with one step of
//! lookahead. Recognised shapes:
//!
//! | Shape | Pattern | Effect |
//! |-------|---------|--------|
//! | same | `x == y` | diff in place |
//! | swap | `x' == y && y' == x` | diff `x`/`y'`, move `y` to `j` |
//! | insert | `y' == x` | insert `y`, diff `x`/`y'` |
//! | remove | `x' == y` | remove `x`, diff `x'`/`y` |
//! | replace | `x' == y'` | remove `x`, insert `y`, diff `x'`/`y'` |
//!
//! Anything else stops the scan; the rest of the old list is removed and
//! the rest of the new list appended. A removal and an insertion of the
//! same key anywhere in the list collapse into a move of the live node.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use crate::diff::diff_help;
use crate::node::{KeyedElement, Node};
use crate::patch::{Entry, EntryId, Insert, KeyedMove, Patch, PatchKind, Reorder};

/// Appended to a key already seen twice in one list.
pub const DUPLICATE_KEY_SUFFIX: &str = "_vtW6BL";

/// State of one key while scanning.
enum Change {
    /// Seen in the new list only, so far.
    Inserted { entry: EntryId },
    /// Seen in the old list only, so far.
    Removed { slot: usize, index: usize, node: Node },
    /// Paired up; any further sighting is a duplicate.
    Moved,
}

#[derive(Default)]
struct Reconciler {
    changes: HashMap<String, Change>,
    reorder: Reorder,
}

impl Reconciler {
    fn new_entry(&mut self, node: &Node, moved: bool) -> EntryId {
        self.reorder.entries.push(Entry {
            node: node.clone(),
            moved,
        });
        self.reorder.entries.len() - 1
    }

    fn schedule(&mut self, position: Option<usize>, entry: EntryId) {
        match position {
            Some(position) => self.reorder.inserts.push(Insert { position, entry }),
            None => self.reorder.end_inserts.push(entry),
        }
    }

    /// Record `node` appearing under `key` at `position` of the new list
    /// (`None` for the batched tail).
    fn insert_node(&mut self, key: String, node: &Node, position: Option<usize>) {
        match self.changes.remove(&key) {
            None => {
                let entry = self.new_entry(node, false);
                self.changes.insert(key, Change::Inserted { entry });
                self.schedule(position, entry);
            }
            Some(Change::Removed { slot, index, node: old }) => {
                let entry = self.new_entry(node, true);
                let mut patches = Vec::new();
                diff_help(&old, node, &mut patches, index);
                self.reorder.removals[slot].kind =
                    PatchKind::RemoveKeyed(Some(KeyedMove { entry, patches }));
                tracing::trace!(key = %key, from = index, to = ?position, "keyed move");
                self.changes.insert(key, Change::Moved);
                self.schedule(position, entry);
            }
            Some(seen) => {
                tracing::warn!(key = %key, "duplicate key in keyed list; disambiguating");
                let retry = format!("{key}{DUPLICATE_KEY_SUFFIX}");
                self.changes.insert(key, seen);
                self.insert_node(retry, node, position);
            }
        }
    }

    /// Record `node` disappearing from under `key` at old preorder `index`.
    fn remove_node(&mut self, key: String, node: &Node, index: usize) {
        match self.changes.remove(&key) {
            None => {
                let slot = self.reorder.removals.len();
                self.reorder.removals.push(Patch {
                    index,
                    kind: PatchKind::RemoveKeyed(None),
                });
                self.changes.insert(
                    key,
                    Change::Removed {
                        slot,
                        index,
                        node: node.clone(),
                    },
                );
            }
            Some(Change::Inserted { entry }) => {
                self.reorder.entries[entry].moved = true;
                let target = self.reorder.entries[entry].node.clone();
                let mut patches = Vec::new();
                diff_help(node, &target, &mut patches, index);
                self.reorder.removals.push(Patch {
                    index,
                    kind: PatchKind::RemoveKeyed(Some(KeyedMove { entry, patches })),
                });
                tracing::trace!(key = %key, from = index, "keyed move");
                self.changes.insert(key, Change::Moved);
            }
            Some(seen) => {
                tracing::warn!(key = %key, "duplicate key in keyed list; disambiguating");
                let retry = format!("{key}{DUPLICATE_KEY_SUFFIX}");
                self.changes.insert(key, seen);
                self.remove_node(retry, node, index);
            }
        }
    }

    fn diff_in_place(&mut self, old: &Node, new: &Node, index: usize) {
        diff_help(old, new, &mut self.reorder.patches, index);
    }
}

/// Diff the children of two keyed elements whose own index is `root`.
/// Pushes at most one `ReorderKeyed` patch.
pub(crate) fn diff_keyed_children(
    x: &KeyedElement,
    y: &KeyedElement,
    patches: &mut Vec<Patch>,
    root: usize,
) {
    let old = &x.children;
    let new = &y.children;
    let mut rec = Reconciler::default();

    let mut index = root;
    let (mut i, mut j) = (0, 0);

    while i < old.len() && j < new.len() {
        let (x_key, x_node) = &old[i];
        let (y_key, y_node) = &new[j];

        if x_key == y_key {
            index += 1;
            rec.diff_in_place(x_node, y_node, index);
            index += x_node.descendant_count();
            i += 1;
            j += 1;
            continue;
        }

        let x_next = old.get(i + 1);
        let y_next = new.get(j + 1);
        let old_match = x_next.is_some_and(|(k, _)| k == y_key);
        let new_match = y_next.is_some_and(|(k, _)| k == x_key);

        // swap: x y' | x' y
        if let (true, true, Some((_, xn_node)), Some((_, yn_node))) =
            (old_match, new_match, x_next, y_next)
        {
            index += 1;
            rec.diff_in_place(x_node, yn_node, index);
            rec.insert_node(y_key.clone(), y_node, Some(j));
            index += x_node.descendant_count();
            index += 1;
            rec.remove_node(y_key.clone(), xn_node, index);
            index += xn_node.descendant_count();
            i += 2;
            j += 2;
            continue;
        }

        // insert: y is new, x survives as y'
        if let (true, Some((_, yn_node))) = (new_match, y_next) {
            index += 1;
            rec.insert_node(y_key.clone(), y_node, Some(j));
            rec.diff_in_place(x_node, yn_node, index);
            index += x_node.descendant_count();
            i += 1;
            j += 2;
            continue;
        }

        // remove: x is gone, x' survives as y
        if let (true, Some((_, xn_node))) = (old_match, x_next) {
            index += 1;
            rec.remove_node(x_key.clone(), x_node, index);
            index += x_node.descendant_count();
            index += 1;
            rec.diff_in_place(xn_node, y_node, index);
            index += xn_node.descendant_count();
            i += 2;
            j += 1;
            continue;
        }

        // replace: x and y differ, x' and y' line up again
        if let (Some((xn_key, xn_node)), Some((yn_key, yn_node))) = (x_next, y_next) {
            if xn_key == yn_key {
                index += 1;
                rec.remove_node(x_key.clone(), x_node, index);
                rec.insert_node(y_key.clone(), y_node, Some(j));
                index += x_node.descendant_count();
                index += 1;
                rec.diff_in_place(xn_node, yn_node, index);
                index += xn_node.descendant_count();
                i += 2;
                j += 2;
                continue;
            }
        }

        break;
    }

    for (key, node) in &old[i..] {
        index += 1;
        rec.remove_node(key.clone(), node, index);
        index += node.descendant_count();
    }

    for (key, node) in &new[j..] {
        rec.insert_node(key.clone(), node, None);
    }

    if !rec.reorder.is_empty() {
        tracing::trace!(
            index = root,
            moves = rec.reorder.move_count(),
            inserts = rec.reorder.inserts.len(),
            end_inserts = rec.reorder.end_inserts.len(),
            removals = rec.reorder.removals.len(),
            "keyed reorder"
        );
        patches.push(Patch {
            index: root,
            kind: PatchKind::ReorderKeyed(rec.reorder),
        });
    }
}
