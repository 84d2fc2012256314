//! Tri-state selection over the repository tree
//!
//! A toggle propagates downward to every descendant; un-checking also
//! propagates upward, clearing every ancestor. Checking never auto-checks
//! ancestors. Propagation is computed as a single pure batch: state is
//! mutated first, the full set of changed nodes is returned once, and no
//! intermediate notifications can re-trigger the transition.
//!
//! The selection set records only nodes the user explicitly checked, in
//! toggle order. Nodes forced to Unchecked by propagation are evicted;
//! nodes forced to Checked are covered by their ancestor and not added.

use std::collections::HashSet;
use tracing::debug;

use crate::tree::{NodeId, RepoTree};

#[derive(Debug, Default)]
pub struct SelectionModel {
    /// Explicitly checked nodes in first-toggle order.
    selected: Vec<NodeId>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly selected nodes, oldest toggle first.
    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.selected.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Apply a user toggle and return every node whose state changed, for
    /// one batched change notification.
    pub fn set_checked(&mut self, tree: &mut RepoTree, id: NodeId, checked: bool) -> Vec<NodeId> {
        let mut changed = Vec::new();

        if tree.node(id).checked != checked {
            tree.node_mut(id).checked = checked;
            changed.push(id);
        }

        // Downward: force every descendant to the new state.
        let mut stack: Vec<NodeId> = tree.children(id).to_vec();
        while let Some(current) = stack.pop() {
            if tree.node(current).checked != checked {
                tree.node_mut(current).checked = checked;
                changed.push(current);
            }
            if !checked {
                self.remove(current);
            }
            stack.extend(tree.children(current).iter().copied());
        }

        // Upward, only on un-check: a node with an unchecked descendant can
        // no longer claim full coverage.
        if !checked {
            let mut current = id;
            while let Some(parent) = tree.parent(current) {
                if tree.node(parent).checked {
                    tree.node_mut(parent).checked = false;
                    changed.push(parent);
                }
                self.remove(parent);
                current = parent;
            }
        }

        if checked {
            if !self.contains(id) {
                self.selected.push(id);
            }
        } else {
            self.remove(id);
        }

        debug!("toggle of {id:?} to {checked} changed {} nodes", changed.len());
        changed
    }

    fn remove(&mut self, id: NodeId) {
        self.selected.retain(|&existing| existing != id);
    }

    /// Drop selections that no longer exist after a re-expansion replaced
    /// their subtree.
    pub fn evict(&mut self, detached: &[NodeId]) {
        if detached.is_empty() {
            return;
        }
        let gone: HashSet<NodeId> = detached.iter().copied().collect();
        self.selected.retain(|id| !gone.contains(id));
    }

    /// The minimal selected set: members whose ancestors are all unselected.
    /// Selecting a directory covers everything beneath it, so descendants of
    /// another member are redundant.
    ///
    /// Members the tree no longer reports as checked are skipped too: a node
    /// detached by a re-expansion is force-unchecked at detach time, so even
    /// an id that was never evicted (a failed re-expansion cannot report its
    /// detached list) never reaches a plan.
    pub fn minimal(&self, tree: &RepoTree) -> Vec<NodeId> {
        let members: HashSet<NodeId> = self
            .selected
            .iter()
            .copied()
            .filter(|&id| tree.node(id).checked)
            .collect();
        self.selected
            .iter()
            .copied()
            .filter(|&id| {
                if !tree.node(id).checked {
                    return false;
                }
                let mut current = id;
                while let Some(parent) = tree.parent(current) {
                    if members.contains(&parent) {
                        return false;
                    }
                    current = parent;
                }
                true
            })
            .collect()
    }

    /// Deduplicate in place; run once before planning. Also drops members
    /// that a re-expansion detached without eviction.
    pub fn dedup(&mut self, tree: &RepoTree) {
        self.selected = self.minimal(tree);
    }
}
