//! The prefix tree of beam hypotheses.
//!
//! Each node represents one label-sequence prefix; its children extend the
//! prefix by one non-blank label. Nodes live in an index-based arena owned by
//! the tree, so parent links are plain indices instead of owning references
//! and the whole structure can be dropped in one go on reset. Children are
//! allocated lazily, only when a node is actually expanded as a beam
//! candidate, which keeps memory proportional to the beam width rather than
//! to the full label-space fan-out at every depth.

use std::ops::Range;

use crate::prob::{BeamProbability, LOG_ZERO};

/// Index of a node inside its [`BeamTree`] arena.
pub type NodeId = usize;

/// Id of the root node of every [`BeamTree`].
pub const ROOT: NodeId = 0;

/// One hypothesis: a prefix of labels, reachable from the root.
///
/// The root carries the blank label as a sentinel. No child ever carries the
/// blank label, so the repeat-label test against a parent is always exact.
#[derive(Debug, Clone)]
pub struct BeamNode<S> {
    /// Terminal label of this prefix (blank index for the root).
    pub label: u32,
    /// Back-reference to the parent prefix, `None` for the root.
    pub parent: Option<NodeId>,
    /// Contiguous id range of the children, once populated.
    children: Option<Range<NodeId>>,
    /// Probabilities at the previous timestep.
    pub oldp: BeamProbability,
    /// Probabilities at the current timestep.
    pub newp: BeamProbability,
    /// Opaque scorer state for this hypothesis.
    pub state: S,
}

impl<S> BeamNode<S> {
    /// A node is in the beam iff its current total is above the log-zero
    /// sentinel.
    pub fn is_active(&self) -> bool {
        self.newp.total > LOG_ZERO
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }
}

/// Arena of [`BeamNode`]s rooted at id 0.
#[derive(Debug, Clone)]
pub struct BeamTree<S> {
    nodes: Vec<BeamNode<S>>,
    num_classes: usize,
    blank: u32,
}

impl<S: Default> BeamTree<S> {
    /// Create a tree holding only a freshly reset root.
    ///
    /// `num_classes` is the label-space size including the blank, which is
    /// fixed as the last index.
    pub fn new(num_classes: usize) -> Self {
        let blank = (num_classes - 1) as u32;
        let mut tree = Self {
            nodes: Vec::new(),
            num_classes,
            blank,
        };
        tree.reset();
        tree
    }

    /// Discard every node and reseed the root. Old node ids become invalid.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(BeamNode {
            label: self.blank,
            parent: None,
            children: None,
            oldp: BeamProbability::default(),
            newp: BeamProbability::default(),
            state: S::default(),
        });
    }

    /// Allocate one child per non-blank label. At most once per node.
    pub fn populate_children(&mut self, id: NodeId) {
        if self.nodes[id].has_children() {
            return;
        }
        let start = self.nodes.len();
        let count = self.num_classes - 1;
        for label in 0..count {
            self.nodes.push(BeamNode {
                label: label as u32,
                parent: Some(id),
                children: None,
                oldp: BeamProbability::default(),
                newp: BeamProbability::default(),
                state: S::default(),
            });
        }
        self.nodes[id].children = Some(start..start + count);
    }
}

impl<S> BeamTree<S> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn blank(&self) -> u32 {
        self.blank
    }

    pub fn node(&self, id: NodeId) -> &BeamNode<S> {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut BeamNode<S> {
        &mut self.nodes[id]
    }

    /// Child id range of `id`, if populated.
    pub fn children(&self, id: NodeId) -> Option<Range<NodeId>> {
        self.nodes[id].children.clone()
    }

    /// Borrow a parent immutably together with one of its children mutably.
    ///
    /// Children are always allocated after their parent, so the arena can be
    /// split between the two indices.
    pub fn parent_and_child_mut(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> (&BeamNode<S>, &mut BeamNode<S>) {
        debug_assert!(parent < child);
        let (left, right) = self.nodes.split_at_mut(child);
        (&left[parent], &mut right[0])
    }

    /// Label sequence of the prefix ending at `id`, root-exclusive, in
    /// root-to-node order.
    ///
    /// Blank labels are never emitted. With `merge_repeated`, a label equal
    /// to the one emitted just before it is suppressed unless a blank sits
    /// between the two, so `[a, a, blank, a]` collapses to `[a, a]` while the
    /// unmerged form strips the blank and keeps `[a, a, a]`.
    pub fn label_seq(&self, id: NodeId, merge_repeated: bool) -> Vec<u32> {
        let mut path = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.nodes[cur].parent {
            path.push(self.nodes[cur].label);
            cur = parent;
        }
        path.reverse();

        let mut labels = Vec::with_capacity(path.len());
        let mut prev = None;
        for &label in &path {
            if label != self.blank && (!merge_repeated || prev != Some(label)) {
                labels.push(label);
            }
            prev = Some(label);
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_path(labels: &[u32]) -> (BeamTree<()>, NodeId) {
        // Chain the labels under the root directly in the arena so the path
        // may contain nodes (like a blank) the search itself never creates.
        let mut tree: BeamTree<()> = BeamTree::new(4);
        let mut cur = ROOT;
        for &label in labels {
            let id = tree.nodes.len();
            tree.nodes.push(BeamNode {
                label,
                parent: Some(cur),
                children: None,
                oldp: BeamProbability::default(),
                newp: BeamProbability::default(),
                state: (),
            });
            cur = id;
        }
        (tree, cur)
    }

    #[test]
    fn root_is_inactive_until_scored() {
        let tree: BeamTree<()> = BeamTree::new(3);
        assert_eq!(tree.len(), 1);
        assert!(!tree.node(ROOT).is_active());
        assert_eq!(tree.node(ROOT).label, 2);
    }

    #[test]
    fn children_are_lazy_and_exclude_blank() {
        let mut tree: BeamTree<()> = BeamTree::new(4);
        assert!(!tree.node(0).has_children());

        tree.populate_children(0);
        let children = tree.children(0).unwrap();
        assert_eq!(children.len(), 3);
        let labels: Vec<u32> = children.clone().map(|c| tree.node(c).label).collect();
        assert_eq!(labels, [0, 1, 2]);
        for c in children {
            assert_eq!(tree.node(c).parent, Some(0));
        }

        // A second call must not allocate again.
        let before = tree.len();
        tree.populate_children(0);
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn label_seq_walks_root_to_node() {
        let (tree, leaf) = tree_with_path(&[0, 1, 2]);
        assert_eq!(tree.label_seq(leaf, false), [0, 1, 2]);
        assert_eq!(tree.label_seq(leaf, true), [0, 1, 2]);
        assert_eq!(tree.label_seq(ROOT, false), [0u32; 0]);
    }

    #[test]
    fn label_seq_merges_adjacent_duplicates() {
        let (tree, leaf) = tree_with_path(&[1, 1, 1]);
        assert_eq!(tree.label_seq(leaf, false), [1, 1, 1]);
        assert_eq!(tree.label_seq(leaf, true), [1]);
    }

    #[test]
    fn label_seq_blank_keeps_duplicates_distinct() {
        // Blank nodes never arise from the search itself; build one by hand
        // to pin down the output rule: duplicates separated by a blank stay
        // distinct, and blanks themselves are stripped.
        let (tree, leaf) = tree_with_path(&[1, 1, 3, 1]);
        assert_eq!(tree.label_seq(leaf, false), [1, 1, 1]);
        assert_eq!(tree.label_seq(leaf, true), [1, 1]);
    }

    #[test]
    fn parent_and_child_split_borrow() {
        let (mut tree, leaf) = tree_with_path(&[0]);
        let parent = tree.node(leaf).parent.unwrap();
        let (p, c) = tree.parent_and_child_mut(parent, leaf);
        assert_eq!(p.label, 3); // root carries the blank sentinel
        c.newp.blank = 0.0;
        c.newp.combine();
        assert!(tree.node(leaf).is_active());
    }
}
