//! Finite antichains of [`NodeLabel`]s in canonical left/right order — the
//! leaves of a finite subtree of the infinite binary partition.

use std::collections::{BinaryHeap, HashSet};
use std::ops::Range;

use crate::error::TreeError;
use crate::label::NodeLabel;

/// A sorted, pairwise-incomparable sequence of [`NodeLabel`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Truncation {
    leaves: Vec<NodeLabel>,
}

impl Truncation {
    /// Builds a truncation from an unordered leaf set, sorting it and
    /// rejecting any pair where one label is an ancestor of the other.
    pub fn from_leaf_set(mut leaves: Vec<NodeLabel>) -> Result<Self, TreeError> {
        leaves.sort();
        for w in leaves.windows(2) {
            if w[0] == w[1] || w[0].is_ancestor_of(&w[1]) || w[1].is_ancestor_of(&w[0]) {
                return Err(TreeError::InputNotAntichain);
            }
        }
        Ok(Truncation { leaves })
    }

    /// Builds a truncation from a sequence already known to be sorted and
    /// an antichain (internal hot paths that construct truncations by
    /// merging other truncations, where re-validating would be wasted
    /// work).
    pub(crate) fn from_sorted_antichain_unchecked(leaves: Vec<NodeLabel>) -> Self {
        debug_assert!(leaves.windows(2).all(|w| w[0] < w[1]));
        Truncation { leaves }
    }

    pub fn leaves(&self) -> &[NodeLabel] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeLabel> {
        self.leaves.get(index)
    }

    /// Half-open index range of leaves that are `l` itself or a descendant
    /// of `l`. Leaves outside this truncation are assumed to all be at
    /// depth `>= l.depth()` (true for any label reachable by repeatedly
    /// taking parents of the original leaves, which is the only way `l` is
    /// ever constructed by this crate).
    pub fn subtree(&self, l: &NodeLabel) -> Range<usize> {
        let cmp = |leaf: &NodeLabel| -> std::cmp::Ordering {
            if l.is_ancestor_of_or_eq(leaf) {
                std::cmp::Ordering::Equal
            } else if leaf.is_left_of(l) {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            }
        };
        match self.leaves.binary_search_by(|leaf| cmp(leaf)) {
            Err(at) => at..at,
            Ok(idx) => {
                let mut lo = idx;
                while lo > 0 && cmp(&self.leaves[lo - 1]) == std::cmp::Ordering::Equal {
                    lo -= 1;
                }
                let mut hi = idx + 1;
                while hi < self.leaves.len() && cmp(&self.leaves[hi]) == std::cmp::Ordering::Equal
                {
                    hi += 1;
                }
                lo..hi
            }
        }
    }

    /// `true` iff both children of `l` appear as consecutive leaves.
    pub fn has_as_cherry(&self, l: &NodeLabel) -> bool {
        self.leaves
            .binary_search(&l.left())
            .ok()
            .map(|i| self.leaves.get(i + 1) == Some(&l.right()))
            .unwrap_or(false)
    }

    /// Adjacent sibling pairs `(parent, [i, i+2))` in left-to-right order.
    pub fn cherries(&self) -> impl Iterator<Item = (NodeLabel, Range<usize>)> + '_ {
        self.leaves.windows(2).enumerate().filter_map(|(i, w)| {
            if w[0].is_left_child() && w[0].sibling().as_ref() == Some(&w[1]) {
                Some((w[0].parent().expect("non-root has a parent"), i..i + 2))
            } else {
                None
            }
        })
    }

    /// Extends this leaf set so that every internal node reachable from a
    /// leaf has exactly two descendants in the result — i.e. the result is
    /// the leaf set of a finite *complete* binary subtree. Returns the
    /// completed truncation; newly inserted labels are exactly the ones not
    /// present in `self`.
    pub fn minimal_completion(&self) -> Truncation {
        let mut heap: BinaryHeap<(u64, NodeLabel)> = self
            .leaves
            .iter()
            .map(|l| (l.depth(), l.clone()))
            .collect();
        let mut alive: HashSet<NodeLabel> = self.leaves.iter().cloned().collect();
        let mut extra: Vec<NodeLabel> = Vec::new();

        while let Some((_, node)) = heap.pop() {
            if !alive.contains(&node) {
                continue;
            }
            if node.is_root() {
                break;
            }
            let sibling = node.sibling().expect("non-root has a sibling");
            let parent = node.parent().expect("non-root has a parent");
            alive.remove(&node);
            if !alive.remove(&sibling) {
                extra.push(sibling);
            }
            if alive.insert(parent.clone()) {
                heap.push((parent.depth(), parent));
            }
        }

        if extra.is_empty() {
            return self.clone();
        }
        let mut all = self.leaves.clone();
        all.extend(extra);
        Truncation::from_sorted_antichain_unchecked({
            all.sort();
            all
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lbl(v: u64) -> NodeLabel {
        NodeLabel::from_u64(v).unwrap()
    }

    #[test]
    fn rejects_ancestor_pairs() {
        let err = Truncation::from_leaf_set(vec![lbl(2), lbl(4)]).unwrap_err();
        assert_eq!(err, TreeError::InputNotAntichain);
    }

    #[test]
    fn sorts_into_canonical_order() {
        let t = Truncation::from_leaf_set(vec![lbl(7), lbl(4), lbl(5)]).unwrap();
        assert_eq!(t.leaves(), &[lbl(4), lbl(5), lbl(7)]);
    }

    #[test]
    fn subtree_is_contiguous() {
        let t = Truncation::from_leaf_set(vec![lbl(4), lbl(5), lbl(6), lbl(7)]).unwrap();
        assert_eq!(t.subtree(&lbl(2)), 0..2);
        assert_eq!(t.subtree(&lbl(3)), 2..4);
        assert_eq!(t.subtree(&NodeLabel::root()), 0..4);
        assert_eq!(t.subtree(&lbl(4)), 0..1);
        // A label with no descendants in the truncation yields an empty range.
        let t2 = Truncation::from_leaf_set(vec![lbl(4), lbl(5)]).unwrap();
        let empty = t2.subtree(&lbl(6));
        assert_eq!(empty.start, empty.end);
    }

    #[test]
    fn cherries_finds_sibling_pairs_only() {
        let t = Truncation::from_leaf_set(vec![lbl(4), lbl(5), lbl(7)]).unwrap();
        let found: Vec<_> = t.cherries().collect();
        assert_eq!(found, vec![(lbl(2), 0..2)]);
        assert!(t.has_as_cherry(&lbl(2)));
        assert!(!t.has_as_cherry(&lbl(3)));
    }

    #[test]
    fn minimal_completion_fills_missing_siblings() {
        let t = Truncation::from_leaf_set(vec![lbl(4), lbl(7)]).unwrap();
        let completed = t.minimal_completion();
        assert_eq!(completed.leaves(), &[lbl(4), lbl(5), lbl(6), lbl(7)]);
    }

    #[test]
    fn minimal_completion_is_idempotent() {
        let t = Truncation::from_leaf_set(vec![lbl(8), lbl(9), lbl(10), lbl(11), lbl(3)]).unwrap();
        let once = t.minimal_completion();
        let twice = once.minimal_completion();
        assert_eq!(once, twice);
    }

    #[test]
    fn minimal_completion_of_root_is_root() {
        let t = Truncation::from_leaf_set(vec![NodeLabel::root()]).unwrap();
        assert_eq!(t.minimal_completion(), t);
    }
}
