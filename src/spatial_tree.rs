//! Maps [`NodeLabel`]s to axis-aligned boxes by deterministic splitting.

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::label::NodeLabel;

/// Which axis splits a cell at a given depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitRule {
    /// Axis at depth `k` is `k mod d`.
    Cycle,
    /// Axis is whichever side of the current cell is currently widest;
    /// ties broken by the lowest axis index.
    Widest,
    /// A precomputed per-depth axis sequence. Produced when a tree is
    /// derived from another one (e.g. [`crate::density_histogram::DensityHistogram::quick_slice`]
    /// projecting out a set of conditioning axes): the induced split order
    /// on the surviving axes is generally neither a clean cycle nor a
    /// widest-side rule recomputed from scratch, so the exact sequence is
    /// carried explicitly instead.
    Explicit(Vec<usize>),
}

/// The root box plus a splitting rule. Labels are resolved to boxes by
/// descending from the root and repeatedly bisecting the axis the rule
/// picks at that depth.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialTree {
    low: Vec<f64>,
    high: Vec<f64>,
    rule: SplitRule,
}

impl SpatialTree {
    pub fn new(low: Vec<f64>, high: Vec<f64>, rule: SplitRule) -> Result<Self, TreeError> {
        if low.is_empty() {
            return Err(TreeError::EmptyBoundingBox);
        }
        if low.len() != high.len() {
            return Err(TreeError::MismatchedDimension {
                expected: low.len(),
                actual: high.len(),
            });
        }
        for (axis, (&l, &h)) in low.iter().zip(high.iter()).enumerate() {
            if !(l < h) {
                return Err(TreeError::NonPositiveWidth { axis, low: l, high: h });
            }
        }
        Ok(SpatialTree { low, high, rule })
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn root_box(&self) -> (&[f64], &[f64]) {
        (&self.low, &self.high)
    }

    pub fn split_rule(&self) -> &SplitRule {
        &self.rule
    }

    fn root_widths(&self) -> Vec<f64> {
        self.low.iter().zip(&self.high).map(|(l, h)| h - l).collect()
    }

    /// The axis used at each of the first `n` splits (depth `0..n`),
    /// independent of which branch of the tree: every cell at a given depth
    /// was produced by bisecting along the same axis, since bisection
    /// halves a width regardless of which half is kept.
    pub fn split_order_to_depth(&self, n: u64) -> Vec<usize> {
        match &self.rule {
            SplitRule::Cycle => (0..n).map(|k| (k % self.dim() as u64) as usize).collect(),
            SplitRule::Widest => {
                let mut widths = self.root_widths();
                (0..n)
                    .map(|_| {
                        let axis = argmax_ties_lowest(&widths);
                        widths[axis] /= 2.0;
                        axis
                    })
                    .collect()
            }
            SplitRule::Explicit(order) => {
                assert!(
                    order.len() >= n as usize,
                    "explicit split order has {} entries, need {}",
                    order.len(),
                    n
                );
                order[..n as usize].to_vec()
            }
        }
    }

    /// The axis that would be used to split the cell at `label`.
    pub fn axis_at(&self, label: &NodeLabel) -> usize {
        *self
            .split_order_to_depth(label.depth() + 1)
            .last()
            .expect("split_order_to_depth(n) for n >= 1 is non-empty")
    }

    /// The axis that would be used to split a cell at `depth` whose
    /// per-axis widths (at that point in the descent) are `widths`. Unlike
    /// [`SpatialTree::axis_at`], which replays the whole root-to-node path
    /// in `O(depth)` to recover those widths, this is `O(dim)` given widths
    /// the caller is already tracking incrementally (see [`DescendBox`] and
    /// [`crate::external::label::label_points`], both of which carry a
    /// running `(low, high)` box while descending instead of recomputing
    /// `cell_at` from the root at every step).
    pub fn axis_at_incremental(&self, depth: u64, widths: &[f64]) -> usize {
        match &self.rule {
            SplitRule::Cycle => (depth % self.dim() as u64) as usize,
            SplitRule::Widest => argmax_ties_lowest(widths),
            SplitRule::Explicit(order) => order[depth as usize],
        }
    }

    /// The box belonging to `label`.
    pub fn cell_at(&self, label: &NodeLabel) -> (Vec<f64>, Vec<f64>) {
        let axes = self.split_order_to_depth(label.depth());
        let mut low = self.low.clone();
        let mut high = self.high.clone();
        for (axis, bit) in axes.into_iter().zip(label.path_bits()) {
            let mid = (low[axis] + high[axis]) / 2.0;
            if bit {
                low[axis] = mid;
            } else {
                high[axis] = mid;
            }
        }
        (low, high)
    }

    pub fn volume_at(&self, label: &NodeLabel) -> f64 {
        let (low, high) = self.cell_at(label);
        low.iter().zip(&high).map(|(l, h)| h - l).product()
    }

    /// `true` iff `point` lies within the (half-open low, closed high) root
    /// box.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(&x, (&l, &h))| x >= l && x <= h)
    }

    /// Labels of the cells containing `point`, starting at the root and
    /// descending one level per item, bounded to `max_depth` inclusive
    /// (`max_depth + 1` items total). Does not check that `point` lies in
    /// the root box; callers that care about out-of-box semantics check
    /// [`SpatialTree::contains`] first.
    pub fn descend_box<'t>(&'t self, point: &[f64], max_depth: u64) -> impl Iterator<Item = NodeLabel> + 't {
        DescendBox::new(self, point.to_vec(), max_depth).map(|(label, _, _)| label)
    }

    /// Like [`SpatialTree::descend_box`] but also yields each cell's box.
    /// The box for each yielded label comes directly out of [`DescendBox`]'s
    /// own running `(low, high)` state — this is the incremental cache of
    /// §2 item 4: descending to depth `k` is `O(k)` total (one bisection
    /// per step), not `O(k^2)` from calling [`SpatialTree::cell_at`] (which
    /// replays the path from the root) once per yielded label.
    pub fn descend_box_prime<'t>(
        &'t self,
        point: &[f64],
        max_depth: u64,
    ) -> impl Iterator<Item = (NodeLabel, Vec<f64>, Vec<f64>)> + 't {
        DescendBox::new(self, point.to_vec(), max_depth)
    }
}

fn argmax_ties_lowest(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Bounded iterator descending the tree towards `point`, carrying its own
/// running `(low, high)` box instead of recomputing it from the root at
/// every step. Each step picks its split axis via
/// [`SpatialTree::axis_at_incremental`] from the box it already has in
/// hand, so total work across a depth-`n` descent is `O(n)`, matching the
/// lazy-stream descent of the source this crate generalizes (§9).
struct DescendBox<'t> {
    tree: &'t SpatialTree,
    point: Vec<f64>,
    label: NodeLabel,
    low: Vec<f64>,
    high: Vec<f64>,
    remaining: u64,
}

impl<'t> DescendBox<'t> {
    fn new(tree: &'t SpatialTree, point: Vec<f64>, max_depth: u64) -> Self {
        DescendBox {
            tree,
            point,
            label: NodeLabel::root(),
            low: tree.low.clone(),
            high: tree.high.clone(),
            remaining: max_depth + 1,
        }
    }
}

impl<'t> Iterator for DescendBox<'t> {
    type Item = (NodeLabel, Vec<f64>, Vec<f64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let result = (self.label.clone(), self.low.clone(), self.high.clone());

        let widths: Vec<f64> = self.low.iter().zip(&self.high).map(|(&l, &h)| h - l).collect();
        let axis = self.tree.axis_at_incremental(self.label.depth(), &widths);
        let mid = (self.low[axis] + self.high[axis]) / 2.0;
        if self.point[axis] >= mid {
            self.label = self.label.right();
            self.low[axis] = mid;
        } else {
            self.label = self.label.left();
            self.high[axis] = mid;
        }

        Some(result)
    }
}
