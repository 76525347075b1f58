//! A [`SpatialTree`] plus a total count and a per-leaf [`LeafMap`] of counts.
//!
//! Constructed once from an external leaf-labeling collaborator (or, for
//! small in-memory inputs, via [`Histogram::split_and_count_from`]); every
//! further transformation (coarsening, normalization) produces a fresh
//! value rather than mutating this one.

use crate::error::TreeError;
use crate::label::NodeLabel;
use crate::leaf_map::LeafMap;
use crate::spatial_tree::SpatialTree;
use crate::truncation::Truncation;

/// `(tree, totalCount, counts: LeafMap<Count>)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    tree: SpatialTree,
    total_count: u64,
    counts: LeafMap<u64>,
}

impl Histogram {
    /// Builds a histogram from an external aggregator's leaf→count map.
    /// `labels` must already be in canonical left/right order (this is part
    /// of the input contract, not something this constructor infers): a
    /// caller that got the order wrong gets `InputNotSorted`, not a silent
    /// re-sort.
    pub fn new(
        tree: SpatialTree,
        total_count: u64,
        labels: Vec<NodeLabel>,
        counts: Vec<u64>,
    ) -> Result<Self, TreeError> {
        if total_count == 0 {
            return Err(TreeError::ZeroTotalCount);
        }
        if labels.len() != counts.len() {
            return Err(TreeError::MismatchedDimension {
                expected: labels.len(),
                actual: counts.len(),
            });
        }
        if labels.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(TreeError::InputNotSorted);
        }
        if labels
            .windows(2)
            .any(|w| w[0].is_ancestor_of(&w[1]) || w[1].is_ancestor_of(&w[0]))
        {
            return Err(TreeError::InputNotAntichain);
        }
        if let Some(&zero) = counts.iter().find(|&&c| c == 0) {
            return Err(TreeError::ZeroLeafCount(zero));
        }
        let sum: u64 = counts.iter().sum();
        if sum != total_count {
            return Err(TreeError::CountSumMismatch {
                expected: total_count,
                actual: sum,
            });
        }
        let truncation = Truncation::from_sorted_antichain_unchecked(labels);
        let counts = LeafMap::from_parts_unchecked(truncation, counts);
        Ok(Histogram {
            tree,
            total_count,
            counts,
        })
    }

    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn counts(&self) -> &LeafMap<u64> {
        &self.counts
    }

    fn max_leaf_depth(&self) -> u64 {
        self.counts
            .truncation()
            .leaves()
            .iter()
            .map(|l| l.depth())
            .max()
            .unwrap_or(0)
    }

    /// `count / (totalCount * volume(leaf))`, or `0.0` if `point` falls
    /// outside the root box or into a gap not covered by any leaf.
    pub fn density(&self, point: &[f64]) -> f64 {
        if !self.tree.contains(point) {
            return 0.0;
        }
        let descent = self.tree.descend_box(point, self.max_leaf_depth());
        let (leaf, count) = self.counts.query(descent);
        match count {
            Some(&c) => c as f64 / (self.total_count as f64 * self.tree.volume_at(&leaf)),
            None => 0.0,
        }
    }

    /// Adjacent sibling pairs in this histogram's truncation, in left/right
    /// order: `(parent, combinedCount)`.
    pub fn cherries(&self) -> impl Iterator<Item = (NodeLabel, u64)> + '_ {
        self.counts.truncation().cherries().map(move |(p, range)| {
            let sum = self.counts.values()[range].iter().sum();
            (p, sum)
        })
    }

    /// Converts to a [`crate::density_histogram::DensityHistogram`]:
    /// `density = count / (totalCount * volume)` per leaf.
    pub fn normalize(&self) -> crate::density_histogram::DensityHistogram {
        let values: Vec<(f64, f64)> = self
            .counts
            .iter()
            .map(|(label, &count)| {
                let vol = self.tree.volume_at(label);
                (count as f64 / (self.total_count as f64 * vol), vol)
            })
            .collect();
        let map = LeafMap::from_parts_unchecked(self.counts.truncation().clone(), values);
        crate::density_histogram::DensityHistogram::from_parts(self.tree.clone(), map)
    }

    /// In-memory alternative to the external aggregator (§4.3): starting
    /// from `start_trunc`, recursively splits any cell for which
    /// `lims.should_split(depth, volume, count)` holds, stopping at cells
    /// that fail it. Every returned leaf fails `lims`; every parent of a
    /// returned leaf passed it.
    pub fn split_and_count_from(
        tree: SpatialTree,
        start_trunc: &Truncation,
        points: &[Vec<f64>],
        lims: &SplitLimits,
    ) -> Result<Histogram, TreeError> {
        let mut labels = Vec::new();
        let mut counts = Vec::new();
        for start in start_trunc.leaves() {
            let (low, high) = tree.cell_at(start);
            let in_cell: Vec<&Vec<f64>> = points
                .iter()
                .filter(|p| point_in_box(p, &low, &high))
                .collect();
            split_recursive(&tree, start.clone(), &in_cell, lims, &mut labels, &mut counts);
        }
        let total_count = counts.iter().sum();
        Histogram::new(tree, total_count, labels, counts)
    }
}

fn point_in_box(point: &[f64], low: &[f64], high: &[f64]) -> bool {
    point
        .iter()
        .zip(low.iter().zip(high))
        .all(|(&x, (&l, &h))| x >= l && x <= h)
}

fn split_recursive(
    tree: &SpatialTree,
    label: NodeLabel,
    points: &[&Vec<f64>],
    lims: &SplitLimits,
    labels_out: &mut Vec<NodeLabel>,
    counts_out: &mut Vec<u64>,
) {
    let count = points.len() as u64;
    if count == 0 {
        return;
    }
    let vol = tree.volume_at(&label);
    if !lims.should_split(label.depth(), vol, count) {
        labels_out.push(label);
        counts_out.push(count);
        return;
    }
    let axis = tree.axis_at(&label);
    let (low, high) = tree.cell_at(&label);
    let mid = (low[axis] + high[axis]) / 2.0;
    let mut left_pts = Vec::new();
    let mut right_pts = Vec::new();
    for &p in points {
        if p[axis] >= mid {
            right_pts.push(p);
        } else {
            left_pts.push(p);
        }
    }
    split_recursive(tree, label.left(), &left_pts, lims, labels_out, counts_out);
    split_recursive(tree, label.right(), &right_pts, lims, labels_out, counts_out);
}

/// The `lims` predicate of §4.3: decides whether a cell should be split
/// further given its depth, volume, and point count.
pub struct SplitLimits(Box<dyn Fn(u64, f64, u64) -> bool + Send + Sync>);

impl SplitLimits {
    /// Split while a leaf holds more than `max_leaf_count` points.
    pub fn by_count(max_leaf_count: u64) -> Self {
        SplitLimits(Box::new(move |_depth, _vol, count| count > max_leaf_count))
    }

    /// Split while a leaf holds more than `max_leaf_count` points, or while
    /// its volume relative to `total_volume` still exceeds
    /// `min_relative_volume` after weighting by how much of `total_count`
    /// it still represents: the canonical policy from §4.3,
    /// `(1 - count/totalCount) * vol > minRelativeVolume * totalVol`.
    pub fn by_count_and_volume(
        total_count: u64,
        total_volume: f64,
        max_leaf_count: u64,
        min_relative_volume: f64,
    ) -> Self {
        SplitLimits(Box::new(move |_depth, vol, count| {
            count > max_leaf_count
                || (1.0 - count as f64 / total_count as f64) * vol
                    > min_relative_volume * total_volume
        }))
    }

    pub fn should_split(&self, depth: u64, volume: f64, count: u64) -> bool {
        (self.0)(depth, volume, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_tree::SplitRule;
    use claims::{assert_err_eq, assert_ok};

    fn lbl(v: u64) -> NodeLabel {
        NodeLabel::from_u64(v).unwrap()
    }

    fn unit_square() -> SpatialTree {
        SpatialTree::new(vec![0.0, 0.0], vec![1.0, 1.0], SplitRule::Cycle).unwrap()
    }

    #[test]
    fn rejects_zero_total_count() {
        let err = Histogram::new(unit_square(), 0, vec![NodeLabel::root()], vec![0]).unwrap_err();
        assert_eq!(err, TreeError::ZeroTotalCount);
    }

    #[test]
    fn rejects_unsorted_labels() {
        let err = Histogram::new(unit_square(), 2, vec![lbl(5), lbl(4)], vec![1, 1]).unwrap_err();
        assert_eq!(err, TreeError::InputNotSorted);
    }

    #[test]
    fn rejects_count_sum_mismatch() {
        let err = Histogram::new(unit_square(), 5, vec![lbl(4), lbl(5)], vec![1, 1]).unwrap_err();
        assert_eq!(
            err,
            TreeError::CountSumMismatch {
                expected: 5,
                actual: 2
            }
        );
    }

    #[test]
    fn density_is_zero_outside_root_box() {
        let h = Histogram::new(unit_square(), 4, vec![NodeLabel::root()], vec![4]).unwrap();
        assert_eq!(h.density(&[2.0, 2.0]), 0.0);
    }

    #[test]
    fn density_single_leaf_covers_whole_box() {
        let h = Histogram::new(unit_square(), 4, vec![NodeLabel::root()], vec![4]).unwrap();
        assert!((h.density(&[0.3, 0.7]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_split_halves_density_on_each_side() {
        let t = unit_square();
        let h = Histogram::new(t, 10, vec![lbl(2), lbl(3)], vec![7, 3]).unwrap();
        assert!((h.density(&[0.2, 0.5]) - 14.0).abs() < 1e-9);
        assert!((h.density(&[0.8, 0.5]) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn cherries_sums_children() {
        let t = unit_square();
        let h = Histogram::new(t, 10, vec![lbl(4), lbl(5), lbl(3)], vec![3, 4, 3]).unwrap();
        let found: Vec<_> = h.cherries().collect();
        assert_eq!(found, vec![(lbl(2), 7)]);
    }

    #[test]
    fn normalize_conserves_total_mass() {
        let t = unit_square();
        let h = Histogram::new(t, 10, vec![lbl(4), lbl(5), lbl(3)], vec![3, 4, 3]).unwrap();
        let dh = h.normalize();
        let mass: f64 = dh
            .density_map()
            .values()
            .iter()
            .map(|&(d, v)| d * v)
            .sum();
        assert!((mass - 1.0).abs() < 1e-10);
    }

    #[test]
    fn split_and_count_from_stops_when_lims_fails() {
        let t = unit_square();
        let points = vec![
            vec![0.1, 0.1],
            vec![0.1, 0.2],
            vec![0.1, 0.3],
            vec![0.9, 0.9],
        ];
        let start = Truncation::from_leaf_set(vec![NodeLabel::root()]).unwrap();
        let lims = SplitLimits::by_count(1);
        let h = assert_ok!(Histogram::split_and_count_from(t, &start, &points, &lims));
        assert_eq!(h.total_count(), 4);
        for &count in h.counts().values() {
            assert!(count <= 2, "every leaf should have stopped splitting once small enough");
        }
    }

    #[test]
    fn split_and_count_from_rejects_empty_start() {
        let t = unit_square();
        let start = Truncation::from_leaf_set(vec![NodeLabel::root()]).unwrap();
        let lims = SplitLimits::by_count(10);
        assert_err_eq!(
            Histogram::split_and_count_from(t, &start, &[], &lims),
            TreeError::ZeroTotalCount
        );
    }
}
