//! Leaf labeling of raw points against a [`SpatialTree`] (§10.5), the
//! other half of the input contract (§6) the core expects a caller to
//! fill in before ever touching a [`crate::histogram::Histogram`].

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::TreeError;
use crate::label::NodeLabel;
use crate::leaf_map::LeafMap;
use crate::spatial_tree::SpatialTree;
use crate::truncation::Truncation;

/// Descends a single point until the widest side of the current cell
/// falls below `finest_res_side_length`, returning the label of the cell
/// it stops in. Mirrors [`SpatialTree::descend_box`] but without a
/// pre-known depth bound, since the stopping rule here is geometric
/// (side length) rather than a fixed depth. Tracks `(low, high)`
/// incrementally and asks for each step's axis via
/// [`SpatialTree::axis_at_incremental`] (`O(dim)`) rather than
/// [`SpatialTree::axis_at`] (`O(depth)`, replays the path from the root) —
/// without this, labeling a point at depth `d` would cost `O(d^2)` instead
/// of `O(d)`.
fn label_one(tree: &SpatialTree, point: &[f64], finest_res_side_length: f64) -> NodeLabel {
    let (root_low, root_high) = tree.root_box();
    let mut low = root_low.to_vec();
    let mut high = root_high.to_vec();
    let mut label = NodeLabel::root();

    loop {
        let widths: Vec<f64> = low.iter().zip(&high).map(|(&l, &h)| h - l).collect();
        let widest = widths.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if widest < finest_res_side_length {
            return label;
        }
        let axis = tree.axis_at_incremental(label.depth(), &widths);
        let mid = (low[axis] + high[axis]) / 2.0;
        if point[axis] >= mid {
            label = label.right();
            low[axis] = mid;
        } else {
            label = label.left();
            high[axis] = mid;
        }
    }
}

/// Counts of points per leaf label, sorted by label — the per-chunk
/// accumulator that [`label_points`] folds in parallel and then merges.
type SortedCounts = Vec<(NodeLabel, u64)>;

fn accumulate_chunk(tree: &SpatialTree, finest_res_side_length: f64, chunk: &[Vec<f64>]) -> SortedCounts {
    tracing::trace!(points = chunk.len(), "labeling point chunk");
    let mut counts: HashMap<NodeLabel, u64> = HashMap::new();
    for point in chunk {
        let label = label_one(tree, point, finest_res_side_length);
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut sorted: SortedCounts = counts.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

/// Merges two label-sorted count vectors into one, summing counts for
/// labels the two chunks share — the same walk-two-sorted-sequences shape
/// as [`Truncation::cherries`], just merging by equality instead of by
/// sibling adjacency.
fn merge_sorted(a: SortedCounts, b: SortedCounts) -> SortedCounts {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => {
                merged.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                merged.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                merged.push((a[i].0.clone(), a[i].1 + b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

/// Labels every point in `points` against `tree`, stopping descent once a
/// cell's widest side falls below `finest_res_side_length`, and returns
/// the resulting `LeafMap<Count>` ready to hand to
/// [`crate::histogram::Histogram::new`].
///
/// Parallelized with `rayon` over point chunks (this is the one place in
/// the crate that legitimately parallelizes: §5 scopes the core itself to
/// single-threaded execution, but this function sits entirely outside the
/// core). Each chunk is folded into a sorted per-chunk count vector, then
/// chunks are merged pairwise by label.
pub fn label_points(
    tree: &SpatialTree,
    finest_res_side_length: f64,
    points: &[Vec<f64>],
) -> Result<LeafMap<u64>, TreeError> {
    if points.is_empty() {
        return Err(TreeError::ZeroTotalCount);
    }

    const CHUNK_SIZE: usize = 4096;
    let merged = points
        .par_chunks(CHUNK_SIZE)
        .map(|chunk| accumulate_chunk(tree, finest_res_side_length, chunk))
        .reduce(Vec::new, merge_sorted);

    let (labels, counts): (Vec<NodeLabel>, Vec<u64>) = merged.into_iter().unzip();
    let truncation = Truncation::from_leaf_set(labels)?;
    LeafMap::from_parts(truncation, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_tree::SplitRule;

    fn unit_square() -> SpatialTree {
        SpatialTree::new(vec![0.0, 0.0], vec![1.0, 1.0], SplitRule::Cycle).unwrap()
    }

    #[test]
    fn rejects_empty_points() {
        let t = unit_square();
        assert!(label_points(&t, 0.1, &[]).is_err());
    }

    #[test]
    fn every_point_maps_into_a_leaf_cell() {
        let t = unit_square();
        let points: Vec<Vec<f64>> = (0..500)
            .map(|i| {
                let x = (i as f64 * 0.0171) % 1.0;
                let y = (i as f64 * 0.0241) % 1.0;
                vec![x, y]
            })
            .collect();
        let map = label_points(&t, 0.05, &points).unwrap();
        let total: u64 = map.values().iter().sum();
        assert_eq!(total, points.len() as u64);
        for label in map.truncation().leaves() {
            let (low, high) = t.cell_at(label);
            let widest = low.iter().zip(&high).map(|(l, h)| h - l).fold(f64::MIN, f64::max);
            assert!(widest < 0.05 + 1e-9 || label.is_root());
        }
    }

    #[test]
    fn merge_sorted_sums_shared_labels() {
        let l1 = NodeLabel::from_u64(4).unwrap();
        let l2 = NodeLabel::from_u64(5).unwrap();
        let a = vec![(l1.clone(), 2u64), (l2.clone(), 3u64)];
        let b = vec![(l1.clone(), 5u64)];
        let merged = merge_sorted(a, b);
        assert_eq!(merged, vec![(l1, 7), (l2, 3)]);
    }
}
