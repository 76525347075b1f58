//! Normalized histogram: each leaf carries `(density, volume)` instead of a
//! raw count. Supports axis-subset slicing (§4.6) and sampling (§4.8).

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::TreeError;
use crate::label::NodeLabel;
use crate::leaf_map::LeafMap;
use crate::spatial_tree::{SpatialTree, SplitRule};

/// `(tree, densityMap: LeafMap<(density, volume)>)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityHistogram {
    tree: SpatialTree,
    density_map: LeafMap<(f64, f64)>,
}

impl DensityHistogram {
    pub(crate) fn from_parts(tree: SpatialTree, density_map: LeafMap<(f64, f64)>) -> Self {
        DensityHistogram { tree, density_map }
    }

    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    pub fn density_map(&self) -> &LeafMap<(f64, f64)> {
        &self.density_map
    }

    fn max_leaf_depth(&self) -> u64 {
        self.density_map
            .truncation()
            .leaves()
            .iter()
            .map(|l| l.depth())
            .max()
            .unwrap_or(0)
    }

    /// Density at `point`: `0.0` outside the root box or in an uncovered
    /// gap.
    pub fn density(&self, point: &[f64]) -> f64 {
        if !self.tree.contains(point) {
            return 0.0;
        }
        let descent = self.tree.descend_box(point, self.max_leaf_depth());
        match self.density_map.query(descent).1 {
            Some(&(d, _)) => d,
            None => 0.0,
        }
    }

    /// Conditional density fixing `axes` to `point`, over the complementary
    /// axes. `split_order` must cover at least the deepest leaf of this
    /// histogram (a caller-suppliable precondition; violating it is a
    /// recoverable [`TreeError::SplitOrderTooShort`], not a panic). Returns
    /// `Ok(None)` — the null sentinel — if `point` falls outside the
    /// projected root box, or if no leaf's conditioning-axis path agrees
    /// with `point`.
    pub fn quick_slice(
        &self,
        axes: &[usize],
        point: &[f64],
        split_order: &[usize],
    ) -> Result<Option<DensityHistogram>, TreeError> {
        if point.len() != axes.len() {
            return Err(TreeError::MismatchedDimension {
                expected: axes.len(),
                actual: point.len(),
            });
        }
        let max_depth = self.max_leaf_depth();
        if (split_order.len() as u64) < max_depth {
            return Err(TreeError::SplitOrderTooShort {
                have: split_order.len(),
                need: max_depth as usize,
            });
        }

        let dim = self.tree.dim();
        let (root_low, root_high) = self.tree.root_box();
        for (k, &axis) in axes.iter().enumerate() {
            if point[k] < root_low[axis] || point[k] > root_high[axis] {
                return Ok(None);
            }
        }

        let comp_axes: Vec<usize> = (0..dim).filter(|a| !axes.contains(a)).collect();
        let axis_index: HashMap<usize, usize> = axes.iter().enumerate().map(|(k, &a)| (a, k)).collect();
        let comp_position: HashMap<usize, usize> =
            comp_axes.iter().enumerate().map(|(i, &a)| (a, i)).collect();

        // groups: new label -> (sum of density*volume weights, sum of
        // weights, complementary-axes volume of the group).
        let mut groups: HashMap<NodeLabel, (f64, f64, f64)> = HashMap::new();

        for (label, &(density, volume)) in self.density_map.iter() {
            let mut low = root_low.to_vec();
            let mut high = root_high.to_vec();
            let mut new_bits: Vec<bool> = Vec::new();
            let mut rejected = false;
            for (k, &bit) in label.path_bits().iter().enumerate() {
                let axis = split_order[k];
                let mid = (low[axis] + high[axis]) / 2.0;
                if bit {
                    low[axis] = mid;
                } else {
                    high[axis] = mid;
                }
                if let Some(&ci) = axis_index.get(&axis) {
                    let side_matches = if bit { point[ci] >= mid } else { point[ci] < mid };
                    if !side_matches {
                        rejected = true;
                        break;
                    }
                } else {
                    new_bits.push(bit);
                }
            }
            if rejected {
                continue;
            }
            let mut new_label = NodeLabel::root();
            for bit in &new_bits {
                new_label = if *bit { new_label.right() } else { new_label.left() };
            }
            let comp_volume: f64 = comp_axes.iter().map(|&a| high[a] - low[a]).product();
            let entry = groups.entry(new_label).or_insert((0.0, 0.0, comp_volume));
            entry.0 += density * volume;
            entry.1 += volume;
        }

        if groups.is_empty() {
            return Ok(None);
        }

        let mut labels: Vec<NodeLabel> = groups.keys().cloned().collect();
        labels.sort();
        let values: Vec<(f64, f64)> = labels
            .iter()
            .map(|l| {
                let (weighted, weight_sum, comp_volume) = groups[l];
                let density = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
                (density, comp_volume)
            })
            .collect();

        if values.iter().all(|&(_, v)| v <= 0.0) {
            return Ok(None);
        }

        let filtered_order: Vec<usize> = split_order[..max_depth as usize]
            .iter()
            .filter(|&&a| !axes.contains(&a))
            .map(|&a| comp_position[&a])
            .collect();

        let low_c: Vec<f64> = comp_axes.iter().map(|&a| root_low[a]).collect();
        let high_c: Vec<f64> = comp_axes.iter().map(|&a| root_high[a]).collect();
        let new_tree = SpatialTree::new(low_c, high_c, SplitRule::Explicit(filtered_order))?;
        let truncation = crate::truncation::Truncation::from_leaf_set(labels)?;
        let map = LeafMap::from_parts(truncation, values)?;
        Ok(Some(DensityHistogram::from_parts(new_tree, map)))
    }

    /// Naive reference implementation of [`DensityHistogram::quick_slice`],
    /// used only to cross-check equivalence in tests: the restriction of
    /// the joint density to the slice is, by definition, just the joint
    /// density evaluated with the conditioning axes pinned — so the naive
    /// way to ask "what does the sliced density say at `free_point`" is to
    /// evaluate the original density at the point obtained by splicing
    /// `point` (on `axes`) and `free_point` (on the complementary axes)
    /// back together.
    #[cfg(test)]
    fn naive_slice_density_at(&self, axes: &[usize], point: &[f64], free_point: &[f64]) -> f64 {
        let dim = self.tree.dim();
        let comp_axes: Vec<usize> = (0..dim).filter(|a| !axes.contains(a)).collect();
        let mut full = vec![0.0; dim];
        for (k, &a) in axes.iter().enumerate() {
            full[a] = point[k];
        }
        for (k, &a) in comp_axes.iter().enumerate() {
            full[a] = free_point[k];
        }
        self.density(&full)
    }

    /// Draws `n` points: a leaf is chosen with probability proportional to
    /// `density * volume`, then a point is drawn uniformly within its box.
    /// Every returned point has `density(point) > 0`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<Vec<f64>> {
        let weights: Vec<f64> = self.density_map.values().iter().map(|&(d, v)| d * v).collect();
        let dist = WeightedIndex::new(&weights).expect("density histogram has positive mass");
        (0..n)
            .map(|_| {
                let idx = dist.sample(rng);
                let label = &self.density_map.truncation().leaves()[idx];
                let (low, high) = self.tree.cell_at(label);
                low.iter()
                    .zip(&high)
                    .map(|(&l, &h)| if h > l { rng.gen_range(l, h) } else { l })
                    .collect()
            })
            .collect()
    }
}
