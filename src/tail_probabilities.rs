//! Cumulative-probability map over a [`DensityHistogram`]'s leaves, used to
//! answer coverage-region ("level-set tail probability") queries.

use crate::density_histogram::DensityHistogram;
use crate::leaf_map::LeafMap;
use crate::spatial_tree::SpatialTree;

/// `(tree, tails: LeafMap<Probability>)`. Built by sorting leaves by
/// density descending and accumulating `density * volume`; the value
/// stored per leaf is the cumulative probability up to and including it.
#[derive(Clone, Debug, PartialEq)]
pub struct TailProbabilities {
    tree: SpatialTree,
    tails: LeafMap<f64>,
}

impl TailProbabilities {
    pub fn from_density(dh: &DensityHistogram) -> TailProbabilities {
        let truncation = dh.density_map().truncation().clone();
        let leaves = truncation.leaves();
        let values = dh.density_map().values();

        let mut order: Vec<usize> = (0..leaves.len()).collect();
        order.sort_by(|&a, &b| {
            values[b]
                .0
                .partial_cmp(&values[a].0)
                .unwrap()
                .then_with(|| leaves[a].cmp(&leaves[b]))
        });

        let mut cumulative = vec![0.0; leaves.len()];
        let mut running = 0.0;
        for &i in &order {
            let (density, volume) = values[i];
            running += density * volume;
            cumulative[i] = running;
        }

        TailProbabilities {
            tree: dh.tree().clone(),
            tails: LeafMap::from_parts_unchecked(truncation, cumulative),
        }
    }

    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    pub fn tails(&self) -> &LeafMap<f64> {
        &self.tails
    }

    fn max_leaf_depth(&self) -> u64 {
        self.tails
            .truncation()
            .leaves()
            .iter()
            .map(|l| l.depth())
            .max()
            .unwrap_or(0)
    }

    /// `1.0` outside the root box or on an uncovered leaf — both are
    /// null-measure under the density and so lie in the complement of
    /// every finite coverage region.
    pub fn query(&self, point: &[f64]) -> f64 {
        if !self.tree.contains(point) {
            return 1.0;
        }
        let descent = self.tree.descend_box(point, self.max_leaf_depth());
        match self.tails.query(descent).1 {
            Some(&v) => v,
            None => 1.0,
        }
    }

    /// Smallest stored cumulative value `>= alpha`: the boundary of the
    /// smallest coverage region containing probability mass `alpha`.
    pub fn confidence_region(&self, alpha: f64) -> f64 {
        if alpha > 1.0 {
            return 1.0;
        }
        self.tails
            .values()
            .iter()
            .copied()
            .filter(|&v| v >= alpha - 1e-12)
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::NodeLabel;
    use crate::spatial_tree::SplitRule;
    use crate::truncation::Truncation;
    use more_asserts::assert_le;

    fn lbl(v: u64) -> NodeLabel {
        NodeLabel::from_u64(v).unwrap()
    }

    /// 1-D density with leaves `[4,5,6,7]` and densities
    /// `[0.5,0.25,0.15,0.1]` (each volume 1), matching §8's scenario.
    fn scenario() -> TailProbabilities {
        let tree = SpatialTree::new(vec![0.0], vec![4.0], SplitRule::Cycle).unwrap();
        let truncation = Truncation::from_leaf_set(vec![lbl(4), lbl(5), lbl(6), lbl(7)]).unwrap();
        let values = vec![(0.5, 1.0), (0.25, 1.0), (0.15, 1.0), (0.1, 1.0)];
        let map = LeafMap::from_parts(truncation, values).unwrap();
        let dh = DensityHistogram::from_parts(tree, map);
        TailProbabilities::from_density(&dh)
    }

    fn center_of(label: &NodeLabel, tp: &TailProbabilities) -> Vec<f64> {
        let (low, high) = tp.tree.cell_at(label);
        low.iter().zip(&high).map(|(l, h)| (l + h) / 2.0).collect()
    }

    #[test]
    fn cumulative_probabilities_match_scenario() {
        let tp = scenario();
        assert!((tp.query(&center_of(&lbl(4), &tp)) - 0.5).abs() < 1e-9);
        assert!((tp.query(&center_of(&lbl(5), &tp)) - 0.75).abs() < 1e-9);
        assert!((tp.query(&center_of(&lbl(6), &tp)) - 0.90).abs() < 1e-9);
        assert!((tp.query(&center_of(&lbl(7), &tp)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_region_matches_scenario() {
        let tp = scenario();
        assert!((tp.confidence_region(0.74) - 0.75).abs() < 1e-9);
        assert!((tp.confidence_region(0.91) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn max_tail_value_is_one() {
        let tp = scenario();
        let max = tp.tails.values().iter().cloned().fold(f64::MIN, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_box_point_has_tail_one() {
        let tp = scenario();
        assert_eq!(tp.query(&[100.0]), 1.0);
    }

    #[test]
    fn confidence_region_is_monotone() {
        let tp = scenario();
        let mut prev = 0.0;
        for &alpha in &[0.1, 0.3, 0.5, 0.7, 0.74, 0.9, 0.91, 1.0] {
            let region = tp.confidence_region(alpha);
            assert_le!(prev, region);
            assert_le!(alpha, region + 1e-9);
            prev = region;
        }
    }
}
