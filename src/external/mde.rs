//! Minimum-distance-estimate (MDE) selection over a backtrack trajectory
//! (§4.9). Outside the core's invariants — this only calls the public
//! coarsening/density APIs — but every real use of the core runs one of
//! these after building a histogram, so it ships as a reference
//! implementation rather than being left for every caller to rewrite.

use crate::histogram::Histogram;
use crate::leaf_map::LeafMap;

/// `J(h) = Σ density^2 * volume − (2 / n_validation) * Σ density *
/// validationCount`, the standard cross-validation risk estimate for
/// density histograms (lower is better). `validation_counts` must be
/// counts of held-out points descended through the same spatial tree as
/// `h` (one entry per leaf of `h`, aligned by index — the caller gets this
/// for free by slicing a full validation [`LeafMap`] with `h`'s own
/// truncation boundaries, e.g. via [`crate::external::label::label_points`]
/// against the training tree).
fn risk(h: &Histogram, validation_counts: &LeafMap<u64>, n_validation: u64) -> f64 {
    let dh = h.normalize();
    let mut penalty = 0.0;
    for (_, &(density, volume)) in dh.density_map().iter() {
        penalty += density * density * volume;
    }

    let mut cross = 0.0;
    for (label, &(density, _)) in dh.density_map().iter() {
        let range = validation_counts.truncation().subtree(label);
        let count: u64 = validation_counts.values()[range].iter().sum();
        cross += density * count as f64;
    }
    penalty - (2.0 / n_validation as f64) * cross
}

/// Evaluates `J` (§4.9) over a (possibly strided) subset of `trajectory`'s
/// histograms and returns the index of the best one, ties broken towards
/// the coarser (later) candidate. `validation_counts` must be a
/// `LeafMap<Count>` of held-out points whose labels descend through the
/// *same* tree as every histogram in `trajectory` (true of any trajectory
/// produced by [`crate::coarsening::backtrack_full_trajectory`], since
/// coarsening never changes the tree).
///
/// `stride` (the `kInMDE` runtime parameter, §6) selects every `stride`-th
/// candidate rather than every single step, for cost control on deep
/// trajectories; `stride = 1` evaluates every step. The trajectory's final
/// entry is always evaluated even if the stride would otherwise skip it.
pub fn select<'t>(
    trajectory: &'t [Histogram],
    validation_counts: &LeafMap<u64>,
    stride: usize,
) -> &'t Histogram {
    assert!(!trajectory.is_empty(), "MDE selection requires a non-empty trajectory");
    let stride = stride.max(1);
    let n_validation: u64 = validation_counts.values().iter().sum::<u64>().max(1);

    let mut candidate_indices: Vec<usize> = (0..trajectory.len()).step_by(stride).collect();
    if *candidate_indices.last().unwrap() != trajectory.len() - 1 {
        candidate_indices.push(trajectory.len() - 1);
    }

    let mut best_idx = candidate_indices[0];
    let mut best_risk = risk(&trajectory[best_idx], validation_counts, n_validation);
    for &idx in &candidate_indices[1..] {
        let r = risk(&trajectory[idx], validation_counts, n_validation);
        // Ties (within float noise) prefer the coarser candidate: `idx`
        // only replaces `best_idx` on a strict improvement, and candidates
        // are visited in increasing (i.e. increasingly coarse) order.
        if r <= best_risk {
            best_risk = r;
            best_idx = idx;
        }
    }
    &trajectory[best_idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coarsening::{backtrack_full_trajectory, CountVolumePriority};
    use crate::label::NodeLabel;
    use crate::spatial_tree::{SpatialTree, SplitRule};
    use crate::truncation::Truncation;

    fn unit_line() -> SpatialTree {
        SpatialTree::new(vec![0.0], vec![8.0], SplitRule::Cycle).unwrap()
    }

    fn lbl(v: u64) -> NodeLabel {
        NodeLabel::from_u64(v).unwrap()
    }

    #[test]
    fn trajectory_of_length_one_is_selected_trivially() {
        let t = unit_line();
        let h = Histogram::new(t, 10, vec![NodeLabel::root()], vec![10]).unwrap();
        let trajectory = vec![h.clone()];
        let validation_truncation = Truncation::from_leaf_set(vec![NodeLabel::root()]).unwrap();
        let validation = LeafMap::from_parts(validation_truncation, vec![5u64]).unwrap();
        let chosen = select(&trajectory, &validation, 1);
        assert_eq!(chosen, &h);
    }

    #[test]
    fn neither_finest_nor_coarsest_wins_on_a_bimodal_fixture() {
        // Two well-separated clusters (near 1.0 and near 7.0) in an 8-wide
        // 1-D domain, split into leaves of width 1. Training counts are
        // concentrated, validation mirrors the same bimodal shape: the
        // finest (8-leaf) histogram overfits noise between leaves that
        // training alone can't distinguish from real structure, and the
        // coarsest (1-leaf, uniform) histogram smooths the two modes away
        // entirely, so an intermediate 2-leaf split (low half vs. high
        // half) should score best.
        let t = unit_line();
        let train = Histogram::new(
            t.clone(),
            80,
            vec![lbl(8), lbl(9), lbl(10), lbl(11), lbl(12), lbl(13), lbl(14), lbl(15)],
            vec![18, 20, 1, 1, 1, 1, 18, 20],
        )
        .unwrap();
        let trajectory = backtrack_full_trajectory(&train, CountVolumePriority::new(80));

        let validation_truncation = Truncation::from_leaf_set(vec![
            lbl(8),
            lbl(9),
            lbl(10),
            lbl(11),
            lbl(12),
            lbl(13),
            lbl(14),
            lbl(15),
        ])
        .unwrap();
        let validation = LeafMap::from_parts(validation_truncation, vec![17, 19, 2, 1, 1, 2, 19, 17]).unwrap();

        let chosen = select(&trajectory, &validation, 1);
        let n_leaves = chosen.counts().len();
        assert!(
            n_leaves > 1 && n_leaves < 8,
            "MDE should prefer an intermediate resolution, got {n_leaves} leaves"
        );
    }
}
