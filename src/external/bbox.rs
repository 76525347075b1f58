//! Bounding-box estimation from a point slice (§10.5).

use crate::error::TreeError;

/// Scans `points` once, taking the componentwise min/max, then pads each
/// axis outward by `relative_padding` of its width so every sample point
/// lands strictly inside the box rather than on its boundary (the root
/// box's invariant is `low[i] < high[i]`, and [`crate::spatial_tree::SpatialTree::contains`]
/// treats the boundary as closed on the high side but a point sitting
/// exactly on a raw min/max would still be on the edge of the first
/// split).
///
/// Returns [`TreeError::EmptyBoundingBox`] if `points` is empty, and
/// [`TreeError::MismatchedDimension`] if the points don't all share the
/// first point's dimension.
pub fn estimate(points: &[Vec<f64>], relative_padding: f64) -> Result<(Vec<f64>, Vec<f64>), TreeError> {
    let dim = match points.first() {
        Some(p) => p.len(),
        None => return Err(TreeError::EmptyBoundingBox),
    };
    let mut low = vec![f64::INFINITY; dim];
    let mut high = vec![f64::NEG_INFINITY; dim];
    for p in points {
        if p.len() != dim {
            return Err(TreeError::MismatchedDimension {
                expected: dim,
                actual: p.len(),
            });
        }
        for (axis, &x) in p.iter().enumerate() {
            if x < low[axis] {
                low[axis] = x;
            }
            if x > high[axis] {
                high[axis] = x;
            }
        }
    }
    for axis in 0..dim {
        let width = high[axis] - low[axis];
        // A degenerate (zero-width) axis still gets padded by an absolute
        // nudge, since a relative pad of zero width is zero.
        let pad = if width > 0.0 { width * relative_padding } else { relative_padding.max(1e-6) };
        low[axis] -= pad;
        high[axis] += pad;
    }
    Ok((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_err_eq;

    #[test]
    fn rejects_empty_input() {
        assert_err_eq!(estimate(&[], 0.01), TreeError::EmptyBoundingBox);
    }

    #[test]
    fn contains_every_point_after_padding() {
        let points = vec![vec![0.0, 1.0], vec![2.0, -1.0], vec![1.0, 0.5]];
        let (low, high) = estimate(&points, 0.05).unwrap();
        for p in &points {
            for (axis, &x) in p.iter().enumerate() {
                assert!(x > low[axis] && x < high[axis]);
            }
        }
    }

    #[test]
    fn degenerate_axis_still_gets_padded() {
        let points = vec![vec![1.0, 1.0], vec![1.0, 2.0]];
        let (low, high) = estimate(&points, 0.1).unwrap();
        assert!(low[0] < 1.0 && high[0] > 1.0);
    }

    #[test]
    fn rejects_mismatched_dimension() {
        let points = vec![vec![0.0, 0.0], vec![1.0]];
        let err = estimate(&points, 0.01).unwrap_err();
        assert_eq!(
            err,
            TreeError::MismatchedDimension {
                expected: 2,
                actual: 1
            }
        );
    }
}
