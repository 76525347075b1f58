//! Error types.
//!
//! Per the failure-kind taxonomy: `DomainError` variants reject malformed
//! input at construction time. `OutOfBox`/`NullSlice` are *not* error
//! variants — they are total-function sentinels (`0.0`, `1.0`, `None`)
//! returned by `density`/`query`/`quick_slice`, never `Err`.
//! `ContractViolation` (an ill-formed target histogram, or a coarsening
//! asked for zero steps) is a programmer error and panics rather than
//! returning a `Result`.

use thiserror::Error;

// `PartialEq` only (not `Eq`): `NonPositiveWidth` carries `f64` fields, and
// `f64` does not implement `Eq`.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum TreeError {
    #[error("node label must be >= 1")]
    LabelNotPositive,

    #[error("bounding box must have at least one axis")]
    EmptyBoundingBox,

    #[error("bounding box axis {axis} has non-positive width (low={low}, high={high})")]
    NonPositiveWidth { axis: usize, low: f64, high: f64 },

    #[error("total count must be > 0")]
    ZeroTotalCount,

    #[error("expected {expected} dimensions, got {actual}")]
    MismatchedDimension { expected: usize, actual: usize },

    #[error(
        "split order has {have} entries but a leaf at depth {need} was encountered; \
         split order must cover every leaf depth"
    )]
    SplitOrderTooShort { have: usize, need: usize },

    #[error("input labels are not in canonical left/right order")]
    InputNotSorted,

    #[error("input labels are not a pairwise-incomparable antichain")]
    InputNotAntichain,

    #[error("leaf counts sum to {actual}, expected total count {expected}")]
    CountSumMismatch { expected: u64, actual: u64 },

    #[error("leaf count must be > 0 (label had count {0})")]
    ZeroLeafCount(u64),
}
