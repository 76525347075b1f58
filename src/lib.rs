//! Adaptive histogram density estimation over axis-aligned binary space
//! partitions.
//!
//! The core is a node-address algebra ([`label`]) and the data structures
//! built on top of it — [`truncation`], [`leaf_map`], [`spatial_tree`],
//! [`histogram`] — plus the operations that consume a finished histogram:
//! [`coarsening`] (priority-driven cherry merging), [`density_histogram`]
//! (normalized densities, slicing, sampling), and [`tail_probabilities`]
//! (coverage regions). Everything under [`external`] is a reference
//! implementation of the boundary the core expects callers to fill in —
//! bounding-box estimation, leaf labeling, and MDE trajectory selection —
//! and is never called by the core itself.

pub mod coarsening;
pub mod density_histogram;
pub mod error;
pub mod external;
pub mod histogram;
pub mod label;
pub mod leaf_map;
pub mod spatial_tree;
pub mod tail_probabilities;
pub mod truncation;

pub use coarsening::{
    backtrack_full_trajectory, backtrack_num_steps, backtrack_num_steps_verification,
    backtrack_to_target, CountVolumePriority, PriorityFn,
};
pub use density_histogram::DensityHistogram;
pub use error::TreeError;
pub use histogram::{Histogram, SplitLimits};
pub use label::NodeLabel;
pub use leaf_map::LeafMap;
pub use spatial_tree::{SpatialTree, SplitRule};
pub use tail_probabilities::TailProbabilities;
pub use truncation::Truncation;
