//! Reference implementations of the external-collaborator boundary (§6).
//!
//! The core's only contract with the outside world is "deliver a
//! leaf→count map in, consume a finished histogram out" — everything in
//! this module sits on the caller's side of that boundary. None of it is
//! called by [`crate::histogram`], [`crate::coarsening`], or
//! [`crate::density_histogram`]; it exists so that a caller assembling a
//! full estimation pipeline (as [`crate`]'s own demo binary does) doesn't
//! have to reimplement bounding-box estimation, leaf labeling, or MDE
//! selection from scratch.

pub mod bbox;
pub mod label;
pub mod mde;
