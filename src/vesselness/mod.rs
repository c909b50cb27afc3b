//! Hessian-based tube likelihood
//!
//! - `objectness`: per-voxel eigen-analysis at one scale
//! - `multiscale`: logarithmic scale sweep keeping the maximal response

pub mod objectness;
pub mod multiscale;

pub use objectness::{analyze, objectness, ObjectnessParams, ScaleResponse};
pub use multiscale::{
    multiscale_vesselness, multiscale_vesselness_with_progress, rescale_to_unit, MultiscaleParams,
    VesselnessFields,
};
