//! Numerical building blocks
//!
//! - `hessian`: Gaussian smoothing, finite differences, scale-space Hessian
//! - `eigen`: eigen-decomposition of symmetric 3x3 matrices
//! - `mask`: synthetic mask construction

pub mod eigen;
pub mod hessian;
pub mod mask;

pub use eigen::{eigen_symmetric, EigenResult};
pub use hessian::{gaussian_smooth_3d, gradient_3d, Axis, GaussianHessian, HessianSource};
pub use mask::{ball_mask, create_box_mask, mask_from_coords};
