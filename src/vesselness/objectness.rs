//! Hessian eigen-analysis and the tube objectness measure
//!
//! Objectness for a line-like (object dimension 1) structure. With
//! eigenvalues sorted by magnitude |l0| <= |l1| <= |l2|:
//!
//! - sign gate: a bright tube needs l1 < 0 and l2 < 0 (dark: both > 0)
//! - rA = |l1| / |l2| separates lines from plates
//! - rB = |l0| / sqrt(|l1| |l2|) separates lines from blobs
//! - S^2 = l0^2 + l1^2 + l2^2 suppresses noise-level curvature
//!
//! V = (1 - exp(-rA^2 / 2a^2)) * exp(-rB^2 / 2b^2) * (1 - exp(-S^2 / 2g^2))
//!
//! Reference:
//! Frangi, A.F., Niessen, W.J., Vincken, K.L., Viergever, M.A. (1998).
//! "Multiscale vessel enhancement filtering." MICCAI'98, LNCS vol 1496, 130-137.

use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{ensure_positive_finite, Result};
use crate::utils::eigen::eigen_symmetric;
use crate::volume::{SymmetricTensor3, Vec3, Volume};

/// Eigenvalue-derived denominators below this are treated as zero
const DENOMINATOR_EPS: f64 = 1e-10;

/// Shape weights of the objectness measure
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectnessParams {
    /// Plate-vs-line sensitivity (rA term)
    pub alpha: f64,
    /// Blob-vs-line sensitivity (rB term)
    pub beta: f64,
    /// Noise threshold on the eigenvalue norm
    pub gamma: f64,
    /// Detect bright tubes on a dark background (false: dark tubes)
    pub bright_object: bool,
    /// Multiply by ln(1 + |l2|)
    pub scale_objectness: bool,
}

impl Default for ObjectnessParams {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 1.0,
            gamma: 5.0,
            bright_object: true,
            scale_objectness: false,
        }
    }
}

impl ObjectnessParams {
    pub fn validate(&self) -> Result<()> {
        ensure_positive_finite("alpha", self.alpha)?;
        ensure_positive_finite("beta", self.beta)?;
        ensure_positive_finite("gamma", self.gamma)
    }
}

/// Objectness of one voxel from magnitude-sorted eigenvalues
pub fn objectness(sorted: [f64; 3], params: &ObjectnessParams) -> f64 {
    let [l0, l1, l2] = sorted;

    let rejected = if params.bright_object {
        l1 > 0.0 || l2 > 0.0
    } else {
        l1 < 0.0 || l2 < 0.0
    };
    if rejected {
        return 0.0;
    }

    let (a0, a1, a2) = (l0.abs(), l1.abs(), l2.abs());

    if a2 <= DENOMINATOR_EPS {
        return 0.0;
    }
    let ra = a1 / a2;
    let plate_term = 1.0 - (-ra * ra / (2.0 * params.alpha * params.alpha)).exp();

    let rb_den = (a1 * a2).sqrt();
    if rb_den <= DENOMINATOR_EPS {
        return 0.0;
    }
    let rb = a0 / rb_den;
    let blob_term = (-rb * rb / (2.0 * params.beta * params.beta)).exp();

    let s2 = l0 * l0 + l1 * l1 + l2 * l2;
    let noise_term = 1.0 - (-s2 / (2.0 * params.gamma * params.gamma)).exp();

    let mut v = plate_term * blob_term * noise_term;
    if params.scale_objectness {
        v *= a2.ln_1p();
    }
    v
}

/// Single-scale response of the eigen-analysis
pub struct ScaleResponse {
    pub vesselness: Volume<f64>,
    /// Eigenvector of the smallest-magnitude eigenvalue (tube direction)
    pub orientation: Volume<Vec3>,
}

/// Objectness and orientation of one voxel's tensor
#[inline]
pub fn analyze_tensor(h: &SymmetricTensor3, params: &ObjectnessParams) -> (f64, Vec3) {
    let eig = eigen_symmetric(h);
    (objectness(eig.values, params), eig.vectors[0])
}

/// Per-voxel eigen-analysis of a Hessian field
pub fn analyze(hessian: &Volume<SymmetricTensor3>, params: &ObjectnessParams) -> ScaleResponse {
    let (vesselness, orientation): (Vec<f64>, Vec<Vec3>) = hessian
        .data
        .par_iter()
        .map(|h| analyze_tensor(h, params))
        .unzip();

    ScaleResponse {
        vesselness: Volume { data: vesselness, dims: hessian.dims, meta: hessian.meta.clone() },
        orientation: Volume { data: orientation, dims: hessian.dims, meta: hessian.meta.clone() },
    }
}
