//! Multiscale vesselness sweep
//!
//! Runs the eigen-analysis at each scale of a logarithmic schedule and keeps,
//! per mask voxel, the maximal response together with the scale and the tube
//! direction that produced it.

use log::debug;
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{ensure_positive_finite, Result, VesselError};
use crate::utils::hessian::HessianSource;
use crate::vesselness::objectness::{analyze, ObjectnessParams};
use crate::volume::{ensure_same_dims, Mask, Vec3, Volume};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiscaleParams {
    pub sigma_min: f64,
    pub sigma_max: f64,
    /// Number of scales; 0 leaves every output at its initial value
    pub num_steps: usize,
    pub objectness: ObjectnessParams,
}

impl Default for MultiscaleParams {
    fn default() -> Self {
        Self {
            sigma_min: 1.0,
            sigma_max: 10.0,
            num_steps: 10,
            objectness: ObjectnessParams::default(),
        }
    }
}

impl MultiscaleParams {
    /// Logarithmically spaced scales from `sigma_min` to `sigma_max`
    pub fn sigma_schedule(&self) -> Vec<f64> {
        match self.num_steps {
            0 => Vec::new(),
            1 => vec![self.sigma_min],
            n => {
                let lo = self.sigma_min.ln();
                let step = (self.sigma_max.ln() - lo) / (n - 1) as f64;
                (0..n).map(|s| (lo + s as f64 * step).exp()).collect()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.objectness.validate()?;
        if self.num_steps == 0 {
            return Ok(());
        }
        ensure_positive_finite("sigma_min", self.sigma_min)?;
        if self.num_steps > 1 && !(self.sigma_max >= self.sigma_min && self.sigma_max.is_finite()) {
            return Err(VesselError::config(format!(
                "sigma_max ({}) must be at least sigma_min ({})",
                self.sigma_max, self.sigma_min
            )));
        }
        Ok(())
    }
}

/// Maximal-response fields of the sweep
#[derive(Debug)]
pub struct VesselnessFields {
    pub vesselness: Volume<f64>,
    /// Scale of the maximal response, 0 where no scale produced a positive one
    pub scale: Volume<f64>,
    pub orientation: Volume<Vec3>,
}

/// Multiscale vesselness restricted to the mask foreground
pub fn multiscale_vesselness(
    intensity: &Volume<f64>,
    mask: &Mask,
    params: &MultiscaleParams,
    source: &impl HessianSource,
) -> Result<VesselnessFields> {
    multiscale_vesselness_with_progress(intensity, mask, params, source, |_, _| {})
}

/// Multiscale vesselness with a progress callback
///
/// `progress(done, total)` is called after every scale.
pub fn multiscale_vesselness_with_progress<F>(
    intensity: &Volume<f64>,
    mask: &Mask,
    params: &MultiscaleParams,
    source: &impl HessianSource,
    mut progress: F,
) -> Result<VesselnessFields>
where
    F: FnMut(usize, usize),
{
    ensure_same_dims("mask", mask.dims, "intensity", intensity.dims)?;
    params.validate()?;

    let mut fields = VesselnessFields {
        vesselness: intensity.like(0.0),
        scale: intensity.like(0.0),
        orientation: intensity.like([0.0; 3]),
    };

    let sigmas = params.sigma_schedule();
    let total = sigmas.len();

    for (s, &sigma) in sigmas.iter().enumerate() {
        let hessian = source.hessian(intensity, sigma);
        let response = analyze(&hessian, &params.objectness);

        let updated: usize = fields
            .vesselness
            .data
            .par_iter_mut()
            .zip(fields.scale.data.par_iter_mut())
            .zip(fields.orientation.data.par_iter_mut())
            .enumerate()
            .map(|(idx, ((best, scale), dir))| {
                let v = response.vesselness[idx];
                if mask.is_foreground(idx) && v > *best {
                    *best = v;
                    *scale = sigma;
                    *dir = response.orientation[idx];
                    1
                } else {
                    0
                }
            })
            .sum();

        debug!("scale {}/{} sigma={:.3}: {} voxels improved", s + 1, total, sigma, updated);
        progress(s + 1, total);
    }

    Ok(fields)
}

/// Min-max rescale of `values` into [0, 1] over the mask foreground; 0 elsewhere.
/// A constant field maps to 0.
pub fn rescale_to_unit(values: &Volume<f64>, mask: &Mask) -> Result<Volume<f64>> {
    ensure_same_dims("mask", mask.dims, "values", values.dims)?;

    let (lo, hi) = values
        .data
        .iter()
        .enumerate()
        .filter(|&(idx, v)| mask.is_foreground(idx) && v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, &v)| (lo.min(v), hi.max(v)));

    let range = hi - lo;
    let mut out = values.like(0.0);
    if !(range > 0.0) {
        return Ok(out);
    }
    for (idx, o) in out.data.iter_mut().enumerate() {
        let v = values[idx];
        if mask.is_foreground(idx) && v.is_finite() {
            *o = (v - lo) / range;
        }
    }
    Ok(out)
}
