//! Speed maps for front propagation
//!
//! A front moves fast through tube-like or homogeneous regions and slowly
//! across edges. Speeds are in [0, 1]; a positive floor can be blended in
//! so the front never stalls completely.

use serde::Deserialize;

use crate::error::{ensure_positive_finite, Result, VesselError};
use crate::utils::hessian::gradient_magnitude;
use crate::volume::{ensure_same_dims, Mask, Volume};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeedParams {
    /// Sigmoid width; negative maps large inputs (edges) to low speed
    pub sigmoid_alpha: f64,
    /// Sigmoid centre
    pub sigmoid_beta: f64,
    /// Smoothing scale of the gradient magnitude for edge speed
    pub gradient_sigma: f64,
    /// Constant blended in by `regularize_speed`, in [0, 1)
    pub regularization: f64,
}

impl Default for SpeedParams {
    fn default() -> Self {
        Self {
            sigmoid_alpha: -5.0,
            sigmoid_beta: 50.0,
            gradient_sigma: 1.5,
            regularization: 0.01,
        }
    }
}

impl SpeedParams {
    pub fn validate(&self) -> Result<()> {
        if self.sigmoid_alpha == 0.0 || !self.sigmoid_alpha.is_finite() {
            return Err(VesselError::config("sigmoid_alpha must be finite and non-zero"));
        }
        if !self.sigmoid_beta.is_finite() {
            return Err(VesselError::config("sigmoid_beta must be finite"));
        }
        if self.gradient_sigma != 0.0 {
            ensure_positive_finite("gradient_sigma", self.gradient_sigma)?;
        }
        if !(0.0..1.0).contains(&self.regularization) {
            return Err(VesselError::config(format!(
                "regularization must be in [0, 1), got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Logistic map 1 / (1 + exp(-(v - beta) / alpha)) into (0, 1)
pub fn sigmoid_speed(values: &Volume<f64>, alpha: f64, beta: f64) -> Volume<f64> {
    values.map(|&v| 1.0 / (1.0 + (-(v - beta) / alpha).exp()))
}

/// Blend a constant floor into a speed map: c + (1 - c) * speed
pub fn regularize_speed(speed: &Volume<f64>, c: f64) -> Volume<f64> {
    speed.map(|&s| c + (1.0 - c) * s)
}

/// Vesselness divided by its maximum inside the mask; 0 outside the mask
/// and everywhere when the mask holds no positive vesselness.
pub fn speed_from_vesselness(vesselness: &Volume<f64>, mask: &Mask) -> Result<Volume<f64>> {
    ensure_same_dims("mask", mask.dims, "vesselness", vesselness.dims)?;

    let peak = vesselness
        .data
        .iter()
        .enumerate()
        .filter(|&(idx, v)| mask.is_foreground(idx) && v.is_finite())
        .fold(0.0f64, |m, (_, &v)| m.max(v));

    let mut speed = vesselness.like(0.0);
    if peak <= 0.0 {
        return Ok(speed);
    }
    for (idx, s) in speed.data.iter_mut().enumerate() {
        let v = vesselness[idx];
        if mask.is_foreground(idx) && v.is_finite() {
            *s = v.max(0.0) / peak;
        }
    }
    Ok(speed)
}

/// Edge-stopping speed: sigmoid of the smoothed gradient magnitude
pub fn edge_speed(intensity: &Volume<f64>, params: &SpeedParams) -> Result<Volume<f64>> {
    params.validate()?;
    let grad = gradient_magnitude(intensity, params.gradient_sigma);
    Ok(sigmoid_speed(&grad, params.sigmoid_alpha, params.sigmoid_beta))
}
