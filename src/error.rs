//! Error type shared by every stage of the crate
//!
//! Only configuration problems and I/O failures are errors. Degenerate
//! numerical inputs (empty masks, zero speed, zero scale steps) produce
//! trivial outputs instead.

use std::path::PathBuf;

use thiserror::Error;

pub type Dims = (usize, usize, usize);

#[derive(Debug, Error)]
pub enum VesselError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("number of neighbors must be 6, 18, or 26, got {0}")]
    InvalidConnectivity(u32),

    #[error("mismatched volume dimensions: {a_name} is {a_dims:?} but {b_name} is {b_dims:?}")]
    DimensionMismatch {
        a_name: &'static str,
        a_dims: Dims,
        b_name: &'static str,
        b_dims: Dims,
    },

    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl VesselError {
    pub fn config(msg: impl Into<String>) -> Self {
        VesselError::Config(msg.into())
    }

    /// True for every error raised before computation starts
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            VesselError::Config(_)
                | VesselError::InvalidConnectivity(_)
                | VesselError::DimensionMismatch { .. }
        )
    }
}

pub type Result<T, E = VesselError> = std::result::Result<T, E>;

/// Configuration check shared by the parameter structs
pub fn ensure_positive_finite(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(VesselError::config(format!("{} must be positive, got {}", name, value)))
    }
}
