//! Pipeline configuration
//!
//! Every section deserializes from JSON with defaults for missing fields,
//! so `{}` is a complete configuration. `validate` performs all
//! configuration checks up front, before any volume is touched.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, VesselError};
use crate::graph::Connectivity;
use crate::marching::{FastMarchingParams, SpeedParams, TraceParams};
use crate::vesselness::MultiscaleParams;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphParams {
    /// Neighbour count: 6, 18 or 26
    pub connectivity: u32,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self { connectivity: 6 }
    }
}

impl GraphParams {
    pub fn connectivity(&self) -> Result<Connectivity> {
        Connectivity::try_from(self.connectivity)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub multiscale: MultiscaleParams,
    pub graph: GraphParams,
    pub speed: SpeedParams,
    pub marching: FastMarchingParams,
    pub tracing: TraceParams,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.multiscale.validate()?;
        self.graph.connectivity()?;
        self.speed.validate()?;
        self.marching.validate()?;
        self.tracing.validate()
    }
}

/// Parse and validate a JSON configuration
pub fn parse_config(json: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let data = fs::read_to_string(path).map_err(|source| VesselError::Io { path: path.to_path_buf(), source })?;
    let config = parse_config(&data)?;
    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}
