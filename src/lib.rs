//! Vessel-Core: vesselness filtering and centerline voting on 3D volumes
//!
//! Two routes turn an intensity volume into a per-voxel vote map that
//! highlights tubular centerlines.
//!
//! # Modules
//! - `volume`: voxel grids, masks, vote maps
//! - `utils`: Gaussian Hessian, symmetric eigen-decomposition, mask builders
//! - `vesselness`: Hessian objectness and the multiscale sweep
//! - `graph`: lattice graphs over masks and Dijkstra path voting
//! - `marching`: speed maps, fast marching, gradient-descent path voting
//! - `pipeline`: end-to-end drivers built from `config`
//! - `nifti_io`: NIfTI-1 loading and saving

// Core modules
pub mod error;
pub mod volume;
pub mod priority_queue;
pub mod utils;

// Algorithm modules
pub mod vesselness;
pub mod graph;
pub mod marching;

// Drivers
pub mod config;
pub mod pipeline;

// I/O modules
pub mod nifti_io;

pub use config::{load_config, parse_config, PipelineConfig};
pub use error::{Result, VesselError};
pub use nifti_io::{NiftiStore, VolumeStore};
pub use volume::{Mask, Vec3, Volume, VolumeMeta, VoteMap};
