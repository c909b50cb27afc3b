//! End-to-end drivers chaining the stages
//!
//! Both voting routes end in a `VoteMap`:
//! intensity -> vesselness -> lattice graph -> Dijkstra votes, or
//! speed -> fast marching -> gradient descent votes.

use log::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::graph::{boundary_voxels, vote_shortest_paths, Connectivity, LatticeGraph, PathVotes};
use crate::marching::{
    edge_speed, march, regularize_speed, speed_from_vesselness, upwind_gradient, Arrival, PathTracer, TraceSummary,
};
use crate::utils::hessian::GaussianHessian;
use crate::vesselness::{multiscale_vesselness, VesselnessFields};
use crate::volume::{ensure_same_dims, Mask, Vec3, Volume};

/// Multiscale vesselness with the Gaussian Hessian
pub fn vesselness_from_intensity(intensity: &Volume<f64>, mask: &Mask, config: &PipelineConfig) -> Result<VesselnessFields> {
    multiscale_vesselness(intensity, mask, &config.multiscale, &GaussianHessian::default())
}

/// Shortest paths from `source` through `graph_mask` to every boundary voxel
/// of `target_mask`, with votes.
pub fn dijkstra_votes(
    vesselness: &Volume<f64>,
    graph_mask: &Mask,
    target_mask: &Mask,
    source: [usize; 3],
    config: &PipelineConfig,
) -> Result<PathVotes> {
    ensure_same_dims("graph mask", graph_mask.dims, "vesselness", vesselness.dims)?;
    ensure_same_dims("target mask", target_mask.dims, "vesselness", vesselness.dims)?;
    let connectivity = config.graph.connectivity()?;

    let graph = LatticeGraph::build(graph_mask, connectivity);
    let targets = boundary_voxels(target_mask, connectivity);
    info!("dijkstra: {} graph nodes, {} boundary targets", graph.node_count(), targets.len());

    vote_shortest_paths(&graph, vesselness, source, &targets)
}

pub struct MarchingVotes {
    pub arrival: Arrival,
    pub gradient: Volume<Vec3>,
    pub summary: TraceSummary,
}

/// March from `seeds` over `speed`, then trace back from every face-connected
/// boundary voxel of `target_mask`.
pub fn marching_votes(
    speed: &Volume<f64>,
    seeds: &Mask,
    allowed: &Mask,
    target_mask: &Mask,
    config: &PipelineConfig,
) -> Result<MarchingVotes> {
    ensure_same_dims("target mask", target_mask.dims, "speed", speed.dims)?;
    config.tracing.validate()?;

    let arrival = march(speed, seeds, allowed, &config.marching)?;
    let gradient = upwind_gradient(&arrival);

    let starts = boundary_voxels(target_mask, Connectivity::Six);
    let summary = {
        let tracer = PathTracer::new(&gradient, seeds, config.tracing.clone())?;
        tracer.trace_all_voxels(&starts)
    };

    Ok(MarchingVotes { arrival, gradient, summary })
}

/// Vesselness, then marching votes over the vesselness-derived speed
pub fn vessel_marching_votes(
    intensity: &Volume<f64>,
    mask: &Mask,
    seeds: &Mask,
    target_mask: &Mask,
    config: &PipelineConfig,
) -> Result<(VesselnessFields, MarchingVotes)> {
    config.validate()?;
    let fields = vesselness_from_intensity(intensity, mask, config)?;
    let speed = speed_from_vesselness(&fields.vesselness, mask)?;
    let votes = marching_votes(&speed, seeds, mask, target_mask, config)?;
    Ok((fields, votes))
}

/// Marching votes over the regularized edge-stopping speed of `intensity`
pub fn edge_marching_votes(
    intensity: &Volume<f64>,
    seeds: &Mask,
    allowed: &Mask,
    target_mask: &Mask,
    config: &PipelineConfig,
) -> Result<MarchingVotes> {
    config.validate()?;
    let speed = edge_speed(intensity, &config.speed)?;
    let speed = regularize_speed(&speed, config.speed.regularization);
    marching_votes(&speed, seeds, allowed, target_mask, config)
}
