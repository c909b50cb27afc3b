//! Gradient-descent path tracing on an arrival-time field
//!
//! From a start position the tracer walks against the arrival-time gradient
//! until it enters the seed mask, collecting every voxel it passes. Each
//! trace ends with a `StopReason`; none of them is an error.

use log::{info, warn};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{ensure_positive_finite, Result, VesselError};
use crate::marching::fast_marching::FACE_OFFSETS;
use crate::volume::{ensure_same_dims, Mask, Vec3, Volume, VoteMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Continuous position advanced by `step` against the normalized
    /// gradient, snapped to the nearest voxel
    Continuous,
    /// Move to the face neighbour whose direction is most opposed to the gradient
    Neighbor,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraceParams {
    /// Step length in physical units
    pub step: f64,
    /// Voxel moves allowed per trace
    pub max_iterations: usize,
    /// Steps allowed inside one voxel before the trace counts as stalled
    pub max_substeps: usize,
    pub mode: TraceMode,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self { step: 0.8, max_iterations: 10_000, max_substeps: 1_000, mode: TraceMode::Continuous }
    }
}

impl TraceParams {
    pub fn validate(&self) -> Result<()> {
        ensure_positive_finite("step", self.step)?;
        if self.max_iterations == 0 || self.max_substeps == 0 {
            return Err(VesselError::config("max_iterations and max_substeps must be positive"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopReason {
    ReachedSeed,
    /// Sampled voxel has no gradient (not reached by the front)
    ZeroGradient,
    /// Position did not leave its voxel within `max_substeps`
    Stalled,
    OutOfBounds,
    MaxIterations,
}

impl StopReason {
    /// Stops caused by the iteration guards rather than by the field
    pub fn is_non_converged(self) -> bool {
        matches!(self, StopReason::Stalled | StopReason::MaxIterations)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    /// Visited voxels, start first
    pub path: Vec<[usize; 3]>,
    pub stop: StopReason,
}

/// Number of traces per stop reason
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopCounts {
    pub reached_seed: usize,
    pub zero_gradient: usize,
    pub stalled: usize,
    pub out_of_bounds: usize,
    pub max_iterations: usize,
}

impl StopCounts {
    pub fn record(&mut self, reason: StopReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: StopReason) -> usize {
        match reason {
            StopReason::ReachedSeed => self.reached_seed,
            StopReason::ZeroGradient => self.zero_gradient,
            StopReason::Stalled => self.stalled,
            StopReason::OutOfBounds => self.out_of_bounds,
            StopReason::MaxIterations => self.max_iterations,
        }
    }

    fn slot(&mut self, reason: StopReason) -> &mut usize {
        match reason {
            StopReason::ReachedSeed => &mut self.reached_seed,
            StopReason::ZeroGradient => &mut self.zero_gradient,
            StopReason::Stalled => &mut self.stalled,
            StopReason::OutOfBounds => &mut self.out_of_bounds,
            StopReason::MaxIterations => &mut self.max_iterations,
        }
    }

    pub fn total(&self) -> usize {
        self.reached_seed + self.zero_gradient + self.stalled + self.out_of_bounds + self.max_iterations
    }

    pub fn non_converged(&self) -> usize {
        self.stalled + self.max_iterations
    }
}

pub struct TraceSummary {
    pub votes: VoteMap,
    pub counts: StopCounts,
}

#[derive(Debug)]
pub struct PathTracer<'a> {
    gradient: &'a Volume<Vec3>,
    seeds: &'a Mask,
    params: TraceParams,
}

impl<'a> PathTracer<'a> {
    pub fn new(gradient: &'a Volume<Vec3>, seeds: &'a Mask, params: TraceParams) -> Result<Self> {
        ensure_same_dims("seeds", seeds.dims, "gradient", gradient.dims)?;
        params.validate()?;
        Ok(PathTracer { gradient, seeds, params })
    }

    fn snap(&self, pos: Vec3) -> Option<[usize; 3]> {
        let ijk = pos.map(|p| p.round() as isize);
        if self.gradient.contains(ijk) {
            Some(ijk.map(|c| c as usize))
        } else {
            None
        }
    }

    /// Trace one path from `start` (voxel coordinates, may be fractional)
    pub fn trace(&self, start: Vec3) -> Trace {
        let Some(mut voxel) = self.snap(start) else {
            return Trace { path: Vec::new(), stop: StopReason::OutOfBounds };
        };
        let mut pos = start;
        let mut path = vec![voxel];
        let spacing = self.gradient.meta.spacing();

        let stop = loop {
            if self.seeds[voxel] > 0 {
                break StopReason::ReachedSeed;
            }
            if path.len() > self.params.max_iterations {
                break StopReason::MaxIterations;
            }
            let g = self.gradient[voxel];
            let norm = (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt();
            if !(norm > 0.0 && norm.is_finite()) {
                break StopReason::ZeroGradient;
            }
            let dir = g.map(|c| c / norm);

            let next = match self.params.mode {
                TraceMode::Continuous => self.descend_continuous(&mut pos, voxel, dir, spacing),
                TraceMode::Neighbor => self.descend_neighbor(&mut pos, voxel, dir),
            };
            match next {
                Ok(n) => {
                    voxel = n;
                    path.push(voxel);
                }
                Err(reason) => break reason,
            }
        };

        Trace { path, stop }
    }

    /// Sub-step against `dir` until the snapped position leaves `voxel`
    fn descend_continuous(&self, pos: &mut Vec3, voxel: [usize; 3], dir: Vec3, spacing: [f64; 3]) -> Result<[usize; 3], StopReason> {
        let delta = [0, 1, 2].map(|a| -self.params.step * dir[a] / spacing[a]);
        for _ in 0..self.params.max_substeps {
            for a in 0..3 {
                pos[a] += delta[a];
            }
            match self.snap(*pos) {
                None => return Err(StopReason::OutOfBounds),
                Some(n) if n != voxel => return Ok(n),
                Some(_) => {}
            }
        }
        Err(StopReason::Stalled)
    }

    fn descend_neighbor(&self, pos: &mut Vec3, voxel: [usize; 3], dir: Vec3) -> Result<[usize; 3], StopReason> {
        let cosine = |off: &[isize; 3]| off[0] as f64 * dir[0] + off[1] as f64 * dir[1] + off[2] as f64 * dir[2];
        let best = FACE_OFFSETS
            .iter()
            .min_by(|a, b| cosine(a).total_cmp(&cosine(b)))
            .copied()
            .unwrap_or([0, 0, 0]);

        match self.gradient.neighbor(voxel, best) {
            None => Err(StopReason::OutOfBounds),
            Some(idx) => {
                let n = self.gradient.coords(idx);
                *pos = n.map(|c| c as f64);
                Ok(n)
            }
        }
    }

    /// Trace every start and accumulate votes over all visited voxels.
    ///
    /// Traces run in parallel; votes are summed afterwards in start order.
    pub fn trace_all(&self, starts: &[Vec3]) -> TraceSummary {
        let traces: Vec<Trace> = starts.par_iter().map(|&s| self.trace(s)).collect();

        let mut votes: VoteMap = self.gradient.like(0);
        let mut counts = StopCounts::default();
        for t in traces.iter() {
            for &ijk in t.path.iter() {
                votes.vote(ijk);
            }
            counts.record(t.stop);
        }

        info!(
            "traced {} paths: {} reached seed, {} zero gradient, {} out of bounds",
            counts.total(),
            counts.reached_seed,
            counts.zero_gradient,
            counts.out_of_bounds
        );
        if counts.non_converged() > 0 {
            warn!(
                "{} of {} traces did not converge ({} stalled, {} hit max_iterations = {})",
                counts.non_converged(),
                counts.total(),
                counts.stalled,
                counts.max_iterations,
                self.params.max_iterations
            );
        }
        TraceSummary { votes, counts }
    }

    /// `trace_all` from integer voxel coordinates
    pub fn trace_all_voxels(&self, starts: &[[usize; 3]]) -> TraceSummary {
        let starts: Vec<Vec3> = starts.iter().map(|ijk| ijk.map(|c| c as f64)).collect();
        self.trace_all(&starts)
    }
}
