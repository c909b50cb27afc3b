//! Fast marching on the voxel grid
//!
//! Grows an arrival-time field from seed voxels over a speed map by solving
//! the eikonal equation |grad T| * F = 1 with first-order upwind differences.
//! Voxels move Far -> Trial -> Alive; Forbidden voxels never change.
//! Unreached voxels keep `UNREACHED`, which is finite and well below
//! `f64::MAX` so downstream arithmetic on it stays meaningful.

use log::debug;
use serde::Deserialize;

use crate::error::{Result, VesselError};
use crate::marching::speed::regularize_speed;
use crate::priority_queue::MinQueue;
use crate::volume::{ensure_same_dims, Mask, Vec3, Volume};

/// Arrival time of voxels the front never reached
pub const UNREACHED: f64 = f64::MAX / 2.0;

pub(crate) const FACE_OFFSETS: [[isize; 3]; 6] = [
    [-1, 0, 0], [1, 0, 0],
    [0, -1, 0], [0, 1, 0],
    [0, 0, -1], [0, 0, 1],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoxelState {
    Far,
    Trial,
    Alive,
    Forbidden,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FastMarchingParams {
    /// Propagation halts once the smallest Trial time exceeds this
    pub stopping_time: f64,
    /// Constant speed floor c, applied as c + (1 - c) * speed; 0 disables it
    pub speed_offset: f64,
    /// Seeds start Alive (neighbours primed as Trial) instead of Trial at time 0
    pub seeds_alive: bool,
}

impl Default for FastMarchingParams {
    fn default() -> Self {
        Self { stopping_time: 100.0, speed_offset: 0.0, seeds_alive: false }
    }
}

impl FastMarchingParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.stopping_time > 0.0) {
            return Err(VesselError::config(format!(
                "stopping_time must be positive, got {}",
                self.stopping_time
            )));
        }
        if !(0.0..1.0).contains(&self.speed_offset) {
            return Err(VesselError::config(format!(
                "speed_offset must be in [0, 1), got {}",
                self.speed_offset
            )));
        }
        Ok(())
    }
}

/// Final state of a march
#[derive(Clone, Debug)]
pub struct Arrival {
    pub time: Volume<f64>,
    pub state: Volume<VoxelState>,
    /// Flat indices in the order they became Alive
    pub order: Vec<usize>,
}

impl Arrival {
    #[inline]
    pub fn is_alive(&self, idx: usize) -> bool {
        self.state[idx] == VoxelState::Alive
    }

    /// Voxels still Trial when propagation stopped, with tentative times
    pub fn front(&self) -> Vec<[usize; 3]> {
        self.state
            .iter_coords()
            .filter(|&ijk| self.state[ijk] == VoxelState::Trial)
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.order.len()
    }
}

/// March from `seeds` inside `allowed`.
///
/// Voxels outside `allowed`, or whose (offset) speed is not positive, are
/// Forbidden; that takes precedence over being a seed.
pub fn march(speed: &Volume<f64>, seeds: &Mask, allowed: &Mask, params: &FastMarchingParams) -> Result<Arrival> {
    ensure_same_dims("seeds", seeds.dims, "speed", speed.dims)?;
    ensure_same_dims("allowed", allowed.dims, "speed", speed.dims)?;
    params.validate()?;

    let speed = if params.speed_offset > 0.0 {
        regularize_speed(speed, params.speed_offset)
    } else {
        speed.clone()
    };

    let seed_state = if params.seeds_alive { VoxelState::Alive } else { VoxelState::Trial };
    let mut initial = speed.like(VoxelState::Far);
    for (idx, state) in initial.data.iter_mut().enumerate() {
        let f = speed[idx];
        *state = if !allowed.is_foreground(idx) || !(f > 0.0 && f.is_finite()) {
            VoxelState::Forbidden
        } else if seeds.is_foreground(idx) {
            seed_state
        } else {
            VoxelState::Far
        };
    }

    march_from(&speed, initial, params.stopping_time)
}

/// March from an explicit initial classification. Trial and Alive voxels
/// start at time 0.
pub fn march_from(speed: &Volume<f64>, initial: Volume<VoxelState>, stopping_time: f64) -> Result<Arrival> {
    ensure_same_dims("initial state", initial.dims, "speed", speed.dims)?;

    let mut m = Marcher {
        speed,
        spacing: speed.meta.spacing(),
        time: speed.like(UNREACHED),
        state: initial,
        queue: MinQueue::new(),
        order: Vec::new(),
    };

    for idx in 0..m.state.len() {
        let f = speed[idx];
        if m.state[idx] != VoxelState::Alive && !(f > 0.0 && f.is_finite()) {
            m.state[idx] = VoxelState::Forbidden;
        }
        match m.state[idx] {
            VoxelState::Trial => {
                m.time[idx] = 0.0;
                m.queue.push(0.0, idx);
            }
            VoxelState::Alive => {
                m.time[idx] = 0.0;
                m.order.push(idx);
            }
            _ => {}
        }
    }
    for n in 0..m.order.len() {
        let idx = m.order[n];
        m.update_neighbors(idx);
    }

    let mut last = 0.0f64;
    while let Some((t, idx)) = m.queue.pop() {
        if m.state[idx] != VoxelState::Trial || t > m.time[idx] {
            continue;
        }
        if t > stopping_time {
            break;
        }
        let t = t.max(last);
        last = t;
        m.time[idx] = t;
        m.state[idx] = VoxelState::Alive;
        m.order.push(idx);
        m.update_neighbors(idx);
    }

    debug!(
        "fast marching: {} alive, last arrival {:.3}, {} queued at stop",
        m.order.len(),
        last,
        m.queue.len()
    );
    Ok(Arrival { time: m.time, state: m.state, order: m.order })
}

struct Marcher<'a> {
    speed: &'a Volume<f64>,
    spacing: [f64; 3],
    time: Volume<f64>,
    state: Volume<VoxelState>,
    queue: MinQueue<usize>,
    order: Vec<usize>,
}

impl Marcher<'_> {
    fn update_neighbors(&mut self, idx: usize) {
        let ijk = self.time.coords(idx);
        for off in FACE_OFFSETS {
            let Some(n) = self.time.neighbor(ijk, off) else { continue };
            match self.state[n] {
                VoxelState::Alive | VoxelState::Forbidden => continue,
                VoxelState::Far | VoxelState::Trial => {}
            }
            let t = self.solve_eikonal(n);
            if t < self.time[n] {
                self.time[n] = t;
                self.state[n] = VoxelState::Trial;
                self.queue.push(t, n);
            }
        }
    }

    /// First-order upwind solution at `idx` from its Alive neighbours.
    ///
    /// Axes are added in order of increasing neighbour time while the
    /// solution stays above the next neighbour time.
    fn solve_eikonal(&self, idx: usize) -> f64 {
        let ijk = self.time.coords(idx);
        let mut terms = [(0.0f64, 0.0f64); 3];
        let mut n_terms = 0;
        for axis in 0..3 {
            let mut best = UNREACHED;
            for dir in [-1isize, 1] {
                let mut off = [0isize; 3];
                off[axis] = dir;
                if let Some(n) = self.time.neighbor(ijk, off) {
                    if self.state[n] == VoxelState::Alive {
                        best = best.min(self.time[n]);
                    }
                }
            }
            if best < UNREACHED {
                terms[n_terms] = (best, self.spacing[axis]);
                n_terms += 1;
            }
        }
        let terms = &mut terms[..n_terms];
        terms.sort_by(|a, b| a.0.total_cmp(&b.0));

        let f = self.speed[idx];
        let (mut a, mut b, mut c) = (0.0, 0.0, -1.0 / (f * f));
        let mut solution = UNREACHED;
        for &(tn, h) in terms.iter() {
            if solution <= tn {
                break;
            }
            let w = 1.0 / (h * h);
            a += w;
            b -= 2.0 * tn * w;
            c += tn * tn * w;
            let disc = b * b - 4.0 * a * c;
            if disc < 0.0 {
                break;
            }
            solution = (-b + disc.sqrt()) / (2.0 * a);
        }
        solution
    }
}

/// Upwind gradient of the arrival time at Alive voxels.
///
/// Along each axis the smaller-valued Alive neighbour gives a one-sided
/// difference; the component is 0 when no Alive neighbour is earlier.
/// Non-Alive voxels get a zero vector.
pub fn upwind_gradient(arrival: &Arrival) -> Volume<Vec3> {
    let time = &arrival.time;
    let spacing = time.meta.spacing();
    let mut grad = time.like([0.0; 3]);

    for &idx in arrival.order.iter() {
        let ijk = time.coords(idx);
        let tc = time[idx];
        let mut g = [0.0; 3];
        for axis in 0..3 {
            let mut best: Option<(f64, f64)> = None;
            for dir in [-1isize, 1] {
                let mut off = [0isize; 3];
                off[axis] = dir;
                let Some(n) = time.neighbor(ijk, off) else { continue };
                if !arrival.is_alive(n) {
                    continue;
                }
                let tn = time[n];
                if tn < tc && best.map_or(true, |(bt, _)| tn < bt) {
                    best = Some((tn, dir as f64));
                }
            }
            if let Some((tn, sign)) = best {
                g[axis] = (tn - tc) / spacing[axis] * sign;
            }
        }
        grad[idx] = g;
    }
    grad
}
