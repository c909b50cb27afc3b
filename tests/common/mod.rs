//! Synthetic phantoms shared by the integration tests

#![allow(dead_code)]

use vessel_core::volume::{Mask, Volume, VolumeMeta};

pub type Dims = (usize, usize, usize);

/// Bright tube along z through the centre of the x-y plane, with a Gaussian
/// cross-section of width `sigma` voxels and peak `peak`.
pub fn tube_z(dims: Dims, sigma: f64, peak: f64) -> Volume<f64> {
    let (nx, ny, _) = dims;
    let cx = (nx - 1) as f64 / 2.0;
    let cy = (ny - 1) as f64 / 2.0;
    let mut v = Volume::new(dims, VolumeMeta::default(), 0.0);
    for ijk in v.iter_coords().collect::<Vec<_>>() {
        let dx = ijk[0] as f64 - cx;
        let dy = ijk[1] as f64 - cy;
        v[ijk] = peak * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
    }
    v
}

/// Single bright voxel column along z at (ci, cj)
pub fn line_z(dims: Dims, ci: usize, cj: usize, value: f64) -> Volume<f64> {
    let mut v = Volume::new(dims, VolumeMeta::default(), 0.0);
    for k in 0..dims.2 {
        v[[ci, cj, k]] = value;
    }
    v
}

/// Mask holding only the row (i, j, k) for all i
pub fn row_mask(dims: Dims, j: usize, k: usize) -> Mask {
    let mut m = Volume::new(dims, VolumeMeta::default(), 0u8);
    for i in 0..dims.0 {
        m[[i, j, k]] = 1;
    }
    m
}

pub fn full_mask(dims: Dims) -> Mask {
    Volume::new(dims, VolumeMeta::default(), 1u8)
}

/// Coordinates of the largest value in slice `k`
pub fn argmax_in_slice(v: &Volume<u32>, k: usize) -> [usize; 3] {
    let mut best = [0, 0, k];
    for j in 0..v.dims.1 {
        for i in 0..v.dims.0 {
            if v[[i, j, k]] > v[best] {
                best = [i, j, k];
            }
        }
    }
    best
}

pub fn slice_sum(v: &Volume<u32>, k: usize) -> u64 {
    let mut sum = 0u64;
    for j in 0..v.dims.1 {
        for i in 0..v.dims.0 {
            sum += v[[i, j, k]] as u64;
        }
    }
    sum
}
