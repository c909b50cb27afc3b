//! Mask generation utilities
//!
//! Geometric masks used as graph domains, seed sets and target regions.
//! Coordinates are voxel indices; the masks inherit the grid metadata of
//! the reference volume passed in.

use crate::error::Dims;
use crate::volume::{Mask, Volume, VolumeMeta};

/// Ball of physical radius `radius` around voxel `center`
///
/// Distances are measured in world units using the voxel spacing of `meta`,
/// so an anisotropic grid gives an ellipsoid in index space. `center` is
/// always included, even for a zero radius.
pub fn ball_mask(dims: Dims, meta: VolumeMeta, center: [usize; 3], radius: f64) -> Mask {
    let spacing = meta.spacing();
    let mut mask = Volume::new(dims, meta, 0u8);
    let within = |ijk: [usize; 3]| -> bool {
        let d2: f64 = (0..3)
            .map(|a| (ijk[a] as f64 - center[a] as f64) * spacing[a])
            .map(|d| d * d)
            .sum();
        d2 <= radius * radius
    };

    for ijk in mask.iter_coords().collect::<Vec<_>>() {
        if within(ijk) {
            mask[ijk] = 1;
        }
    }
    mask
}

/// Axis-aligned box, inclusive of both corners (clipped to the grid)
pub fn create_box_mask(dims: Dims, meta: VolumeMeta, lo: [usize; 3], hi: [usize; 3]) -> Mask {
    let mut mask = Volume::new(dims, meta, 0u8);
    for k in lo[2]..=hi[2].min(dims.2.saturating_sub(1)) {
        for j in lo[1]..=hi[1].min(dims.1.saturating_sub(1)) {
            for i in lo[0]..=hi[0].min(dims.0.saturating_sub(1)) {
                mask.set(i, j, k, 1);
            }
        }
    }
    mask
}

/// Mask with exactly the listed voxels set; off-grid coordinates are ignored
pub fn mask_from_coords(dims: Dims, meta: VolumeMeta, coords: &[[usize; 3]]) -> Mask {
    let mut mask = Volume::new(dims, meta, 0u8);
    for &[i, j, k] in coords {
        if i < dims.0 && j < dims.1 && k < dims.2 {
            mask.set(i, j, k, 1);
        }
    }
    mask
}
