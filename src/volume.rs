//! 3D voxel grids
//!
//! Every field in the crate is a `Volume<T>`: a flat buffer in Fortran order
//! (x varies fastest, matching NIfTI) plus the physical metadata of the grid.
//! Stages never mutate a volume they did not allocate; they build a new one
//! with `like` or `map`, which copies the metadata.

use std::ops::{Index, IndexMut};

use crate::error::{Dims, Result, VesselError};

/// Vector-valued voxel (orientation, gradient)
pub type Vec3 = [f64; 3];

/// Binary mask; foreground is any value > 0
pub type Mask = Volume<u8>;

/// Per-voxel path counts
pub type VoteMap = Volume<u32>;

/// Convert 3D index to flat index: i + j*nx + k*nx*ny
#[inline(always)]
pub fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Apply a signed offset to a voxel coordinate, returning the flat index of
/// the neighbor, or `None` when it falls off the grid.
#[inline]
pub fn offset_index(dims: Dims, [i, j, k]: [usize; 3], [di, dj, dk]: [isize; 3]) -> Option<usize> {
    let (nx, ny, nz) = dims;
    let ni = i as isize + di;
    let nj = j as isize + dj;
    let nk = k as isize + dk;
    if ni < 0 || nj < 0 || nk < 0 || ni >= nx as isize || nj >= ny as isize || nk >= nz as isize {
        return None;
    }
    Some(idx3d(ni as usize, nj as usize, nk as usize, nx, ny))
}

/// Physical placement of the grid: voxel spacing and the 4x4 row-major
/// voxel-to-world affine (spacing, direction cosines and origin).
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMeta {
    pub voxel_size: (f64, f64, f64),
    pub affine: [f64; 16],
}

impl VolumeMeta {
    pub fn from_voxel_size(voxel_size: (f64, f64, f64)) -> Self {
        let (vx, vy, vz) = voxel_size;
        Self {
            voxel_size,
            affine: [
                vx, 0.0, 0.0, 0.0,
                0.0, vy, 0.0, 0.0,
                0.0, 0.0, vz, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    /// Spacing along each axis as an array
    pub fn spacing(&self) -> [f64; 3] {
        [self.voxel_size.0, self.voxel_size.1, self.voxel_size.2]
    }

    /// World-space origin (translation column of the affine)
    pub fn origin(&self) -> Vec3 {
        [self.affine[3], self.affine[7], self.affine[11]]
    }
}

impl Default for VolumeMeta {
    fn default() -> Self {
        Self::from_voxel_size((1.0, 1.0, 1.0))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Volume<T> {
    pub data: Vec<T>,
    pub dims: Dims,
    pub meta: VolumeMeta,
}

impl<T: Clone> Volume<T> {
    pub fn new(dims: Dims, meta: VolumeMeta, fill: T) -> Self {
        let (nx, ny, nz) = dims;
        Self { data: vec![fill; nx * ny * nz], dims, meta }
    }

    /// Freshly allocated volume with the same grid and metadata
    pub fn like<U: Clone>(&self, fill: U) -> Volume<U> {
        Volume::new(self.dims, self.meta.clone(), fill)
    }
}

impl<T> Volume<T> {
    pub fn from_vec(data: Vec<T>, dims: Dims, meta: VolumeMeta) -> Result<Self> {
        let (nx, ny, nz) = dims;
        if data.len() != nx * ny * nz {
            return Err(VesselError::config(format!(
                "buffer of {} voxels does not match dimensions {:?}",
                data.len(),
                dims
            )));
        }
        Ok(Self { data, dims, meta })
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Volume<U> {
        Volume {
            data: self.data.iter().map(f).collect(),
            dims: self.dims,
            meta: self.meta.clone(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn flat(&self, i: usize, j: usize, k: usize) -> usize {
        idx3d(i, j, k, self.dims.0, self.dims.1)
    }

    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let (nx, ny, _) = self.dims;
        [idx % nx, (idx / nx) % ny, idx / (nx * ny)]
    }

    /// Every voxel coordinate in flat index order
    pub fn iter_coords(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.data.len()).map(move |idx| self.coords(idx))
    }

    #[inline]
    pub fn contains(&self, [i, j, k]: [isize; 3]) -> bool {
        let (nx, ny, nz) = self.dims;
        i >= 0 && j >= 0 && k >= 0 && (i as usize) < nx && (j as usize) < ny && (k as usize) < nz
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.flat(i, j, k)]
    }

    /// Bounds-checked access with signed coordinates
    pub fn get_signed(&self, ijk: [isize; 3]) -> Option<&T> {
        if self.contains(ijk) {
            Some(&self.data[self.flat(ijk[0] as usize, ijk[1] as usize, ijk[2] as usize)])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.flat(i, j, k);
        self.data[idx] = value;
    }

    /// Flat index of the neighbor at `offset`, if it is on the grid
    #[inline]
    pub fn neighbor(&self, ijk: [usize; 3], offset: [isize; 3]) -> Option<usize> {
        offset_index(self.dims, ijk, offset)
    }
}

impl<T> Index<usize> for Volume<T> {
    type Output = T;
    #[inline]
    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T> IndexMut<usize> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

impl<T> Index<[usize; 3]> for Volume<T> {
    type Output = T;
    #[inline]
    fn index(&self, [i, j, k]: [usize; 3]) -> &T {
        &self.data[self.flat(i, j, k)]
    }
}

impl<T> IndexMut<[usize; 3]> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, [i, j, k]: [usize; 3]) -> &mut T {
        let idx = self.flat(i, j, k);
        &mut self.data[idx]
    }
}

impl Volume<u8> {
    #[inline]
    pub fn is_foreground(&self, idx: usize) -> bool {
        self.data[idx] > 0
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&m| m > 0).count()
    }

    /// Foreground voxel coordinates in scan order
    pub fn foreground_coords(&self) -> Vec<[usize; 3]> {
        self.iter_coords().filter(|&ijk| self[ijk] > 0).collect()
    }
}

impl Volume<f64> {
    /// Binarize: voxels strictly above `threshold` become foreground
    pub fn to_mask(&self, threshold: f64) -> Mask {
        self.map(|&v| u8::from(v > threshold))
    }
}

impl Volume<u32> {
    /// Add one vote at a voxel; saturates instead of wrapping
    #[inline]
    pub fn vote(&mut self, ijk: [usize; 3]) {
        let cell = &mut self[ijk];
        *cell = cell.saturating_add(1);
    }

    pub fn total_votes(&self) -> u64 {
        self.data.iter().map(|&v| v as u64).sum()
    }
}

/// Symmetric 3x3 second-derivative tensor
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SymmetricTensor3 {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
}

impl SymmetricTensor3 {
    pub fn diagonal(xx: f64, yy: f64, zz: f64) -> Self {
        Self { xx, yy, zz, ..Self::default() }
    }

    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.xx, self.xy, self.xz],
            [self.xy, self.yy, self.yz],
            [self.xz, self.yz, self.zz],
        ]
    }
}

/// Fail with a configuration error unless two co-registered volumes share dimensions
pub fn ensure_same_dims(a_name: &'static str, a_dims: Dims, b_name: &'static str, b_dims: Dims) -> Result<()> {
    if a_dims != b_dims {
        return Err(VesselError::DimensionMismatch { a_name, a_dims, b_name, b_dims });
    }
    Ok(())
}
