//! Gaussian-smoothed Hessian and gradient operators
//!
//! Smoothing is separable with replicate padding; derivatives are central
//! differences (one-sided at the edges) scaled by the voxel spacing, so the
//! scale `sigma` is physical, in the same units as the voxel size.

use crate::error::Dims;
use crate::volume::{SymmetricTensor3, Volume};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// (extent, flat stride) of this axis on a grid
    #[inline]
    fn geometry(self, (nx, ny, nz): Dims) -> (usize, usize) {
        match self {
            Axis::X => (nx, 1),
            Axis::Y => (ny, nx),
            Axis::Z => (nz, nx * ny),
        }
    }

    #[inline]
    fn spacing(self, voxel_size: (f64, f64, f64)) -> f64 {
        match self {
            Axis::X => voxel_size.0,
            Axis::Y => voxel_size.1,
            Axis::Z => voxel_size.2,
        }
    }
}

/// Produces the scale-normalized Hessian of an intensity volume at one scale
pub trait HessianSource {
    fn hessian(&self, intensity: &Volume<f64>, sigma: f64) -> Volume<SymmetricTensor3>;
}

/// Gaussian smoothing followed by finite-difference second derivatives
#[derive(Clone, Copy, Debug)]
pub struct GaussianHessian {
    /// Multiply every component by sigma^2 so responses compare across scales
    pub normalize_scale: bool,
}

impl Default for GaussianHessian {
    fn default() -> Self {
        Self { normalize_scale: true }
    }
}

impl HessianSource for GaussianHessian {
    fn hessian(&self, intensity: &Volume<f64>, sigma: f64) -> Volume<SymmetricTensor3> {
        let smoothed = gaussian_smooth_3d(intensity, sigma);

        let dx = gradient_3d(&smoothed, Axis::X);
        let dy = gradient_3d(&smoothed, Axis::Y);
        let dz = gradient_3d(&smoothed, Axis::Z);

        let dxx = gradient_3d(&dx, Axis::X);
        let dxy = gradient_3d(&dx, Axis::Y);
        let dxz = gradient_3d(&dx, Axis::Z);
        let dyy = gradient_3d(&dy, Axis::Y);
        let dyz = gradient_3d(&dy, Axis::Z);
        let dzz = gradient_3d(&dz, Axis::Z);

        let norm = if self.normalize_scale && sigma > 0.0 { sigma * sigma } else { 1.0 };

        let data = (0..intensity.len())
            .map(|i| SymmetricTensor3 {
                xx: dxx[i] * norm,
                yy: dyy[i] * norm,
                zz: dzz[i] * norm,
                xy: dxy[i] * norm,
                xz: dxz[i] * norm,
                yz: dyz[i] * norm,
            })
            .collect();

        Volume { data, dims: intensity.dims, meta: intensity.meta.clone() }
    }
}

/// Normalized 1D Gaussian kernel with radius ceil(3 sigma)
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil() as usize;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian smoothing; `sigma` is physical and converted to voxels per axis
pub fn gaussian_smooth_3d(volume: &Volume<f64>, sigma: f64) -> Volume<f64> {
    let mut out = volume.clone();
    if sigma <= 0.0 {
        return out;
    }
    for axis in Axis::ALL {
        let sigma_vox = sigma / axis.spacing(volume.meta.voxel_size);
        let kernel = gaussian_kernel(sigma_vox);
        out.data = convolve_axis(&out.data, volume.dims, &kernel, axis);
    }
    out
}

/// 1D convolution along one axis with replicate padding
pub fn convolve_axis(data: &[f64], dims: Dims, kernel: &[f64], axis: Axis) -> Vec<f64> {
    let (extent, stride) = axis.geometry(dims);
    let radius = (kernel.len() / 2) as isize;
    let last = extent as isize - 1;

    (0..data.len())
        .map(|idx| {
            let c = (idx / stride) % extent;
            let base = idx - c * stride;
            kernel
                .iter()
                .enumerate()
                .map(|(ki, &w)| {
                    let nc = (c as isize + ki as isize - radius).clamp(0, last) as usize;
                    data[base + nc * stride] * w
                })
                .sum()
        })
        .collect()
}

/// First derivative along an axis: central differences inside, one-sided at
/// the edges, zero on an axis of extent 1.
pub fn gradient_3d(volume: &Volume<f64>, axis: Axis) -> Volume<f64> {
    let (extent, stride) = axis.geometry(volume.dims);
    let h = axis.spacing(volume.meta.voxel_size);
    let d = &volume.data;

    let data = (0..d.len())
        .map(|idx| {
            if extent < 2 {
                return 0.0;
            }
            let c = (idx / stride) % extent;
            if c == 0 {
                (d[idx + stride] - d[idx]) / h
            } else if c == extent - 1 {
                (d[idx] - d[idx - stride]) / h
            } else {
                (d[idx + stride] - d[idx - stride]) / (2.0 * h)
            }
        })
        .collect();

    Volume { data, dims: volume.dims, meta: volume.meta.clone() }
}

/// Norm of the Gaussian-smoothed gradient
pub fn gradient_magnitude(volume: &Volume<f64>, sigma: f64) -> Volume<f64> {
    let smoothed = gaussian_smooth_3d(volume, sigma);
    let [gx, gy, gz] = Axis::ALL.map(|axis| gradient_3d(&smoothed, axis));
    let data = (0..volume.len())
        .map(|i| (gx[i] * gx[i] + gy[i] * gy[i] + gz[i] * gz[i]).sqrt())
        .collect();
    Volume { data, dims: volume.dims, meta: volume.meta.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeMeta;
    use float_eq::assert_float_eq;

    fn from_fn(dims: Dims, meta: VolumeMeta, f: impl Fn(f64, f64, f64) -> f64) -> Volume<f64> {
        let mut v = Volume::new(dims, meta, 0.0);
        for k in 0..dims.2 {
            for j in 0..dims.1 {
                for i in 0..dims.0 {
                    v.set(i, j, k, f(i as f64, j as f64, k as f64));
                }
            }
        }
        v
    }

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        let k = gaussian_kernel(1.5);
        assert_eq!(k.len(), 2 * 5 + 1);
        assert_float_eq!(k.iter().sum::<f64>(), 1.0, abs <= 1e-12);
        for i in 0..k.len() / 2 {
            assert_float_eq!(k[i], k[k.len() - 1 - i], abs <= 1e-15);
        }
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn test_smoothing_preserves_constant() {
        let v = Volume::new((6, 5, 4), VolumeMeta::default(), 3.25);
        let s = gaussian_smooth_3d(&v, 2.0);
        for &x in s.data.iter() {
            assert_float_eq!(x, 3.25, abs <= 1e-12);
        }
    }

    #[test]
    fn test_gradient_linear_ramp_with_spacing() {
        let meta = VolumeMeta::from_voxel_size((1.0, 2.0, 0.5));
        // value = physical y coordinate * 3
        let v = from_fn((4, 5, 3), meta, |_, j, _| 3.0 * 2.0 * j);
        let gy = gradient_3d(&v, Axis::Y);
        let gx = gradient_3d(&v, Axis::X);
        for (&a, &b) in gy.data.iter().zip(gx.data.iter()) {
            assert_float_eq!(a, 3.0, abs <= 1e-12);
            assert_float_eq!(b, 0.0, abs <= 1e-12);
        }
    }

    #[test]
    fn test_gradient_singleton_axis_is_zero() {
        let v = from_fn((4, 4, 1), VolumeMeta::default(), |i, j, _| i + j);
        let gz = gradient_3d(&v, Axis::Z);
        assert!(gz.data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_hessian_of_quadratic() {
        // f = x^2 - 2 y^2 + x z; no smoothing so finite differences are exact inside
        let v = from_fn((9, 9, 9), VolumeMeta::default(), |x, y, z| x * x - 2.0 * y * y + x * z);
        let h = GaussianHessian::default().hessian(&v, 0.0);
        let t = h[[4, 4, 4]];
        assert_float_eq!(t.xx, 2.0, abs <= 1e-9);
        assert_float_eq!(t.yy, -4.0, abs <= 1e-9);
        assert_float_eq!(t.zz, 0.0, abs <= 1e-9);
        assert_float_eq!(t.xz, 1.0, abs <= 1e-9);
        assert_float_eq!(t.xy, 0.0, abs <= 1e-9);
        assert_float_eq!(t.yz, 0.0, abs <= 1e-9);
    }

    #[test]
    fn test_hessian_bright_line_is_tubular() {
        // Gaussian profile across x/y, constant along z
        let v = from_fn((15, 15, 9), VolumeMeta::default(), |x, y, _| {
            let r2 = (x - 7.0).powi(2) + (y - 7.0).powi(2);
            (-r2 / 4.0).exp()
        });
        let h = GaussianHessian::default().hessian(&v, 1.0);
        let t = h[[7, 7, 4]];
        assert!(t.xx < 0.0 && t.yy < 0.0, "expected negative cross curvature: {:?}", t);
        assert!(t.zz.abs() < 1e-9, "no curvature along the line: {}", t.zz);
    }

    #[test]
    fn test_gradient_magnitude_peaks_on_edge() {
        let v = from_fn((12, 3, 3), VolumeMeta::default(), |x, _, _| if x < 6.0 { 0.0 } else { 1.0 });
        let g = gradient_magnitude(&v, 0.0);
        assert!(g[[5, 1, 1]] > g[[1, 1, 1]]);
        assert_float_eq!(g[[1, 1, 1]], 0.0, abs <= 1e-12);
    }
}
