//! Eigen-decomposition of symmetric 3x3 matrices
//!
//! Cyclic Jacobi rotations: each rotation zeroes one off-diagonal pair and
//! the accumulated rotations give an orthonormal eigenbasis. For 3x3 input
//! this converges in a handful of sweeps and, unlike the closed-form cubic,
//! stays accurate when eigenvalues are nearly repeated.

use crate::volume::{SymmetricTensor3, Vec3};

const MAX_SWEEPS: usize = 32;

/// Eigenvalues ordered by magnitude, |values[0]| <= |values[1]| <= |values[2]|,
/// with `vectors[n]` the unit eigenvector of `values[n]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EigenResult {
    pub values: [f64; 3],
    pub vectors: [Vec3; 3],
}

/// Unsorted eigenvalues and eigenvectors (as columns) of a symmetric matrix
pub fn jacobi_eigen(m: [[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut a = m;
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _ in 0..MAX_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        let norm: f64 = a.iter().flatten().map(|x| x * x).sum();
        if norm == 0.0 || off <= f64::EPSILON * f64::EPSILON * norm {
            break;
        }

        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq == 0.0 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // A <- A * J
            for row in a.iter_mut() {
                let (akp, akq) = (row[p], row[q]);
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            // A <- J^T * A
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            a[p][q] = 0.0;
            a[q][p] = 0.0;

            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    ([a[0][0], a[1][1], a[2][2]], v)
}

/// Order eigenpairs by eigenvalue magnitude
pub fn sort_by_abs(values: [f64; 3], columns: [[f64; 3]; 3]) -> EigenResult {
    let mut order = [0usize, 1, 2];
    order.sort_by(|&x, &y| values[x].abs().total_cmp(&values[y].abs()));

    let column = |n: usize| [columns[0][n], columns[1][n], columns[2][n]];
    EigenResult {
        values: order.map(|n| values[n]),
        vectors: order.map(column),
    }
}

/// Sorted eigen-decomposition of a Hessian tensor
pub fn eigen_symmetric(h: &SymmetricTensor3) -> EigenResult {
    let (values, columns) = jacobi_eigen(h.to_matrix());
    sort_by_abs(values, columns)
}
