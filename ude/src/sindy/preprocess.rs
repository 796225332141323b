// SPDX-License-Identifier: AGPL-3.0-only

//! Library-matrix preprocessing: optimal singular-value hard thresholding
//! and column normalization.
//!
//! Denoising follows Gavish & Donoho (2014) for unknown noise level:
//! singular values below `ω(β)·median(σ)` are zeroed, with `β` the aspect
//! ratio of the matrix and the cubic approximation
//! `ω(β) ≈ 0.56β³ − 0.95β² + 1.82β + 1.43`.

use nalgebra::DMatrix;

use crate::error::{Result, UdeError};
use crate::tolerances;

/// `ω(β)` for the unknown-noise optimal hard threshold.
#[must_use]
pub fn optimal_svht_coefficient(beta: f64) -> f64 {
    let b = beta.clamp(0.0, 1.0);
    0.56f64.mul_add(b.powi(3), (-0.95f64).mul_add(b * b, 1.82f64.mul_add(b, 1.43)))
}

/// Low-rank reconstruction of `theta` keeping singular values above the
/// optimal hard threshold.
///
/// # Errors
///
/// `LinearAlgebra` if the SVD cannot be recomposed.
pub fn denoise(theta: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (m, n) = theta.shape();
    let beta = m.min(n) as f64 / m.max(n) as f64;
    let mut svd = theta.clone().svd(true, true);

    let mut sorted: Vec<f64> = svd.singular_values.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let median = median_of_sorted(&sorted);
    let tau = optimal_svht_coefficient(beta) * median;

    let mut kept = 0;
    for s in svd.singular_values.iter_mut() {
        if *s > tau {
            kept += 1;
        } else {
            *s = 0.0;
        }
    }
    tracing::debug!(tau, kept, total = sorted.len(), "singular value hard threshold");
    svd.recompose()
        .map_err(|e| UdeError::LinearAlgebra(format!("SVD recompose: {e}")))
}

/// Scale every column to unit L2 norm; returns the scaled matrix and the
/// original norms (zero columns keep norm 1).
#[must_use]
pub fn normalize_columns(theta: &DMatrix<f64>) -> (DMatrix<f64>, Vec<f64>) {
    let mut scaled = theta.clone();
    let mut norms = Vec::with_capacity(theta.ncols());
    for mut col in scaled.column_iter_mut() {
        let norm = col.norm();
        let norm = if norm > tolerances::NEAR_ZERO_EXPECTED {
            norm
        } else {
            1.0
        };
        col /= norm;
        norms.push(norm);
    }
    (scaled, norms)
}

fn median_of_sorted(v: &[f64]) -> f64 {
    match v.len() {
        0 => 0.0,
        n if n % 2 == 1 => v[n / 2],
        n => 0.5 * (v[n / 2 - 1] + v[n / 2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svht_coefficient_square_matrix() {
        // ω(1) = 0.56 − 0.95 + 1.82 + 1.43 = 2.86
        assert!((optimal_svht_coefficient(1.0) - 2.86).abs() < 1e-12);
        assert!((optimal_svht_coefficient(0.0) - 1.43).abs() < 1e-12);
    }

    #[test]
    fn normalize_gives_unit_columns() {
        let theta = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 10.0, 2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let (scaled, norms) = normalize_columns(&theta);
        assert!((norms[0] - 3.0).abs() < 1e-12);
        assert!((norms[1] - 1.0).abs() < 1e-12);
        assert!((norms[2] - 10.0).abs() < 1e-12);
        assert!((scaled.column(0).norm() - 1.0).abs() < 1e-12);
        assert!(scaled.column(1).norm().abs() < 1e-12);
    }

    #[test]
    fn denoise_keeps_dominant_rank() {
        // Rank-1 signal plus a tiny perturbation.
        let u = [1.0_f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let v = [1.0_f64, -1.0, 0.5, 2.0];
        let mut theta = DMatrix::from_fn(6, 4, |r, c| u[r] * v[c]);
        theta[(2, 1)] += 1e-6;
        theta[(4, 3)] -= 1e-6;
        let clean = denoise(&theta).expect("denoise");
        let rank1 = DMatrix::from_fn(6, 4, |r, c| u[r] * v[c]);
        assert!((&clean - &rank1).norm() < 1e-5);
    }

    #[test]
    fn denoise_removes_flat_spectrum() {
        // All singular values equal the median, so all fall below ω·median.
        let theta = DMatrix::<f64>::identity(4, 4);
        let clean = denoise(&theta).expect("denoise");
        assert!(clean.norm() < 1e-12);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert!((median_of_sorted(&[1.0, 2.0, 3.0]) - 2.0).abs() < f64::EPSILON);
        assert!((median_of_sorted(&[1.0, 2.0, 3.0, 5.0]) - 2.5).abs() < f64::EPSILON);
        assert!(median_of_sorted(&[]).abs() < f64::EPSILON);
    }
}
