// SPDX-License-Identifier: AGPL-3.0-only

//! Sparse identification of nonlinear dynamics (SINDy).
//!
//! Given state samples `X` and target outputs `Y`, find for each output a
//! sparse coefficient vector `ξ` over a term dictionary so that
//! `Y ≈ Θ(X) ξ`. Used here to turn the trained network's outputs into a
//! closed-form interaction term.
//!
//! | Module | Role |
//! |--------|------|
//! | [`basis`] | term dictionary and library matrix Θ |
//! | [`preprocess`] | SVD denoising, column normalization |
//! | [`sr3`] | sparse relaxed regularized regression (relaxed L0) |
//! | [`stlsq`] | sequentially thresholded least squares |
//! | [`objective`] | candidate scoring over a threshold sweep |
//! | [`regression`] | per-equation sweep, model selection, narrowing |

pub mod basis;
pub mod objective;
pub mod preprocess;
pub mod regression;
pub mod sr3;
pub mod stlsq;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, UdeError};
use crate::tolerances;

pub use basis::{Basis, Term};
pub use objective::SelectionObjective;
pub use regression::{
    log_thresholds, refine, regress, EquationFit, RegressionOptions, SparseModel, SparseOptimizer,
    StructuralForm,
};
pub use sr3::Sr3Config;
pub use stlsq::StlsqConfig;

/// Least-squares fit of `y` on the columns of `theta` listed in `support`;
/// the result has one entry per column of `theta`, zero off the support.
///
/// Singular values below `LSTSQ_RCOND · σ_max` are treated as zero
/// (minimum-norm solution).
pub(crate) fn least_squares_on_support(
    theta: &DMatrix<f64>,
    y: &DVector<f64>,
    support: &[usize],
) -> Result<DVector<f64>> {
    let mut xi = DVector::zeros(theta.ncols());
    if support.is_empty() {
        return Ok(xi);
    }
    let sub = theta.select_columns(support);
    let svd = sub.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let eps = tolerances::LSTSQ_RCOND * sigma_max.max(f64::MIN_POSITIVE);
    let sol = svd
        .solve(y, eps)
        .map_err(|e| UdeError::LinearAlgebra(format!("least squares: {e}")))?;
    for (k, &col) in support.iter().enumerate() {
        xi[col] = sol[k];
    }
    Ok(xi)
}

/// Indices of coefficients with magnitude above `SPARSE_ZERO`.
pub(crate) fn support_of(xi: &DVector<f64>) -> Vec<usize> {
    xi.iter()
        .enumerate()
        .filter(|(_, v)| v.abs() > tolerances::SPARSE_ZERO)
        .map(|(i, _)| i)
        .collect()
}
