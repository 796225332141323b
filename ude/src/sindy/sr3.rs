// SPDX-License-Identifier: AGPL-3.0-only

//! Sparse relaxed regularized regression with an L0 penalty.
//!
//! Zheng, Askham, Brunton, Kutz & Aravkin (2019). Minimizes
//!
//! ```text
//! ½‖y − Θξ‖² + λ‖w‖₀ + (1/2ν)‖ξ − w‖²
//! ```
//!
//! by alternating an exact ξ-update with the linear system
//! `(ΘᵀΘ + I/ν) ξ = Θᵀy + w/ν` and the proximal w-update, a hard threshold
//! at `√(2λν)`. The system matrix does not depend on λ or y, so it is
//! factored once and reused across a whole threshold sweep.
//!
//! Iteration starts from `w = 0`, so the first ξ-update is the ridge
//! solution.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};

/// SR3 settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sr3Config {
    /// Relaxation parameter ν
    pub nu: f64,
    /// Iteration cap per threshold
    pub max_iter: usize,
    /// Stop when ‖Δw‖ ≤ tol · max(‖w‖, 1)
    pub tol: f64,
}

impl Default for Sr3Config {
    fn default() -> Self {
        Self {
            nu: 1.0,
            max_iter: 10_000,
            tol: 1e-12,
        }
    }
}

/// `(ΘᵀΘ + I/ν)` factored for repeated solves against one library.
pub struct Sr3Solver<'a> {
    theta: &'a DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
    config: Sr3Config,
}

impl<'a> Sr3Solver<'a> {
    /// Factor the relaxed normal equations for `theta`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a non-positive ν; `LinearAlgebra` if the
    /// factorization fails.
    pub fn new(theta: &'a DMatrix<f64>, config: Sr3Config) -> Result<Self> {
        if !config.nu.is_finite() || config.nu <= 0.0 {
            return Err(UdeError::InvalidInput(format!(
                "SR3 relaxation ν must be positive, got {}",
                config.nu
            )));
        }
        let k = theta.ncols();
        let a = theta.transpose() * theta + DMatrix::<f64>::identity(k, k) / config.nu;
        let chol = Cholesky::new(a).ok_or_else(|| {
            UdeError::LinearAlgebra("SR3 system matrix not positive definite".into())
        })?;
        Ok(Self {
            theta,
            chol,
            config,
        })
    }

    /// Sparse coefficients for target `y` at threshold `lambda`, starting
    /// from `w = 0`. Returns the thresholded iterate `w`.
    #[must_use]
    pub fn fit(&self, y: &DVector<f64>, lambda: f64) -> DVector<f64> {
        self.fit_from(y, lambda, &DVector::zeros(self.theta.ncols()))
    }

    /// As [`Self::fit`] from a given starting point (thresholded first).
    #[must_use]
    pub fn fit_from(&self, y: &DVector<f64>, lambda: f64, start: &DVector<f64>) -> DVector<f64> {
        let kappa = (2.0 * lambda.max(0.0) * self.config.nu).sqrt();
        let inv_nu = 1.0 / self.config.nu;
        let ty = self.theta.transpose() * y;

        let mut w = hard_threshold(start, kappa);
        for _ in 0..self.config.max_iter {
            let rhs = &ty + &w * inv_nu;
            let xi = self.chol.solve(&rhs);
            let w_new = hard_threshold(&xi, kappa);
            let delta = (&w_new - &w).norm();
            let scale = w_new.norm().max(1.0);
            w = w_new;
            if delta <= self.config.tol * scale {
                break;
            }
        }
        w
    }
}

/// Zero every entry with `|v| ≤ kappa`.
#[must_use]
pub fn hard_threshold(v: &DVector<f64>, kappa: f64) -> DVector<f64> {
    v.map(|x| if x.abs() > kappa { x } else { 0.0 })
}
