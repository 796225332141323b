// SPDX-License-Identifier: AGPL-3.0-only

//! Sequentially thresholded least squares (Brunton, Proctor & Kutz 2016).

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::least_squares_on_support;
use crate::error::Result;

/// STLSQ settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StlsqConfig {
    /// Refit rounds before giving up on a stable support
    pub max_iter: usize,
}

impl Default for StlsqConfig {
    fn default() -> Self {
        Self { max_iter: 100 }
    }
}

/// Repeatedly drop coefficients below `lambda` and refit the rest, until the
/// support stops changing.
///
/// # Errors
///
/// `LinearAlgebra` from the least-squares solves.
pub fn stlsq(
    theta: &DMatrix<f64>,
    y: &DVector<f64>,
    lambda: f64,
    config: &StlsqConfig,
) -> Result<DVector<f64>> {
    let mut support: Vec<usize> = (0..theta.ncols()).collect();
    let mut xi = least_squares_on_support(theta, y, &support)?;
    for _ in 0..config.max_iter {
        let next: Vec<usize> = support
            .iter()
            .copied()
            .filter(|&k| xi[k].abs() >= lambda)
            .collect();
        if next == support {
            break;
        }
        support = next;
        xi = least_squares_on_support(theta, y, &support)?;
    }
    Ok(xi)
}
