// SPDX-License-Identifier: AGPL-3.0-only

//! Dense BFGS with a backtracking Armijo line search.
//!
//! Nocedal & Wright, *Numerical Optimization*, 2nd ed., Algorithm 6.1 with
//! the inverse-Hessian update (6.17). The initial inverse Hessian is the
//! scaled identity `initial_stepnorm / ‖g₀‖∞ · I`, so the first trial step has
//! ∞-norm `initial_stepnorm`.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use super::{inf_norm, report, IterationReport, Objective, Observer, Phase};
use crate::error::{Result, UdeError};
use crate::optimize::LossHistory;

/// Curvature pairs with `sᵀy` at or below this are not used for the update.
const CURVATURE_FLOOR: f64 = 1e-10;

/// BFGS settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BfgsConfig {
    /// Iteration cap
    pub max_iter: usize,
    /// Converged when ‖∇L‖∞ < gtol
    pub gtol: f64,
    /// ∞-norm of the first trial step
    pub initial_stepnorm: f64,
    /// Armijo sufficient-decrease constant
    pub c1: f64,
    /// Halvings before the line search gives up
    pub max_backtracks: usize,
    /// Observer cadence (0 disables observation)
    pub report_every: usize,
}

impl Default for BfgsConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            gtol: 1e-8,
            initial_stepnorm: 0.01,
            c1: 1e-4,
            max_backtracks: 30,
            report_every: 10,
        }
    }
}

/// Outcome of a BFGS phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BfgsResult {
    /// Final parameters
    pub x: Vec<f64>,
    /// Loss at `x`
    pub loss: f64,
    /// ‖∇L(x)‖∞
    pub grad_norm: f64,
    /// Gradient criterion met
    pub converged: bool,
    /// Iterations performed
    pub n_iter: usize,
    /// Objective evaluations (value-only and value+gradient)
    pub n_feval: usize,
    /// Whether an observer stopped the phase
    pub stopped_early: bool,
}

/// Minimize `objective` from `x0`.
///
/// Trial points of the line search use value-only evaluations; a trial whose
/// solve diverges counts as a failed trial and the step is halved.
///
/// # Errors
///
/// Propagates objective errors at accepted points; `InvalidInput` on a
/// dimension mismatch.
pub fn bfgs(
    objective: &dyn Objective,
    x0: &[f64],
    config: &BfgsConfig,
    history: &mut LossHistory,
    observer: &mut Observer<'_>,
) -> Result<BfgsResult> {
    let n = objective.dim();
    if x0.len() != n {
        return Err(UdeError::InvalidInput(format!(
            "bfgs: x0 has {} entries, objective expects {n}",
            x0.len()
        )));
    }

    let mut x = x0.to_vec();
    let mut g = vec![0.0; n];
    let mut f = objective.value_and_gradient(&x, &mut g)?;
    let mut n_feval = 1;
    let mut g_norm = inf_norm(&g);

    if g_norm < config.gtol {
        return Ok(result(x, f, g_norm, true, 0, n_feval, false));
    }

    let mut h = scaled_identity(n, config.initial_stepnorm / g_norm);
    let mut p = vec![0.0; n];
    let mut x_trial = vec![0.0; n];
    let mut g_new = vec![0.0; n];
    let mut hy = vec![0.0; n];

    for k in 1..=config.max_iter {
        mat_vec(&h, &g, &mut p);
        p.iter_mut().for_each(|v| *v = -*v);
        let mut slope = dot(&g, &p);
        if slope >= 0.0 {
            tracing::warn!(iteration = k, "bfgs direction not descent, resetting H");
            h = scaled_identity(n, config.initial_stepnorm / g_norm);
            mat_vec(&h, &g, &mut p);
            p.iter_mut().for_each(|v| *v = -*v);
            slope = dot(&g, &p);
        }

        // Backtracking Armijo.
        let mut alpha = 1.0_f64;
        let mut accepted = false;
        for _ in 0..=config.max_backtracks {
            for i in 0..n {
                x_trial[i] = alpha.mul_add(p[i], x[i]);
            }
            n_feval += 1;
            let f_trial = match objective.value(&x_trial) {
                Ok(v) => v,
                Err(UdeError::NumericalDivergence { t, reason }) => {
                    tracing::debug!(t, %reason, alpha, "bfgs trial diverged");
                    f64::INFINITY
                }
                Err(e) => return Err(e),
            };
            if f_trial.is_finite() && f_trial <= (config.c1 * alpha).mul_add(slope, f) {
                accepted = true;
                break;
            }
            alpha *= 0.5;
        }
        if !accepted {
            tracing::warn!(
                iteration = k,
                loss = f,
                grad_norm = g_norm,
                "bfgs line search failed"
            );
            return Ok(result(x, f, g_norm, false, k - 1, n_feval, false));
        }

        let f_new = objective.value_and_gradient(&x_trial, &mut g_new)?;
        n_feval += 1;

        let s: Vec<f64> = x_trial.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > CURVATURE_FLOOR {
            mat_vec(&h, &y, &mut hy);
            let rho = 1.0 / sy;
            let yhy = dot(&y, &hy);
            let c = rho * rho * (sy + yhy);
            for i in 0..n {
                for j in 0..n {
                    h[i * n + j] += c * s[i] * s[j] - rho * (hy[i] * s[j] + s[i] * hy[j]);
                }
            }
        } else {
            tracing::warn!(iteration = k, sy, "bfgs skipped update: non-positive curvature");
        }

        x.copy_from_slice(&x_trial);
        g.copy_from_slice(&g_new);
        f = f_new;
        g_norm = inf_norm(&g);

        let flow = report(
            history,
            observer,
            config.report_every,
            IterationReport {
                phase: Phase::Bfgs,
                iteration: k,
                loss: f,
                grad_norm: g_norm,
            },
        );

        if g_norm < config.gtol {
            return Ok(result(x, f, g_norm, true, k, n_feval, false));
        }
        if let ControlFlow::Break(()) = flow {
            tracing::info!(iteration = k, "bfgs stopped by observer");
            return Ok(result(x, f, g_norm, false, k, n_feval, true));
        }
    }

    Ok(result(x, f, g_norm, false, config.max_iter, n_feval, false))
}

fn result(
    x: Vec<f64>,
    loss: f64,
    grad_norm: f64,
    converged: bool,
    n_iter: usize,
    n_feval: usize,
    stopped_early: bool,
) -> BfgsResult {
    BfgsResult {
        x,
        loss,
        grad_norm,
        converged,
        n_iter,
        n_feval,
        stopped_early,
    }
}

fn scaled_identity(n: usize, scale: f64) -> Vec<f64> {
    let mut h = vec![0.0; n * n];
    for i in 0..n {
        h[i * n + i] = scale;
    }
    h
}

fn mat_vec(a: &[f64], v: &[f64], out: &mut [f64]) {
    let n = v.len();
    for (i, o) in out.iter_mut().enumerate() {
        *o = dot(&a[i * n..(i + 1) * n], v);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
