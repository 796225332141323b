// SPDX-License-Identifier: AGPL-3.0-only

//! Adam with a fixed learning rate and a fixed iteration count.
//!
//! Kingma & Ba, arXiv:1412.6980, Algorithm 1 with bias correction.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use super::{inf_norm, report, IterationReport, Objective, Observer, Phase};
use crate::error::{Result, UdeError};
use crate::optimize::LossHistory;

/// Adam hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Step size η
    pub learning_rate: f64,
    /// Number of iterations
    pub iterations: usize,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Denominator guard
    pub eps: f64,
    /// Observer cadence (0 disables observation)
    pub report_every: usize,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            iterations: 200,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            report_every: 10,
        }
    }
}

/// Outcome of an Adam phase.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamResult {
    /// Final parameters
    pub x: Vec<f64>,
    /// Loss at `x`
    pub loss: f64,
    /// Iterations performed
    pub n_iter: usize,
    /// Whether an observer stopped the phase
    pub stopped_early: bool,
}

/// Run Adam from `x0`.
///
/// Each iteration evaluates loss and gradient at the current iterate, records
/// that loss, then steps. The returned loss is evaluated at the final iterate.
///
/// # Errors
///
/// Propagates objective errors; `InvalidInput` on a dimension mismatch or a
/// non-positive learning rate.
pub fn adam(
    objective: &dyn Objective,
    x0: &[f64],
    config: &AdamConfig,
    history: &mut LossHistory,
    observer: &mut Observer<'_>,
) -> Result<AdamResult> {
    let n = objective.dim();
    if x0.len() != n {
        return Err(UdeError::InvalidInput(format!(
            "adam: x0 has {} entries, objective expects {n}",
            x0.len()
        )));
    }
    if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
        return Err(UdeError::InvalidInput(format!(
            "adam: learning rate must be positive, got {}",
            config.learning_rate
        )));
    }

    let mut x = x0.to_vec();
    let mut m = vec![0.0; n];
    let mut v = vec![0.0; n];
    let mut grad = vec![0.0; n];
    let mut b1t = 1.0_f64;
    let mut b2t = 1.0_f64;
    let mut n_iter = 0;
    let mut stopped_early = false;

    for k in 1..=config.iterations {
        let loss = objective.value_and_gradient(&x, &mut grad)?;
        n_iter = k;
        let flow = report(
            history,
            observer,
            config.report_every,
            IterationReport {
                phase: Phase::Adam,
                iteration: k,
                loss,
                grad_norm: inf_norm(&grad),
            },
        );

        b1t *= config.beta1;
        b2t *= config.beta2;
        let step = config.learning_rate * (1.0 - b2t).sqrt() / (1.0 - b1t);
        for i in 0..n {
            m[i] = config.beta1.mul_add(m[i], (1.0 - config.beta1) * grad[i]);
            v[i] = config
                .beta2
                .mul_add(v[i], (1.0 - config.beta2) * grad[i] * grad[i]);
            x[i] -= step * m[i] / (v[i].sqrt() + config.eps);
        }

        if flow.is_break() {
            stopped_early = true;
            tracing::info!(iteration = k, "adam stopped by observer");
            break;
        }
    }

    let loss = objective.value(&x)?;
    Ok(AdamResult {
        x,
        loss,
        n_iter,
        stopped_early,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::test_problems::Quadratic;

    fn never_stop(_: &IterationReport) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[test]
    fn converges_on_quadratic() {
        let obj = Quadratic {
            target: vec![1.0, -2.0, 0.5],
            curvature: vec![1.0, 3.0, 0.5],
        };
        let cfg = AdamConfig {
            learning_rate: 0.05,
            iterations: 2000,
            ..AdamConfig::default()
        };
        let mut history = LossHistory::new();
        let r = adam(&obj, &[0.0; 3], &cfg, &mut history, &mut never_stop).expect("adam");
        assert_eq!(r.n_iter, 2000);
        assert_eq!(history.len(), 2000);
        for (x, t) in r.x.iter().zip(&obj.target) {
            assert!((x - t).abs() < 1e-2, "x = {x}, target = {t}");
        }
        assert!(r.loss < history.records()[0].loss);
    }

    #[test]
    fn observer_break_stops_phase() {
        let obj = Quadratic {
            target: vec![1.0],
            curvature: vec![1.0],
        };
        let mut history = LossHistory::new();
        let mut calls = 0;
        let mut obs = |r: &IterationReport| {
            calls += 1;
            if r.iteration >= 30 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let r = adam(
            &obj,
            &[0.0],
            &AdamConfig::default(),
            &mut history,
            &mut obs,
        )
        .expect("adam");
        assert!(r.stopped_early);
        assert_eq!(r.n_iter, 30);
        assert_eq!(calls, 3);
        assert_eq!(history.len(), 30);
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        // Bias-corrected Adam's first step is η·sign(g).
        let obj = Quadratic {
            target: vec![1.0, -1.0],
            curvature: vec![1.0, 1.0],
        };
        let cfg = AdamConfig {
            iterations: 1,
            ..AdamConfig::default()
        };
        let mut history = LossHistory::new();
        let r = adam(&obj, &[0.0, 0.0], &cfg, &mut history, &mut never_stop).expect("adam");
        assert!((r.x[0] - 0.01).abs() < 1e-8);
        assert!((r.x[1] + 0.01).abs() < 1e-8);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let obj = Quadratic {
            target: vec![1.0],
            curvature: vec![1.0],
        };
        let mut history = LossHistory::new();
        let err = adam(
            &obj,
            &[0.0, 0.0],
            &AdamConfig::default(),
            &mut history,
            &mut never_stop,
        )
        .unwrap_err();
        assert!(matches!(err, UdeError::InvalidInput(_)));
    }
}
