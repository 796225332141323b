// SPDX-License-Identifier: AGPL-3.0-only

//! Two-phase training (Adam, then BFGS) with checkpoint caching.
//!
//! Both phases append to one [`LossHistory`] owned by the returned
//! [`TrainOutcome`]. A cached checkpoint skips both phases; its parameters
//! are still scored once against the objective so an outdated or foreign
//! checkpoint cannot pass acceptance unnoticed.

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::error::{Result, UdeError};
use crate::optimize::{adam, bfgs, AdamConfig, BfgsConfig, LossHistory, Objective, Observer};

/// Optimizer settings for both phases plus the acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSchedule {
    /// First phase
    pub adam: AdamConfig,
    /// Second phase
    pub bfgs: BfgsConfig,
    /// Observer cadence for both phases
    pub report_every: usize,
    /// Final loss must be strictly below this
    pub acceptance_loss: f64,
}

impl Default for TrainSchedule {
    fn default() -> Self {
        Self {
            adam: AdamConfig::default(),
            bfgs: BfgsConfig::default(),
            report_every: 10,
            acceptance_loss: crate::tolerances::TRAIN_LOSS_ACCEPTANCE,
        }
    }
}

/// Where the final parameters came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Produced by running both optimizer phases
    Trained,
    /// Read from an existing checkpoint
    Checkpoint,
}

/// Whether an existing checkpoint may short-circuit training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Load the checkpoint when present
    #[default]
    ReuseIfPresent,
    /// Always train, then overwrite the checkpoint
    Retrain,
}

/// Result of [`train`] or [`train_or_load`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    /// Final parameter vector
    pub params: Vec<f64>,
    /// Every iteration of both phases (empty on a cache hit)
    pub history: LossHistory,
    /// Loss at `params`
    pub final_loss: f64,
    /// Trained or loaded
    pub source: ParamSource,
}

impl TrainOutcome {
    /// Pass the outcome through if `final_loss < threshold`.
    ///
    /// # Errors
    ///
    /// `OptimizationDivergence` otherwise (including a non-finite loss).
    pub fn accept(self, threshold: f64) -> Result<Self> {
        if self.final_loss < threshold {
            Ok(self)
        } else {
            Err(UdeError::OptimizationDivergence {
                loss: self.final_loss,
                threshold,
            })
        }
    }
}

/// Run Adam from `theta0`, then BFGS from Adam's result.
///
/// No acceptance check; see [`TrainOutcome::accept`].
///
/// # Errors
///
/// Propagates objective errors from either phase.
pub fn train(
    objective: &dyn Objective,
    theta0: &[f64],
    schedule: &TrainSchedule,
    observer: &mut Observer<'_>,
) -> Result<TrainOutcome> {
    let mut history = LossHistory::new();
    let adam_cfg = AdamConfig {
        report_every: schedule.report_every,
        ..schedule.adam
    };
    let bfgs_cfg = BfgsConfig {
        report_every: schedule.report_every,
        ..schedule.bfgs
    };

    tracing::info!(
        n_params = theta0.len(),
        iterations = adam_cfg.iterations,
        learning_rate = adam_cfg.learning_rate,
        "adam phase start"
    );
    let warm = adam(objective, theta0, &adam_cfg, &mut history, observer)?;
    tracing::info!(loss = warm.loss, iterations = warm.n_iter, "adam phase done");

    tracing::info!(
        max_iter = bfgs_cfg.max_iter,
        initial_stepnorm = bfgs_cfg.initial_stepnorm,
        "bfgs phase start"
    );
    let refined = bfgs(objective, &warm.x, &bfgs_cfg, &mut history, observer)?;
    tracing::info!(
        loss = refined.loss,
        iterations = refined.n_iter,
        converged = refined.converged,
        n_feval = refined.n_feval,
        "bfgs phase done"
    );

    Ok(TrainOutcome {
        params: refined.x,
        history,
        final_loss: refined.loss,
        source: ParamSource::Trained,
    })
}

/// Load parameters from `checkpoint` when allowed and present, otherwise
/// train; either way the result must pass acceptance. Freshly trained
/// parameters are persisted only after they pass.
///
/// # Errors
///
/// `CheckpointIo` on an unreadable checkpoint or one whose length does not
/// match the objective; `OptimizationDivergence` if the final loss misses
/// `schedule.acceptance_loss`; objective errors from training.
pub fn train_or_load(
    checkpoint: &Checkpoint,
    policy: CachePolicy,
    objective: &dyn Objective,
    theta0: &[f64],
    schedule: &TrainSchedule,
    observer: &mut Observer<'_>,
) -> Result<TrainOutcome> {
    if policy == CachePolicy::ReuseIfPresent && checkpoint.exists() {
        let params = checkpoint.load()?;
        if params.len() != objective.dim() {
            return Err(UdeError::CheckpointIo {
                path: checkpoint.path().to_path_buf(),
                reason: format!(
                    "stored {} parameters, model expects {}",
                    params.len(),
                    objective.dim()
                ),
            });
        }
        let final_loss = objective.value(&params)?;
        tracing::info!(loss = final_loss, "using cached parameters, training skipped");
        return TrainOutcome {
            params,
            history: LossHistory::new(),
            final_loss,
            source: ParamSource::Checkpoint,
        }
        .accept(schedule.acceptance_loss);
    }

    let outcome = train(objective, theta0, schedule, observer)?.accept(schedule.acceptance_loss)?;
    checkpoint.save(&outcome.params)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use super::*;
    use crate::lotka_volterra::simulate_reference;
    use crate::network::BilinearResidual;
    use crate::numerical::Rk45Config;
    use crate::optimize::{IterationReport, Phase};
    use crate::provenance::{LOTKA_VOLTERRA_REFERENCE, REFERENCE_U0};
    use crate::sensitivity::HybridProblem;
    use crate::trajectory::{sample_times, Trajectory};

    fn data() -> Trajectory {
        let times = sample_times(0.0, 3.0, 0.1);
        simulate_reference(
            &LOTKA_VOLTERRA_REFERENCE,
            &REFERENCE_U0,
            &times,
            &Rk45Config::new(1e-10, 1e-10),
        )
        .expect("reference")
    }

    fn schedule() -> TrainSchedule {
        TrainSchedule {
            adam: AdamConfig {
                iterations: 20,
                ..AdamConfig::default()
            },
            bfgs: BfgsConfig {
                max_iter: 200,
                ..BfgsConfig::default()
            },
            ..TrainSchedule::default()
        }
    }

    fn quiet(_: &IterationReport) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[test]
    fn bilinear_training_recovers_interaction() {
        let data = data();
        let problem = HybridProblem::new(
            LOTKA_VOLTERRA_REFERENCE,
            &BilinearResidual,
            &REFERENCE_U0,
            &data,
            Rk45Config::new(1e-8, 1e-8),
        )
        .expect("problem");
        let mut reports = Vec::new();
        let mut obs = |r: &IterationReport| {
            reports.push((r.phase, r.iteration));
            ControlFlow::Continue(())
        };
        let out = train(&problem, &[0.0, 0.0], &schedule(), &mut obs)
            .expect("train")
            .accept(1e-2)
            .expect("accepted");
        assert_eq!(out.source, ParamSource::Trained);
        assert!((out.params[0] + LOTKA_VOLTERRA_REFERENCE.beta).abs() < 1e-3);
        assert!((out.params[1] - LOTKA_VOLTERRA_REFERENCE.gamma).abs() < 1e-3);
        assert_eq!(out.history.phase(Phase::Adam).count(), 20);
        assert!(out.history.phase(Phase::Bfgs).count() > 0);
        assert_eq!(reports[0], (Phase::Adam, 10));
        assert_eq!(reports[1], (Phase::Adam, 20));
    }

    #[test]
    fn accept_rejects_high_loss() {
        let outcome = TrainOutcome {
            params: vec![0.0],
            history: LossHistory::new(),
            final_loss: 0.5,
            source: ParamSource::Trained,
        };
        let err = outcome.accept(1e-2).unwrap_err();
        assert_eq!(err.kind(), "OptimizationDivergence");
    }

    #[test]
    fn accept_rejects_nan_loss() {
        let outcome = TrainOutcome {
            params: vec![0.0],
            history: LossHistory::new(),
            final_loss: f64::NAN,
            source: ParamSource::Trained,
        };
        assert!(outcome.accept(1e-2).is_err());
    }

    #[test]
    fn checkpoint_short_circuits_second_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ckpt = Checkpoint::new(dir.path(), "bilinear");
        let data = data();
        let problem = HybridProblem::new(
            LOTKA_VOLTERRA_REFERENCE,
            &BilinearResidual,
            &REFERENCE_U0,
            &data,
            Rk45Config::new(1e-8, 1e-8),
        )
        .expect("problem");

        let first = train_or_load(
            &ckpt,
            CachePolicy::ReuseIfPresent,
            &problem,
            &[0.0, 0.0],
            &schedule(),
            &mut quiet,
        )
        .expect("train");
        assert_eq!(first.source, ParamSource::Trained);
        assert!(ckpt.exists());

        let mut calls = 0;
        let mut counting = |_: &IterationReport| {
            calls += 1;
            ControlFlow::Continue(())
        };
        let second = train_or_load(
            &ckpt,
            CachePolicy::ReuseIfPresent,
            &problem,
            &[0.0, 0.0],
            &schedule(),
            &mut counting,
        )
        .expect("load");
        assert_eq!(calls, 0);
        assert_eq!(second.source, ParamSource::Checkpoint);
        assert!(second.history.is_empty());
        assert_eq!(second.params, first.params);
    }

    #[test]
    fn failed_training_is_not_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ckpt = Checkpoint::new(dir.path(), "bilinear");
        let data = data();
        let problem = HybridProblem::new(
            LOTKA_VOLTERRA_REFERENCE,
            &BilinearResidual,
            &REFERENCE_U0,
            &data,
            Rk45Config::new(1e-8, 1e-8),
        )
        .expect("problem");
        let starved = TrainSchedule {
            adam: AdamConfig {
                iterations: 1,
                ..AdamConfig::default()
            },
            bfgs: BfgsConfig {
                max_iter: 0,
                ..BfgsConfig::default()
            },
            ..TrainSchedule::default()
        };
        let err = train_or_load(
            &ckpt,
            CachePolicy::ReuseIfPresent,
            &problem,
            &[0.0, 0.0],
            &starved,
            &mut quiet,
        )
        .unwrap_err();
        assert!(matches!(err, UdeError::OptimizationDivergence { .. }));
        assert!(!ckpt.exists());
    }

    #[test]
    fn cached_parameters_are_revalidated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ckpt = Checkpoint::new(dir.path(), "bilinear");
        ckpt.save(&[0.0, 0.0]).expect("save");
        let data = data();
        let problem = HybridProblem::new(
            LOTKA_VOLTERRA_REFERENCE,
            &BilinearResidual,
            &REFERENCE_U0,
            &data,
            Rk45Config::new(1e-8, 1e-8),
        )
        .expect("problem");
        let err = train_or_load(
            &ckpt,
            CachePolicy::ReuseIfPresent,
            &problem,
            &[0.0, 0.0],
            &schedule(),
            &mut quiet,
        )
        .unwrap_err();
        assert!(matches!(err, UdeError::OptimizationDivergence { .. }));

        ckpt.save(&[0.0, 0.0, 0.0]).expect("save");
        let err = train_or_load(
            &ckpt,
            CachePolicy::ReuseIfPresent,
            &problem,
            &[0.0, 0.0],
            &schedule(),
            &mut quiet,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "CheckpointIOError");
    }

    #[test]
    fn retrain_ignores_existing_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ckpt = Checkpoint::new(dir.path(), "bilinear");
        ckpt.save(&[0.0, 0.0]).expect("save");
        let data = data();
        let problem = HybridProblem::new(
            LOTKA_VOLTERRA_REFERENCE,
            &BilinearResidual,
            &REFERENCE_U0,
            &data,
            Rk45Config::new(1e-8, 1e-8),
        )
        .expect("problem");
        let out = train_or_load(
            &ckpt,
            CachePolicy::Retrain,
            &problem,
            &[0.0, 0.0],
            &schedule(),
            &mut quiet,
        )
        .expect("train");
        assert_eq!(out.source, ParamSource::Trained);
        assert_eq!(ckpt.load().expect("load"), out.params);
    }
}
