// SPDX-License-Identifier: AGPL-3.0-only

//! First- and quasi-second-order optimizers over a flat parameter slice.
//!
//! Both optimizers minimize an [`Objective`], append every iteration to a
//! caller-owned [`LossHistory`], and call an observer every
//! `report_every` iterations. An observer returning
//! [`ControlFlow::Break`] ends the current phase early.

pub mod adam;
pub mod bfgs;
pub mod history;

use std::ops::ControlFlow;

use crate::error::Result;

pub use adam::{adam, AdamConfig, AdamResult};
pub use bfgs::{bfgs, BfgsConfig, BfgsResult};
pub use history::{LossHistory, LossRecord, Phase};

/// Scalar loss with an exact gradient.
pub trait Objective {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Loss at `x`.
    ///
    /// # Errors
    ///
    /// Implementation-defined (typically a diverged ODE solve).
    fn value(&self, x: &[f64]) -> Result<f64>;

    /// Loss at `x`; gradient written into `grad`.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn value_and_gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<f64>;
}

/// Snapshot handed to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Optimizer phase
    pub phase: Phase,
    /// 1-based iteration within the phase
    pub iteration: usize,
    /// Loss at the current iterate
    pub loss: f64,
    /// ‖∇L‖∞ at the current iterate
    pub grad_norm: f64,
}

/// Observer signature shared by both optimizers.
pub type Observer<'a> = dyn FnMut(&IterationReport) -> ControlFlow<()> + 'a;

/// Observer that never stops and only logs.
#[must_use]
pub fn log_progress(report: &IterationReport) -> ControlFlow<()> {
    tracing::info!(
        phase = %report.phase,
        iteration = report.iteration,
        loss = report.loss,
        grad_norm = report.grad_norm,
        "optimizer progress"
    );
    ControlFlow::Continue(())
}

pub(crate) fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

/// Record the iteration, log it, and consult the observer on the cadence.
pub(crate) fn report(
    history: &mut LossHistory,
    observer: &mut Observer<'_>,
    report_every: usize,
    report: IterationReport,
) -> ControlFlow<()> {
    history.push(report.phase, report.iteration, report.loss);
    tracing::debug!(
        phase = %report.phase,
        iteration = report.iteration,
        loss = report.loss,
        "iteration"
    );
    if report_every > 0 && report.iteration % report_every == 0 {
        observer(&report)
    } else {
        ControlFlow::Continue(())
    }
}
