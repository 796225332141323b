// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for the UDE → SINDy pipeline.
//!
//! Each pipeline stage fails with its own variant so the validation binary
//! can report which stage aborted the run (integration, training, checkpoint
//! I/O, regression) instead of parsing opaque strings.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UdeError>;

/// Errors arising from simulation, training, checkpointing or regression.
#[derive(Debug, Error)]
pub enum UdeError {
    /// The integrator produced a non-finite state or could not keep the
    /// local error under tolerance.
    #[error("numerical divergence at t = {t:.6}: {reason}")]
    NumericalDivergence {
        /// Time at which the integrator gave up
        t: f64,
        /// What went wrong (non-finite state, step underflow, step budget)
        reason: String,
    },

    /// Training finished but the loss never reached the acceptance threshold.
    #[error("optimization did not converge: final loss {loss:.6e} >= acceptance {threshold:.1e}")]
    OptimizationDivergence {
        /// Final loss
        loss: f64,
        /// Acceptance threshold
        threshold: f64,
    },

    /// Checkpoint present but unreadable, corrupt or missing its key.
    #[error("checkpoint {path}: {reason}")]
    CheckpointIo {
        /// Checkpoint file
        path: PathBuf,
        /// Underlying I/O or parse message
        reason: String,
    },

    /// Every candidate in the threshold sweep scored infinite.
    #[error("regression infeasible for equation {equation}: all {candidates} candidates scored infinite")]
    RegressionInfeasible {
        /// Output equation index
        equation: usize,
        /// Number of thresholds tried
        candidates: usize,
    },

    /// Dense linear algebra failure (SVD, least squares).
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(String),

    /// Shape or parameter mismatch detected before any computation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Experiment configuration could not be loaded.
    #[error("config {path}: {reason}")]
    Config {
        /// Config file
        path: PathBuf,
        /// Underlying I/O or parse message
        reason: String,
    },
}

impl UdeError {
    /// Short name of the pipeline failure class, used in the final report.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NumericalDivergence { .. } => "NumericalDivergence",
            Self::OptimizationDivergence { .. } => "OptimizationDivergence",
            Self::CheckpointIo { .. } => "CheckpointIOError",
            Self::RegressionInfeasible { .. } => "RegressionInfeasible",
            Self::LinearAlgebra(_) => "LinearAlgebra",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Config { .. } => "Config",
        }
    }
}
