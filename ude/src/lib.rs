// SPDX-License-Identifier: AGPL-3.0-only

//! Universal differential equation + sparse symbolic regression on
//! Lotka-Volterra.
//!
//! Simulates the predator-prey system, adds seeded observation noise, trains
//! a small network for the unmodeled interaction inside a hybrid ODE,
//! recovers a closed-form interaction term with a two-pass SINDy regression
//! and validates the resulting symbolic ODE against the ground truth.
//!
//! ## Modules
//!   - `numerical` — adaptive Dormand-Prince 5(4) integrator with sampled output
//!   - `lotka_volterra` — ground-truth and hybrid right-hand sides
//!   - `trajectory` — sampled solutions and discrepancy metrics
//!   - `noise` — seeded Gaussian observation noise
//!   - `network` — residual models (MLP with hand-derived Jacobians)
//!   - `sensitivity` — training loss and forward-sensitivity gradient
//!   - `optimize` — Adam, BFGS, loss history, iteration observer
//!   - `checkpoint` / `trainer` — cached two-phase training
//!   - `sindy` — term basis, SR3, STLSQ, threshold sweep, basis narrowing
//!   - `assemble` — symbolic hybrid ODE and recovered coefficients
//!   - `pipeline` — the staged end-to-end experiment
//!   - `config` / `discovery` — experiment definition, checkpoint location
//!   - `validation` — pass/fail harness with exit codes
//!   - `tolerances` / `provenance` — named thresholds and reference setup
//!
//! ## Validation binaries
//!   - `validate_ude_lotka_volterra` — full pipeline with acceptance checks
//!   - `validate_numerics` — RK45, sensitivities, Adam, BFGS, SINDy recovery

pub mod assemble;
pub mod checkpoint;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lotka_volterra;
pub mod network;
pub mod noise;
pub mod numerical;
pub mod optimize;
pub mod pipeline;
pub mod provenance;
pub mod sensitivity;
pub mod sindy;
pub mod tolerances;
pub mod trainer;
pub mod trajectory;
pub mod validation;

pub use error::{Result, UdeError};
