// SPDX-License-Identifier: AGPL-3.0-only

//! Numerical integration.
//!
//! Only the embedded Runge-Kutta 5(4) pair the pipeline needs; see
//! [`rk45`].

pub mod rk45;

pub use rk45::{rk45_sample, rk45_solve, Rk45Config, Rk45Result};
