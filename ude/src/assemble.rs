// SPDX-License-Identifier: AGPL-3.0-only

//! Hybrid ODE with the learned residual replaced by its sparse symbolic fit.
//!
//! ```text
//! dx/dt = αx + m₀(x, y)     dy/dt = −δy + m₁(x, y)
//! ```

use crate::error::{Result, UdeError};
use crate::lotka_volterra::{check_state, LotkaVolterraParams, STATE_DIM};
use crate::numerical::{rk45_sample, Rk45Config};
use crate::sindy::{SparseModel, Term};
use crate::trajectory::Trajectory;

/// Known terms plus a two-equation sparse model over `(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicHybrid {
    known: LotkaVolterraParams,
    model: SparseModel,
}

impl SymbolicHybrid {
    /// # Errors
    ///
    /// `InvalidInput` unless the model has one equation per state variable
    /// over a basis with [`STATE_DIM`] variables.
    pub fn new(known: LotkaVolterraParams, model: SparseModel) -> Result<Self> {
        if model.n_equations() != STATE_DIM || model.basis().vars().len() != STATE_DIM {
            return Err(UdeError::InvalidInput(format!(
                "symbolic model has {} equations over {} variables, expected {STATE_DIM} and {STATE_DIM}",
                model.n_equations(),
                model.basis().vars().len()
            )));
        }
        Ok(Self { known, model })
    }

    /// Known-term parameters.
    #[must_use]
    pub const fn known(&self) -> &LotkaVolterraParams {
        &self.known
    }

    /// Symbolic residual.
    #[must_use]
    pub const fn model(&self) -> &SparseModel {
        &self.model
    }

    /// Right-hand side at `u`.
    pub fn rhs(&self, u: &[f64], du: &mut [f64]) {
        let mut m = [0.0; STATE_DIM];
        self.known.known_rhs(u, du);
        self.model.evaluate_into(u, &mut m);
        du[0] += m[0];
        du[1] += m[1];
    }

    /// Solve from `u0` on `times`.
    ///
    /// # Errors
    ///
    /// `NumericalDivergence` from the integrator (a poorly recovered model
    /// can blow up); `InvalidInput` for a state of the wrong dimension.
    pub fn simulate(&self, u0: &[f64], times: &[f64], config: &Rk45Config) -> Result<Trajectory> {
        check_state(u0)?;
        rk45_sample(|_t, u, du| self.rhs(u, du), u0, times, config)
    }
}

/// Recovered `(β̂, γ̂)`: the `x*y` coefficient of equation 0 negated, and
/// that of equation 1.
///
/// # Errors
///
/// `InvalidInput` if the model does not have two equations over two
/// variables.
pub fn recovered_interaction(model: &SparseModel) -> Result<(f64, f64)> {
    if model.n_equations() != STATE_DIM || model.basis().vars().len() != STATE_DIM {
        return Err(UdeError::InvalidInput(
            "interaction coefficients need a two-equation model over (x, y)".into(),
        ));
    }
    let xy = Term::interaction(STATE_DIM);
    Ok((-model.coefficient_of(0, &xy), model.coefficient_of(1, &xy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lotka_volterra::simulate_reference;
    use crate::provenance::{LOTKA_VOLTERRA_REFERENCE, REFERENCE_U0};
    use crate::sindy::Basis;
    use crate::tolerances;
    use crate::trajectory::sample_times;

    fn exact_model(beta: f64, gamma: f64) -> SparseModel {
        let basis = Basis::polynomial(&["x", "y"], 2);
        let k = basis.index_of(&Term::interaction(2)).expect("x*y");
        let mut coeffs = vec![vec![0.0; basis.len()]; 2];
        coeffs[0][k] = -beta;
        coeffs[1][k] = gamma;
        SparseModel::from_coefficients(basis, coeffs).expect("model")
    }

    #[test]
    fn exact_interaction_reproduces_ground_truth() {
        let p = LOTKA_VOLTERRA_REFERENCE;
        let times = sample_times(0.0, 3.0, 0.1);
        let cfg = Rk45Config::new(1e-10, 1e-10);
        let truth = simulate_reference(&p, &REFERENCE_U0, &times, &cfg).expect("truth");
        let hybrid = SymbolicHybrid::new(p, exact_model(p.beta, p.gamma)).expect("hybrid");
        let sim = hybrid.simulate(&REFERENCE_U0, &times, &cfg).expect("sim");
        let d = sim.discrepancy(&truth).expect("discrepancy");
        assert!(d.linf < tolerances::RK45_TOLERANCE, "L∞ = {}", d.linf);
    }

    #[test]
    fn recovers_signed_coefficients() {
        let (beta, gamma) = recovered_interaction(&exact_model(0.9, 0.8)).expect("coeffs");
        assert!((beta - 0.9).abs() < f64::EPSILON);
        assert!((gamma - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_interaction_term_reads_zero() {
        let basis = Basis::polynomial(&["x", "y"], 1);
        let model = SparseModel::from_coefficients(basis, vec![vec![0.0, 1.0, 0.0]; 2])
            .expect("model");
        assert_eq!(recovered_interaction(&model).expect("coeffs"), (0.0, 0.0));
    }

    #[test]
    fn rejects_wrong_equation_count() {
        let basis = Basis::polynomial(&["x", "y"], 1);
        let model = SparseModel::from_coefficients(basis, vec![vec![0.0; 3]]).expect("model");
        assert!(SymbolicHybrid::new(LOTKA_VOLTERRA_REFERENCE, model.clone()).is_err());
        assert!(recovered_interaction(&model).is_err());
    }
}
