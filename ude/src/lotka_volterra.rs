// SPDX-License-Identifier: AGPL-3.0-only

//! Lotka-Volterra predator-prey dynamics: ground truth and hybrid forms.
//!
//! ```text
//! ground truth:  dx/dt = αx − βxy        dy/dt = γxy − δy
//! hybrid:        dx/dt = αx + g₀(x,y;θ)  dy/dt = −δy + g₁(x,y;θ)
//! ```
//!
//! The hybrid keeps the known linear growth/decay terms and hands the
//! interaction to a learned residual `g`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};
use crate::network::ResidualModel;
use crate::numerical::{rk45_sample, Rk45Config};
use crate::trajectory::Trajectory;

/// State dimension (prey, predator).
pub const STATE_DIM: usize = 2;

/// Physical parameters `(α, β, γ, δ)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotkaVolterraParams {
    /// Prey growth rate
    pub alpha: f64,
    /// Predation rate
    pub beta: f64,
    /// Predator growth per prey consumed
    pub gamma: f64,
    /// Predator death rate
    pub delta: f64,
}

impl LotkaVolterraParams {
    /// Full right-hand side.
    pub fn rhs(&self, u: &[f64], du: &mut [f64]) {
        let xy = u[0] * u[1];
        du[0] = self.alpha.mul_add(u[0], -self.beta * xy);
        du[1] = self.gamma.mul_add(xy, -self.delta * u[1]);
    }

    /// Known part only: `[αx, −δy]`.
    pub fn known_rhs(&self, u: &[f64], du: &mut [f64]) {
        du[0] = self.alpha * u[0];
        du[1] = -self.delta * u[1];
    }

    /// The interaction the residual model is meant to learn: `[−βxy, γxy]`.
    #[must_use]
    pub fn interaction(&self, u: &[f64]) -> [f64; 2] {
        let xy = u[0] * u[1];
        [-self.beta * xy, self.gamma * xy]
    }

    /// Known-part Jacobian diagonal `(α, −δ)`.
    #[must_use]
    pub fn known_jacobian_diag(&self) -> [f64; 2] {
        [self.alpha, -self.delta]
    }
}

/// Solve the ground-truth system on `times`.
///
/// # Errors
///
/// `NumericalDivergence` from the integrator, `InvalidInput` on a state of
/// the wrong dimension.
pub fn simulate_reference(
    params: &LotkaVolterraParams,
    u0: &[f64],
    times: &[f64],
    config: &Rk45Config,
) -> Result<Trajectory> {
    check_state(u0)?;
    rk45_sample(|_t, u, du| params.rhs(u, du), u0, times, config)
}

/// Solve the hybrid system `known + g(·; θ)` on `times`.
///
/// # Errors
///
/// `InvalidInput` if `θ` does not match the model's parameter count or the
/// state has the wrong dimension; `NumericalDivergence` from the integrator.
pub fn simulate_hybrid<M: ResidualModel + ?Sized>(
    params: &LotkaVolterraParams,
    model: &M,
    theta: &[f64],
    u0: &[f64],
    times: &[f64],
    config: &Rk45Config,
) -> Result<Trajectory> {
    check_state(u0)?;
    check_model(model, theta)?;
    let mut g = [0.0; STATE_DIM];
    rk45_sample(
        |_t, u, du| {
            params.known_rhs(u, du);
            model.eval(u, theta, &mut g);
            du[0] += g[0];
            du[1] += g[1];
        },
        u0,
        times,
        config,
    )
}

pub(crate) fn check_state(u0: &[f64]) -> Result<()> {
    if u0.len() == STATE_DIM {
        Ok(())
    } else {
        Err(UdeError::InvalidInput(format!(
            "Lotka-Volterra state has dimension {STATE_DIM}, got {}",
            u0.len()
        )))
    }
}

pub(crate) fn check_model<M: ResidualModel + ?Sized>(model: &M, theta: &[f64]) -> Result<()> {
    if model.state_dim() != STATE_DIM {
        return Err(UdeError::InvalidInput(format!(
            "residual model maps dimension {}, expected {STATE_DIM}",
            model.state_dim()
        )));
    }
    if theta.len() != model.n_params() {
        return Err(UdeError::InvalidInput(format!(
            "residual model expects {} parameters, got {}",
            model.n_params(),
            theta.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Activation, Mlp, ZeroResidual};
    use crate::provenance::{LOTKA_VOLTERRA_REFERENCE, REFERENCE_U0};
    use crate::tolerances;
    use crate::trajectory::sample_times;

    fn cfg() -> Rk45Config {
        Rk45Config::new(1e-10, 1e-10)
    }

    #[test]
    fn rhs_splits_into_known_plus_interaction() {
        let p = LOTKA_VOLTERRA_REFERENCE;
        let u = [1.5, 2.5];
        let mut full = [0.0; 2];
        let mut known = [0.0; 2];
        p.rhs(&u, &mut full);
        p.known_rhs(&u, &mut known);
        let inter = p.interaction(&u);
        for i in 0..2 {
            assert!((full[i] - (known[i] + inter[i])).abs() < tolerances::EXACT_F64);
        }
    }

    #[test]
    fn populations_stay_positive() {
        let times = sample_times(0.0, 3.0, 0.1);
        let traj = simulate_reference(&LOTKA_VOLTERRA_REFERENCE, &REFERENCE_U0, &times, &cfg())
            .expect("reference solve");
        assert_eq!(traj.len(), 31);
        assert!(traj.states().iter().flatten().all(|&v| v > 0.0 && v < 1e3));
    }

    #[test]
    fn conserved_quantity_is_preserved() {
        // V = γx − δ ln x + βy − α ln y is a first integral.
        let p = LOTKA_VOLTERRA_REFERENCE;
        let v = |s: &[f64]| {
            p.gamma * s[0] - p.delta * s[0].ln() + p.beta * s[1] - p.alpha * s[1].ln()
        };
        let times = sample_times(0.0, 3.0, 0.1);
        let traj = simulate_reference(&p, &REFERENCE_U0, &times, &cfg()).expect("solve");
        let v0 = v(traj.state(0));
        for s in traj.states() {
            assert!((v(s) - v0).abs() < 1e-7);
        }
    }

    #[test]
    fn zero_residual_reproduces_interaction_free_reference() {
        let p = LotkaVolterraParams {
            beta: 0.0,
            gamma: 0.0,
            ..LOTKA_VOLTERRA_REFERENCE
        };
        let times = sample_times(0.0, 3.0, 0.1);
        let reference = simulate_reference(&p, &REFERENCE_U0, &times, &cfg()).expect("reference");
        let hybrid =
            simulate_hybrid(&p, &ZeroResidual::new(2), &[], &REFERENCE_U0, &times, &cfg())
                .expect("hybrid");
        let d = reference.discrepancy(&hybrid).expect("aligned");
        assert!(d.linf < tolerances::EXACT_F64, "linf = {}", d.linf);
    }

    #[test]
    fn hybrid_rejects_wrong_parameter_count() {
        let mlp = Mlp::new(&[2, 4, 2], Activation::Tanh).expect("valid widths");
        let times = [0.0, 0.1];
        let err = simulate_hybrid(
            &LOTKA_VOLTERRA_REFERENCE,
            &mlp,
            &[0.0; 3],
            &REFERENCE_U0,
            &times,
            &cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, UdeError::InvalidInput(_)));
    }

    #[test]
    fn reference_rejects_wrong_state_dimension() {
        let err = simulate_reference(&LOTKA_VOLTERRA_REFERENCE, &[1.0], &[0.0, 1.0], &cfg())
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }
}
