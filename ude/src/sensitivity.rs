// SPDX-License-Identifier: AGPL-3.0-only

//! Training loss of the hybrid Lotka-Volterra model and its exact gradient.
//!
//! The loss is the sum of squared differences between the hybrid solution
//! and the noisy observations over every sample and component:
//!
//! ```text
//! L(θ) = Σₖ ‖dₖ − x(tₖ; θ)‖²
//! ```
//!
//! The gradient comes from forward sensitivities `S = ∂x/∂θ` (n × P),
//! integrated alongside the state:
//!
//! ```text
//! Ṡ = J_x S + J_θ,   S(t₀) = 0
//! ∂L/∂θ = −2 Σₖ (dₖ − x(tₖ))ᵀ S(tₖ)
//! ```
//!
//! Error control of the augmented solve is restricted to the state, so the
//! augmented trajectory reproduces the plain solve step for step and the
//! loss from [`Objective::value_and_gradient`] equals [`Objective::value`].

use crate::error::{Result, UdeError};
use crate::lotka_volterra::{
    check_model, check_state, simulate_hybrid, LotkaVolterraParams, STATE_DIM,
};
use crate::network::{ModelJacobian, ResidualModel};
use crate::numerical::{rk45_sample, Rk45Config};
use crate::optimize::Objective;
use crate::trajectory::Trajectory;

/// Hybrid model fitted to observations.
pub struct HybridProblem<'a, M: ResidualModel + ?Sized> {
    known: LotkaVolterraParams,
    model: &'a M,
    u0: Vec<f64>,
    data: &'a Trajectory,
    config: Rk45Config,
}

impl<'a, M: ResidualModel + ?Sized> HybridProblem<'a, M> {
    /// Fit `model` to `data`, integrating from `u0` at `data`'s sample times.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `u0`, `data` or `model` do not have the
    /// Lotka-Volterra state dimension.
    pub fn new(
        known: LotkaVolterraParams,
        model: &'a M,
        u0: &[f64],
        data: &'a Trajectory,
        config: Rk45Config,
    ) -> Result<Self> {
        check_state(u0)?;
        if data.dim() != u0.len() {
            return Err(UdeError::InvalidInput(format!(
                "observations have dimension {}, state has {}",
                data.dim(),
                u0.len()
            )));
        }
        if model.state_dim() != STATE_DIM {
            return Err(UdeError::InvalidInput(format!(
                "residual model maps dimension {}, expected {STATE_DIM}",
                model.state_dim()
            )));
        }
        Ok(Self {
            known,
            model,
            u0: u0.to_vec(),
            data,
            config,
        })
    }

    /// Observations being fitted.
    #[must_use]
    pub const fn data(&self) -> &Trajectory {
        self.data
    }

    /// Hybrid solution at the observation times.
    ///
    /// # Errors
    ///
    /// `NumericalDivergence` from the integrator; `InvalidInput` on a
    /// parameter-count mismatch.
    pub fn predict(&self, theta: &[f64]) -> Result<Trajectory> {
        simulate_hybrid(
            &self.known,
            self.model,
            theta,
            &self.u0,
            self.data.times(),
            &self.config,
        )
    }

    /// Loss and the prediction it was computed from.
    ///
    /// # Errors
    ///
    /// As [`Self::predict`].
    pub fn loss(&self, theta: &[f64]) -> Result<(f64, Trajectory)> {
        let prediction = self.predict(theta)?;
        let loss = prediction.sum_squared_error(self.data)?;
        Ok((loss, prediction))
    }

    /// Solve state and sensitivities; rows are `[x (n) | S (n × P, row-major)]`.
    fn solve_augmented(&self, theta: &[f64]) -> Result<Trajectory> {
        check_model(self.model, theta)?;
        let n = self.u0.len();
        let p = self.model.n_params();
        let known_diag = self.known.known_jacobian_diag();

        let mut y0 = vec![0.0; n + n * p];
        y0[..n].copy_from_slice(&self.u0);
        let mut jac = ModelJacobian::new(n, p);
        let config = self.config.with_error_dims(n);

        rk45_sample(
            |_t, y, dy| {
                let (x, s) = y.split_at(n);
                let (dx, ds) = dy.split_at_mut(n);
                self.model.eval_jacobian(x, theta, &mut jac);
                self.known.known_rhs(x, dx);
                for i in 0..n {
                    dx[i] += jac.value[i];
                }
                // Ṡᵢ = Σⱼ (J_x)ᵢⱼ Sⱼ + (J_θ)ᵢ
                for i in 0..n {
                    let row = &mut ds[i * p..(i + 1) * p];
                    row.copy_from_slice(jac.d_params_row(i));
                    for j in 0..n {
                        let mut jx = jac.d_state[i * n + j];
                        if i == j {
                            jx += known_diag[i];
                        }
                        if jx != 0.0 {
                            let sj = &s[j * p..(j + 1) * p];
                            for (r, v) in row.iter_mut().zip(sj) {
                                *r = jx.mul_add(*v, *r);
                            }
                        }
                    }
                }
            },
            &y0,
            self.data.times(),
            &config,
        )
    }
}

impl<M: ResidualModel + ?Sized> Objective for HybridProblem<'_, M> {
    fn dim(&self) -> usize {
        self.model.n_params()
    }

    fn value(&self, x: &[f64]) -> Result<f64> {
        self.loss(x).map(|(loss, _)| loss)
    }

    fn value_and_gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
        let n = self.u0.len();
        let p = self.model.n_params();
        if grad.len() != p {
            return Err(UdeError::InvalidInput(format!(
                "gradient buffer has {} entries, model has {p} parameters",
                grad.len()
            )));
        }
        let augmented = self.solve_augmented(x)?;
        grad.fill(0.0);
        let mut loss = 0.0_f64;
        for (row, obs) in augmented.states().iter().zip(self.data.states()) {
            let (state, s) = row.split_at(n);
            for i in 0..n {
                let r = obs[i] - state[i];
                loss += r * r;
                let si = &s[i * p..(i + 1) * p];
                for (g, v) in grad.iter_mut().zip(si) {
                    *g = (-2.0 * r).mul_add(*v, *g);
                }
            }
        }
        Ok(loss)
    }
}
