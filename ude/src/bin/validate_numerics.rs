// SPDX-License-Identifier: AGPL-3.0-only

//! Validate the numerical building blocks of the UDE pipeline.
//!
//! RK45 against closed-form solutions, the forward-sensitivity gradient
//! against central differences, BFGS on Rosenbrock, Adam on a quadratic and
//! sparse regression on a planted model.

use std::f64::consts::PI;
use std::ops::ControlFlow;

use ude_sindy::lotka_volterra::simulate_reference;
use ude_sindy::network::{BilinearResidual, ResidualModel};
use ude_sindy::numerical::{rk45_solve, Rk45Config};
use ude_sindy::optimize::{
    adam, bfgs, AdamConfig, BfgsConfig, IterationReport, LossHistory, Objective,
};
use ude_sindy::provenance::{LOTKA_VOLTERRA_REFERENCE, REFERENCE_U0};
use ude_sindy::sensitivity::HybridProblem;
use ude_sindy::sindy::{
    log_thresholds, regress, Basis, RegressionOptions, SelectionObjective, Sr3Config,
    SparseOptimizer, Term,
};
use ude_sindy::tolerances;
use ude_sindy::trajectory::sample_times;
use ude_sindy::validation::ValidationHarness;
use ude_sindy::Result;

/// (1 − x₀)² + 100 (x₁ − x₀²)²
struct Rosenbrock;

impl Objective for Rosenbrock {
    fn dim(&self) -> usize {
        2
    }

    fn value(&self, x: &[f64]) -> Result<f64> {
        Ok((1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2))
    }

    fn value_and_gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
        grad[0] = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
        grad[1] = 200.0 * (x[1] - x[0] * x[0]);
        self.value(x)
    }
}

/// Σ (xᵢ − i)²
struct Shifted(usize);

impl Objective for Shifted {
    fn dim(&self) -> usize {
        self.0
    }

    fn value(&self, x: &[f64]) -> Result<f64> {
        Ok(x.iter().enumerate().map(|(i, v)| (v - i as f64).powi(2)).sum())
    }

    fn value_and_gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
        for (i, (g, v)) in grad.iter_mut().zip(x).enumerate() {
            *g = 2.0 * (v - i as f64);
        }
        self.value(x)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("═══════════════════════════════════════════════════════════");
    println!("  UDE numerical building blocks");
    println!("═══════════════════════════════════════════════════════════\n");

    let mut harness = ValidationHarness::new("ude_numerics");
    let mut quiet = |_: &IterationReport| ControlFlow::Continue(());

    // ─── RK45: exponential decay ──────────────────────────────────
    println!("── RK45: dy/dt = −y → y(t) = e^(−t) ──");
    {
        let config = Rk45Config::new(1e-10, 1e-12);
        match rk45_solve(|_t, y, dy| dy[0] = -y[0], 0.0, 2.0, &[1.0], &config) {
            Ok(result) => {
                let expected = (-2.0_f64).exp();
                println!(
                    "  y(2) = {:.12} (expected {expected:.12}), {} steps",
                    result.y_final[0], result.n_steps
                );
                harness.check_abs("RK45 exp decay", result.y_final[0], expected, tolerances::RK45_TOLERANCE);
            }
            Err(e) => harness.record_error("RK45 exp decay", &e),
        }
    }

    // ─── RK45: harmonic oscillator ────────────────────────────────
    println!("\n── RK45: x'' + x = 0 over one period ──");
    {
        let config = Rk45Config::new(1e-10, 1e-12);
        match rk45_solve(
            |_t, y, dy| {
                dy[0] = y[1];
                dy[1] = -y[0];
            },
            0.0,
            2.0 * PI,
            &[1.0, 0.0],
            &config,
        ) {
            Ok(result) => {
                println!(
                    "  x(2π) = {:.10}, v(2π) = {:.3e} ({} steps, {} rejected)",
                    result.y_final[0], result.y_final[1], result.n_steps, result.n_rejected
                );
                harness.check_abs("RK45 harmonic x(2π)", result.y_final[0], 1.0, tolerances::RK45_TOLERANCE);
                harness.check_abs("RK45 harmonic v(2π)", result.y_final[1], 0.0, tolerances::RK45_TOLERANCE);
            }
            Err(e) => harness.record_error("RK45 harmonic", &e),
        }
    }

    // ─── RK45: Lotka-Volterra invariant ───────────────────────────
    println!("\n── RK45: Lotka-Volterra conserved quantity ──");
    {
        let p = LOTKA_VOLTERRA_REFERENCE;
        let invariant =
            |u: &[f64]| p.gamma * u[0] - p.delta * u[0].ln() + p.beta * u[1] - p.alpha * u[1].ln();
        let times = sample_times(0.0, 3.0, 0.1);
        let config = Rk45Config::new(tolerances::REFERENCE_RTOL, tolerances::REFERENCE_ATOL);
        match simulate_reference(&p, &REFERENCE_U0, &times, &config) {
            Ok(traj) => {
                let v0 = invariant(traj.state(0));
                let drift = traj
                    .states()
                    .iter()
                    .map(|u| (invariant(u) - v0).abs())
                    .fold(0.0_f64, f64::max);
                println!("  max |V(t) − V(0)| = {drift:.3e} over {} samples", traj.len());
                harness.check_upper("LV invariant drift", drift, tolerances::RK45_TOLERANCE);
            }
            Err(e) => harness.record_error("LV reference", &e),
        }
    }

    // ─── Sensitivities vs central differences ─────────────────────
    println!("\n── Forward sensitivities: bilinear residual ──");
    {
        let p = LOTKA_VOLTERRA_REFERENCE;
        let times = sample_times(0.0, 3.0, 0.1);
        let config = Rk45Config::new(1e-10, 1e-10);
        let model = BilinearResidual;
        let result = simulate_reference(&p, &REFERENCE_U0, &times, &config).and_then(|data| {
            let problem = HybridProblem::new(p, &model, &REFERENCE_U0, &data, config)?;
            let theta = [-0.7, 0.6];
            let mut grad = vec![0.0; model.n_params()];
            problem.value_and_gradient(&theta, &mut grad)?;
            let h = 1e-5;
            let mut worst = 0.0_f64;
            for k in 0..theta.len() {
                let mut plus = theta;
                let mut minus = theta;
                plus[k] += h;
                minus[k] -= h;
                let fd = (problem.value(&plus)? - problem.value(&minus)?) / (2.0 * h);
                worst = worst.max((grad[k] - fd).abs() / fd.abs().max(1.0));
            }
            Ok(worst)
        });
        match result {
            Ok(worst) => {
                println!("  max relative gradient error = {worst:.3e}");
                harness.check_upper("sensitivity gradient vs FD", worst, tolerances::SENSITIVITY_FD_RELATIVE);
            }
            Err(e) => harness.record_error("sensitivity gradient", &e),
        }
    }

    // ─── BFGS: Rosenbrock ─────────────────────────────────────────
    println!("\n── BFGS: Rosenbrock from (−1.2, 1) ──");
    {
        let config = BfgsConfig {
            max_iter: 5000,
            initial_stepnorm: 0.1,
            ..BfgsConfig::default()
        };
        let mut history = LossHistory::new();
        match bfgs(&Rosenbrock, &[-1.2, 1.0], &config, &mut history, &mut quiet) {
            Ok(r) => {
                println!(
                    "  ({:.8}, {:.8}) in {} iters, {} fevals, converged = {}",
                    r.x[0], r.x[1], r.n_iter, r.n_feval, r.converged
                );
                harness.check_abs("BFGS Rosenbrock x₀", r.x[0], 1.0, tolerances::BFGS_TOLERANCE);
                harness.check_abs("BFGS Rosenbrock x₁", r.x[1], 1.0, tolerances::BFGS_TOLERANCE);
                harness.check_bool("BFGS history recorded", history.len() == r.n_iter);
            }
            Err(e) => harness.record_error("BFGS Rosenbrock", &e),
        }
    }

    // ─── Adam: shifted quadratic ──────────────────────────────────
    println!("\n── Adam: Σ (xᵢ − i)² in 4D ──");
    {
        let config = AdamConfig {
            learning_rate: 0.05,
            iterations: 2000,
            ..AdamConfig::default()
        };
        let mut history = LossHistory::new();
        match adam(&Shifted(4), &[0.0; 4], &config, &mut history, &mut quiet) {
            Ok(r) => {
                println!("  loss = {:.3e} after {} iterations", r.loss, r.n_iter);
                harness.check_upper("Adam quadratic loss", r.loss, 1e-4);
                let first = history.records().first().map_or(f64::NAN, |rec| rec.loss);
                harness.check_bool(
                    "Adam loss decreased",
                    history.best_loss().is_some_and(|best| best < first),
                );
            }
            Err(e) => harness.record_error("Adam quadratic", &e),
        }
    }

    // ─── SINDy: planted interaction ───────────────────────────────
    println!("\n── SR3 sweep: planted −0.9·xy, 0.8·xy ──");
    {
        let inputs: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let t = f64::from(i) * 0.1;
                vec![1.5 + t.sin(), 2.0 + 0.8 * (1.3 * t).cos()]
            })
            .collect();
        let outputs: Vec<Vec<f64>> = inputs
            .iter()
            .map(|s| vec![-0.9 * s[0] * s[1], 0.8 * s[0] * s[1]])
            .collect();
        let result = regress(
            &inputs,
            &outputs,
            &Basis::polynomial(&["x", "y"], 3).with_trigonometric(),
            &log_thresholds(-7.0, 3.0, 0.1),
            &SparseOptimizer::Sr3(Sr3Config::default()),
            &SelectionObjective::default(),
            &RegressionOptions {
                normalize: true,
                denoise: false,
            },
        );
        match result {
            Ok(model) => {
                let xy = Term::interaction(2);
                println!("  dx: {}", model.equation_string(0));
                println!("  dy: {}", model.equation_string(1));
                harness.check_abs("SR3 xy coefficient (eq 0)", model.coefficient_of(0, &xy), -0.9, tolerances::SINDY_EXACT_RECOVERY);
                harness.check_abs("SR3 xy coefficient (eq 1)", model.coefficient_of(1, &xy), 0.8, tolerances::SINDY_EXACT_RECOVERY);
                harness.check_bool("SR3 single active term", model.l0(0) == 1 && model.l0(1) == 1);
            }
            Err(e) => harness.record_error("SR3 sweep", &e),
        }
    }

    harness.finish();
}
