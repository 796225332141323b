// SPDX-License-Identifier: AGPL-3.0-only

//! Dormand-Prince 5(4) embedded Runge-Kutta integrator.
//!
//! Adaptive step, first-same-as-last (FSAL), mixed absolute/relative error
//! control. [`rk45_sample`] clamps steps so the solution lands exactly on
//! every requested output time; two ODEs sampled on the same grid are
//! therefore directly comparable without interpolation.
//!
//! Reference: Hairer, Nørsett & Wanner, *Solving ODEs I*, §II.5 (DOPRI5
//! tableau) and §II.4 (starting step heuristic).

use crate::error::{Result, UdeError};
use crate::trajectory::Trajectory;

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (row 7 of the tableau, FSAL)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// b − b̂ (5th minus embedded 4th order)
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Integrator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk45Config {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// Smallest step before declaring divergence
    pub h_min: f64,
    /// Largest step
    pub h_max: f64,
    /// Accepted + rejected step budget
    pub max_steps: usize,
    /// Error control over the first `n` components only (`None` = all).
    pub error_dims: Option<usize>,
}

impl Rk45Config {
    /// Tolerances with default step bounds (no `h_max`, `h_min` = 1e-14).
    #[must_use]
    pub const fn new(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            h_min: 1e-14,
            h_max: f64::INFINITY,
            max_steps: 1_000_000,
            error_dims: None,
        }
    }

    /// Set step bounds.
    #[must_use]
    pub const fn with_step_bounds(mut self, h_min: f64, h_max: f64) -> Self {
        self.h_min = h_min;
        self.h_max = h_max;
        self
    }

    /// Set the step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Restrict error control to the leading `n` components.
    ///
    /// Used by sensitivity-augmented systems: the step sequence then depends
    /// only on the physical state, so the state part of the augmented
    /// solution is identical to the plain solve.
    #[must_use]
    pub const fn with_error_dims(mut self, n: usize) -> Self {
        self.error_dims = Some(n);
        self
    }
}

/// Result of an endpoint integration.
#[derive(Debug, Clone)]
pub struct Rk45Result {
    /// Final time (equals the requested `t1`)
    pub t_final: f64,
    /// State at `t_final`
    pub y_final: Vec<f64>,
    /// Accepted steps
    pub n_steps: usize,
    /// Rejected steps
    pub n_rejected: usize,
    /// Right-hand-side evaluations
    pub n_feval: usize,
}

/// Integrate `dy/dt = f(t, y)` from `t0` to `t1`.
///
/// `f(t, y, dydt)` writes the derivative into `dydt`.
///
/// # Errors
///
/// `NumericalDivergence` on non-finite state, step underflow below
/// `h_min`, or exhausting `max_steps`. `InvalidInput` for an empty state
/// or `t1 < t0`.
pub fn rk45_solve<F>(f: F, t0: f64, t1: f64, y0: &[f64], config: &Rk45Config) -> Result<Rk45Result>
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    if t1 < t0 {
        return Err(UdeError::InvalidInput(format!(
            "backward integration not supported ({t0} → {t1})"
        )));
    }
    let mut stepper = Stepper::new(f, t0, y0, t1 - t0, config)?;
    stepper.advance_to(t1)?;
    Ok(Rk45Result {
        t_final: stepper.t,
        y_final: stepper.y,
        n_steps: stepper.n_steps,
        n_rejected: stepper.n_rejected,
        n_feval: stepper.n_feval,
    })
}

/// Integrate and record the state at each of `times` (ascending, first
/// entry is the initial time).
///
/// # Errors
///
/// As [`rk45_solve`]; also `InvalidInput` if `times` is empty or not
/// non-decreasing.
pub fn rk45_sample<F>(f: F, y0: &[f64], times: &[f64], config: &Rk45Config) -> Result<Trajectory>
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    let (&t0, rest) = times
        .split_first()
        .ok_or_else(|| UdeError::InvalidInput("no output times".into()))?;
    if times.windows(2).any(|w| w[1] < w[0]) {
        return Err(UdeError::InvalidInput(
            "output times must be non-decreasing".into(),
        ));
    }
    let span = times[times.len() - 1] - t0;
    let mut stepper = Stepper::new(f, t0, y0, span, config)?;
    let mut states = Vec::with_capacity(times.len());
    states.push(y0.to_vec());
    for &t in rest {
        stepper.advance_to(t)?;
        states.push(stepper.y.clone());
    }
    Trajectory::new(times.to_vec(), states)
}

fn scale(cfg: &Rk45Config, a: f64, b: f64) -> f64 {
    cfg.rtol.mul_add(a.abs().max(b.abs()), cfg.atol)
}

struct Stepper<'c, F> {
    f: F,
    config: &'c Rk45Config,
    t: f64,
    y: Vec<f64>,
    h: f64,
    k: [Vec<f64>; 7],
    y_new: Vec<f64>,
    y_stage: Vec<f64>,
    n_err: usize,
    n_steps: usize,
    n_rejected: usize,
    n_feval: usize,
}

impl<'c, F> Stepper<'c, F>
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    fn new(mut f: F, t0: f64, y0: &[f64], span: f64, config: &'c Rk45Config) -> Result<Self> {
        let n = y0.len();
        if n == 0 {
            return Err(UdeError::InvalidInput("empty state vector".into()));
        }
        if !(config.rtol > 0.0 && config.atol > 0.0) {
            return Err(UdeError::InvalidInput(format!(
                "tolerances must be positive (rtol={}, atol={})",
                config.rtol, config.atol
            )));
        }
        if y0.iter().any(|v| !v.is_finite()) {
            return Err(UdeError::NumericalDivergence {
                t: t0,
                reason: "non-finite initial state".into(),
            });
        }
        let n_err = config.error_dims.map_or(n, |d| d.clamp(1, n));
        let mut k: [Vec<f64>; 7] = std::array::from_fn(|_| vec![0.0; n]);
        f(t0, y0, &mut k[0]);
        let mut stepper = Self {
            f,
            config,
            t: t0,
            y: y0.to_vec(),
            h: 0.0,
            k,
            y_new: vec![0.0; n],
            y_stage: vec![0.0; n],
            n_err,
            n_steps: 0,
            n_rejected: 0,
            n_feval: 1,
        };
        stepper.h = stepper.initial_step(span);
        Ok(stepper)
    }

    /// Hairer's starting-step heuristic on the error-controlled components.
    fn initial_step(&mut self, span: f64) -> f64 {
        let n = self.n_err;
        let cfg = *self.config;
        let mut d0 = 0.0_f64;
        let mut d1 = 0.0_f64;
        for i in 0..n {
            let sc = scale(&cfg, self.y[i], self.y[i]);
            d0 += (self.y[i] / sc).powi(2);
            d1 += (self.k[0][i] / sc).powi(2);
        }
        let d0 = (d0 / n as f64).sqrt();
        let d1 = (d1 / n as f64).sqrt();
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(span.max(self.config.h_min));

        for (ys, (&y, &dy)) in self.y_stage.iter_mut().zip(self.y.iter().zip(&self.k[0])) {
            *ys = h0.mul_add(dy, y);
        }
        let (k0, rest) = self.k.split_at_mut(1);
        (self.f)(self.t + h0, &self.y_stage, &mut rest[0]);
        self.n_feval += 1;
        let mut d2 = 0.0_f64;
        for i in 0..n {
            let sc = scale(&cfg, self.y[i], self.y[i]);
            d2 += ((rest[0][i] - k0[0][i]) / sc).powi(2);
        }
        let d2 = (d2 / n as f64).sqrt() / h0;

        let dmax = d1.max(d2);
        let h1 = if dmax <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / dmax).powf(0.2)
        };
        (100.0 * h0)
            .min(h1)
            .min(self.config.h_max)
            .max(self.config.h_min)
    }

    fn advance_to(&mut self, t_target: f64) -> Result<()> {
        loop {
            let remaining = t_target - self.t;
            if remaining <= f64::EPSILON * self.t.abs().max(1.0) {
                self.t = t_target;
                return Ok(());
            }
            if self.n_steps + self.n_rejected >= self.config.max_steps {
                return Err(UdeError::NumericalDivergence {
                    t: self.t,
                    reason: format!("step budget of {} exhausted", self.config.max_steps),
                });
            }

            let clamped = self.h >= remaining;
            let h = if clamped { remaining } else { self.h };
            let err = self.attempt(h);

            if err <= 1.0 {
                self.t = if clamped { t_target } else { self.t + h };
                std::mem::swap(&mut self.y, &mut self.y_new);
                self.k.swap(0, 6);
                self.n_steps += 1;
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                let proposed = (h * factor).min(self.config.h_max);
                if clamped {
                    self.h = self.h.max(proposed);
                } else if proposed < self.config.h_min {
                    return Err(UdeError::NumericalDivergence {
                        t: self.t,
                        reason: format!(
                            "step size {proposed:.3e} below h_min {:.1e}",
                            self.config.h_min
                        ),
                    });
                } else {
                    self.h = proposed;
                }
            } else {
                self.n_rejected += 1;
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                } else {
                    MIN_FACTOR
                };
                self.h = h * factor;
                if self.h < self.config.h_min {
                    let reason = if err.is_finite() {
                        format!("step size {:.3e} below h_min {:.1e}", self.h, self.config.h_min)
                    } else {
                        "non-finite state".to_string()
                    };
                    return Err(UdeError::NumericalDivergence { t: self.t, reason });
                }
            }
        }
    }

    /// One trial step of size `h`; fills `y_new`, `k[6]`, returns the
    /// scaled RMS error (∞ when the trial state is not finite).
    fn attempt(&mut self, h: f64) -> f64 {
        let n = self.y.len();
        let t = self.t;

        self.stage(h, &[(0, A21)]);
        (self.f)(C2.mul_add(h, t), &self.y_stage, &mut self.k[1]);
        self.stage(h, &[(0, A31), (1, A32)]);
        (self.f)(C3.mul_add(h, t), &self.y_stage, &mut self.k[2]);
        self.stage(h, &[(0, A41), (1, A42), (2, A43)]);
        (self.f)(C4.mul_add(h, t), &self.y_stage, &mut self.k[3]);
        self.stage(h, &[(0, A51), (1, A52), (2, A53), (3, A54)]);
        (self.f)(C5.mul_add(h, t), &self.y_stage, &mut self.k[4]);
        self.stage(h, &[(0, A61), (1, A62), (2, A63), (3, A64), (4, A65)]);
        (self.f)(t + h, &self.y_stage, &mut self.k[5]);

        for i in 0..n {
            let k = &self.k;
            let incr = B6.mul_add(
                k[5][i],
                B5.mul_add(k[4][i], B4.mul_add(k[3][i], B3.mul_add(k[2][i], B1 * k[0][i]))),
            );
            self.y_new[i] = h.mul_add(incr, self.y[i]);
        }
        (self.f)(t + h, &self.y_new, &mut self.k[6]);
        self.n_feval += 6;

        if self.y_new.iter().any(|v| !v.is_finite()) || self.k[6].iter().any(|v| !v.is_finite())
        {
            return f64::INFINITY;
        }

        let mut acc = 0.0_f64;
        for i in 0..self.n_err {
            let k = &self.k;
            let e = h * E7.mul_add(
                k[6][i],
                E6.mul_add(
                    k[5][i],
                    E5.mul_add(k[4][i], E4.mul_add(k[3][i], E3.mul_add(k[2][i], E1 * k[0][i]))),
                ),
            );
            let sc = scale(self.config, self.y[i], self.y_new[i]);
            acc += (e / sc).powi(2);
        }
        (acc / self.n_err as f64).sqrt()
    }

    fn stage(&mut self, h: f64, coeffs: &[(usize, f64)]) {
        for i in 0..self.y.len() {
            let incr: f64 = coeffs.iter().map(|&(j, a)| a * self.k[j][i]).sum();
            self.y_stage[i] = h.mul_add(incr, self.y[i]);
        }
    }
}
