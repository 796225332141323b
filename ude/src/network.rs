// SPDX-License-Identifier: AGPL-3.0-only

//! Learned residual models `g(x; θ)`.
//!
//! [`ResidualModel`] is the seam between the hybrid ODE and whatever
//! approximates the missing dynamics. Models expose value, state Jacobian
//! and parameter Jacobian so the forward-sensitivity system in
//! [`crate::sensitivity`] can differentiate the loss exactly.
//!
//! # Parameter layout ([`Mlp`])
//!
//! Flat `θ`, layer by layer: weights row-major (`out × in`), then biases.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};

/// Parametric map `g: ℝⁿ × ℝᴾ → ℝⁿ` with a pure evaluation given `θ`.
pub trait ResidualModel {
    /// State (input and output) dimension `n`.
    fn state_dim(&self) -> usize;

    /// Parameter count `P`.
    fn n_params(&self) -> usize;

    /// Write `g(x; θ)` into `out`.
    fn eval(&self, x: &[f64], theta: &[f64], out: &mut [f64]);

    /// Value plus `∂g/∂x` and `∂g/∂θ`.
    fn eval_jacobian(&self, x: &[f64], theta: &[f64], jac: &mut ModelJacobian);

    /// Initial parameter vector (deterministic for a given seed).
    fn initial_params(&self, seed: u64) -> Vec<f64>;
}

/// Value and Jacobians of a residual model at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelJacobian {
    /// `g(x; θ)`, length `n`
    pub value: Vec<f64>,
    /// `∂gᵢ/∂xⱼ`, row-major `n × n`
    pub d_state: Vec<f64>,
    /// `∂gᵢ/∂θₚ`, row-major `n × P`
    pub d_params: Vec<f64>,
    n_params: usize,
}

impl ModelJacobian {
    /// Zeroed buffers for a model of dimension `n` with `n_params` parameters.
    #[must_use]
    pub fn new(n: usize, n_params: usize) -> Self {
        Self {
            value: vec![0.0; n],
            d_state: vec![0.0; n * n],
            d_params: vec![0.0; n * n_params],
            n_params,
        }
    }

    /// `∂gᵢ/∂θ` row.
    #[must_use]
    pub fn d_params_row(&self, i: usize) -> &[f64] {
        &self.d_params[i * self.n_params..(i + 1) * self.n_params]
    }
}

/// Hidden-layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `tanh(z)`
    Tanh,
    /// Gaussian radial basis `exp(−z²)`
    Rbf,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Self::Tanh => z.tanh(),
            Self::Rbf => (-z * z).exp(),
        }
    }

    /// Derivative given pre-activation `z` and activation `a = σ(z)`.
    fn derivative(self, z: f64, a: f64) -> f64 {
        match self {
            Self::Tanh => a.mul_add(-a, 1.0),
            Self::Rbf => -2.0 * z * a,
        }
    }
}

/// Fully connected feed-forward network, activation on hidden layers,
/// linear output layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    widths: Vec<usize>,
    activation: Activation,
    /// `(weight offset, bias offset)` per layer
    offsets: Vec<(usize, usize)>,
    n_params: usize,
}

impl Mlp {
    /// Network with layer widths `[n, h₁, …, n]`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if fewer than two widths are given, any width is zero,
    /// or input and output widths differ.
    pub fn new(widths: &[usize], activation: Activation) -> Result<Self> {
        if widths.len() < 2 || widths.contains(&0) {
            return Err(UdeError::InvalidInput(format!(
                "network widths must be ≥ 2 positive layers, got {widths:?}"
            )));
        }
        if widths[0] != widths[widths.len() - 1] {
            return Err(UdeError::InvalidInput(format!(
                "residual network must map ℝ^{} → ℝ^{}, got output {}",
                widths[0],
                widths[0],
                widths[widths.len() - 1]
            )));
        }
        let mut offsets = Vec::with_capacity(widths.len() - 1);
        let mut cursor = 0;
        for w in widths.windows(2) {
            let (n_in, n_out) = (w[0], w[1]);
            offsets.push((cursor, cursor + n_in * n_out));
            cursor += n_in * n_out + n_out;
        }
        Ok(Self {
            widths: widths.to_vec(),
            activation,
            offsets,
            n_params: cursor,
        })
    }

    /// Layer widths.
    #[must_use]
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Hidden activation.
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    fn n_layers(&self) -> usize {
        self.offsets.len()
    }

    /// Forward pass keeping pre-activations and activations (`act[0] = x`).
    fn forward(&self, x: &[f64], theta: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let mut pre = Vec::with_capacity(self.n_layers());
        let mut act = Vec::with_capacity(self.n_layers() + 1);
        act.push(x.to_vec());
        for l in 0..self.n_layers() {
            let z = self.layer(l, &act[l], theta);
            let a = if l + 1 < self.n_layers() {
                z.iter().map(|&v| self.activation.apply(v)).collect()
            } else {
                z.clone()
            };
            pre.push(z);
            act.push(a);
        }
        (pre, act)
    }

    fn layer(&self, l: usize, input: &[f64], theta: &[f64]) -> Vec<f64> {
        let (n_in, n_out) = (self.widths[l], self.widths[l + 1]);
        let (w_off, b_off) = self.offsets[l];
        (0..n_out)
            .map(|i| {
                let row = &theta[w_off + i * n_in..w_off + (i + 1) * n_in];
                row.iter()
                    .zip(input)
                    .fold(theta[b_off + i], |acc, (w, a)| w.mul_add(*a, acc))
            })
            .collect()
    }
}

impl ResidualModel for Mlp {
    fn state_dim(&self) -> usize {
        self.widths[0]
    }

    fn n_params(&self) -> usize {
        self.n_params
    }

    fn eval(&self, x: &[f64], theta: &[f64], out: &mut [f64]) {
        let mut a = x.to_vec();
        for l in 0..self.n_layers() {
            let z = self.layer(l, &a, theta);
            a = if l + 1 < self.n_layers() {
                z.into_iter().map(|v| self.activation.apply(v)).collect()
            } else {
                z
            };
        }
        out.copy_from_slice(&a);
    }

    fn eval_jacobian(&self, x: &[f64], theta: &[f64], jac: &mut ModelJacobian) {
        let (pre, act) = self.forward(x, theta);
        let n = self.state_dim();
        let p = self.n_params;
        jac.value.copy_from_slice(&act[self.n_layers()]);

        // One reverse sweep per output component.
        for k in 0..n {
            let mut delta = vec![0.0; n];
            delta[k] = 1.0;
            let row = &mut jac.d_params[k * p..(k + 1) * p];
            for l in (0..self.n_layers()).rev() {
                let (n_in, n_out) = (self.widths[l], self.widths[l + 1]);
                let (w_off, b_off) = self.offsets[l];
                let a_prev = &act[l];
                for i in 0..n_out {
                    let d = delta[i];
                    row[b_off + i] = d;
                    let w_row = &mut row[w_off + i * n_in..w_off + (i + 1) * n_in];
                    for (g, a) in w_row.iter_mut().zip(a_prev) {
                        *g = d * a;
                    }
                }
                let mut back = vec![0.0; n_in];
                for (i, &d) in delta.iter().enumerate().take(n_out) {
                    let w_row = &theta[w_off + i * n_in..w_off + (i + 1) * n_in];
                    for (b, w) in back.iter_mut().zip(w_row) {
                        *b = w.mul_add(d, *b);
                    }
                }
                if l > 0 {
                    for (j, b) in back.iter_mut().enumerate() {
                        *b *= self.activation.derivative(pre[l - 1][j], act[l][j]);
                    }
                }
                delta = back;
            }
            jac.d_state[k * n..(k + 1) * n].copy_from_slice(&delta);
        }
    }

    /// Glorot-uniform weights, zero biases.
    fn initial_params(&self, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut theta = vec![0.0; self.n_params];
        for (l, &(w_off, b_off)) in self.offsets.iter().enumerate() {
            let (n_in, n_out) = (self.widths[l], self.widths[l + 1]);
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();
            for w in &mut theta[w_off..b_off] {
                *w = rng.gen_range(-limit..limit);
            }
        }
        theta
    }
}

/// `g ≡ 0`, no parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroResidual {
    dim: usize,
}

impl ZeroResidual {
    /// Zero map on ℝ^`dim`.
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl ResidualModel for ZeroResidual {
    fn state_dim(&self) -> usize {
        self.dim
    }

    fn n_params(&self) -> usize {
        0
    }

    fn eval(&self, _x: &[f64], _theta: &[f64], out: &mut [f64]) {
        out.fill(0.0);
    }

    fn eval_jacobian(&self, _x: &[f64], _theta: &[f64], jac: &mut ModelJacobian) {
        jac.value.fill(0.0);
        jac.d_state.fill(0.0);
    }

    fn initial_params(&self, _seed: u64) -> Vec<f64> {
        Vec::new()
    }
}

/// Two-parameter bilinear residual `[θ₀·x·y, θ₁·x·y]`.
///
/// Has the exact functional form of the Lotka-Volterra interaction, which
/// makes it a fast, well-posed stand-in for the network when exercising the
/// trainer and gradient code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BilinearResidual;

impl ResidualModel for BilinearResidual {
    fn state_dim(&self) -> usize {
        2
    }

    fn n_params(&self) -> usize {
        2
    }

    fn eval(&self, x: &[f64], theta: &[f64], out: &mut [f64]) {
        let xy = x[0] * x[1];
        out[0] = theta[0] * xy;
        out[1] = theta[1] * xy;
    }

    fn eval_jacobian(&self, x: &[f64], theta: &[f64], jac: &mut ModelJacobian) {
        let xy = x[0] * x[1];
        jac.value[0] = theta[0] * xy;
        jac.value[1] = theta[1] * xy;
        // ∂(θᵢ x y)/∂(x, y) = θᵢ (y, x)
        jac.d_state.copy_from_slice(&[
            theta[0] * x[1],
            theta[0] * x[0],
            theta[1] * x[1],
            theta[1] * x[0],
        ]);
        jac.d_params.copy_from_slice(&[xy, 0.0, 0.0, xy]);
    }

    fn initial_params(&self, _seed: u64) -> Vec<f64> {
        vec![0.0, 0.0]
    }
}
