// SPDX-License-Identifier: AGPL-3.0-only

//! Threshold sweep, per-equation model selection and basis narrowing.
//!
//! For each output equation independently and each threshold λ of the
//! sweep: fit sparse coefficients, refit least squares on the surviving
//! support, score `objective(L0, ‖y − Θξ‖₂)`. The lowest score wins; on
//! ties the earliest threshold in sweep order is kept.

use std::collections::HashMap;
use std::fmt::Write as _;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::basis::{Basis, Term};
use super::objective::SelectionObjective;
use super::preprocess::{denoise, normalize_columns};
use super::sr3::{Sr3Config, Sr3Solver};
use super::stlsq::{stlsq, StlsqConfig};
use super::{least_squares_on_support, support_of};
use crate::error::{Result, UdeError};
use crate::tolerances;

/// Sparse optimizer run at every threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseOptimizer {
    /// Relaxed L0 (threshold λ ↦ hard threshold √(2λν))
    Sr3(Sr3Config),
    /// Sequential thresholding (threshold λ on coefficient magnitude)
    Stlsq(StlsqConfig),
}

impl Default for SparseOptimizer {
    fn default() -> Self {
        Self::Sr3(Sr3Config::default())
    }
}

/// Library preprocessing. Denoising runs before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionOptions {
    /// Scale library columns to unit norm while fitting
    pub normalize: bool,
    /// Optimal singular-value hard threshold of the library
    pub denoise: bool,
}

/// Selected fit for one output equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationFit {
    /// One coefficient per basis term, zero when inactive
    pub coefficients: Vec<f64>,
    /// Threshold that produced this fit
    pub threshold: f64,
    /// ‖y − Θξ‖₂ on the fitting library
    pub error: f64,
    /// Objective score
    pub score: f64,
}

impl EquationFit {
    /// Number of active terms.
    #[must_use]
    pub fn l0(&self) -> usize {
        self.coefficients
            .iter()
            .filter(|c| c.abs() > tolerances::SPARSE_ZERO)
            .count()
    }
}

/// Sparse symbolic model: a basis and one coefficient vector per equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseModel {
    basis: Basis,
    equations: Vec<EquationFit>,
}

/// The set of active terms of a model, without coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralForm {
    vars: Vec<String>,
    terms: Vec<Term>,
}

impl StructuralForm {
    /// Active terms in basis order.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True when no term survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Term names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name(&self.vars)).collect()
    }

    /// Narrowed basis containing exactly these terms.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the form is empty.
    pub fn to_basis(&self) -> Result<Basis> {
        if self.terms.is_empty() {
            return Err(UdeError::InvalidInput(
                "structural form has no terms to refine".into(),
            ));
        }
        Basis::from_terms(self.vars.clone(), self.terms.iter().cloned())
    }
}

impl SparseModel {
    /// Model with explicit coefficients (one vector per equation).
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a coefficient vector does not match the basis.
    pub fn from_coefficients(basis: Basis, coefficients: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = coefficients.iter().position(|c| c.len() != basis.len()) {
            return Err(UdeError::InvalidInput(format!(
                "equation {bad} has {} coefficients, basis has {} terms",
                coefficients[bad].len(),
                basis.len()
            )));
        }
        let equations = coefficients
            .into_iter()
            .map(|coefficients| EquationFit {
                coefficients,
                threshold: 0.0,
                error: 0.0,
                score: 0.0,
            })
            .collect();
        Ok(Self { basis, equations })
    }

    /// Basis the coefficients refer to.
    #[must_use]
    pub const fn basis(&self) -> &Basis {
        &self.basis
    }

    /// Per-equation fits.
    #[must_use]
    pub fn equations(&self) -> &[EquationFit] {
        &self.equations
    }

    /// Number of output equations.
    #[must_use]
    pub fn n_equations(&self) -> usize {
        self.equations.len()
    }

    /// Active terms of equation `eq` with their coefficients.
    #[must_use]
    pub fn active_terms(&self, eq: usize) -> Vec<(&Term, f64)> {
        self.basis
            .terms()
            .iter()
            .zip(&self.equations[eq].coefficients)
            .filter(|(_, c)| c.abs() > tolerances::SPARSE_ZERO)
            .map(|(t, &c)| (t, c))
            .collect()
    }

    /// Coefficient of `term` in equation `eq` (zero when absent or inactive).
    #[must_use]
    pub fn coefficient_of(&self, eq: usize, term: &Term) -> f64 {
        self.basis
            .index_of(term)
            .map_or(0.0, |k| self.equations[eq].coefficients[k])
    }

    /// Active terms of equation `eq`.
    #[must_use]
    pub fn l0(&self, eq: usize) -> usize {
        self.equations[eq].l0()
    }

    /// Write every equation's output at state `x` into `out`.
    pub fn evaluate_into(&self, x: &[f64], out: &mut [f64]) {
        for (o, fit) in out.iter_mut().zip(&self.equations) {
            *o = self
                .basis
                .terms()
                .iter()
                .zip(&fit.coefficients)
                .filter(|(_, c)| **c != 0.0)
                .map(|(t, c)| c * t.evaluate(x))
                .sum();
        }
    }

    /// Every equation's output at state `x`.
    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.equations.len()];
        self.evaluate_into(x, &mut out);
        out
    }

    /// Union of active terms over all equations, in basis order.
    #[must_use]
    pub fn structural_form(&self) -> StructuralForm {
        let terms = self
            .basis
            .terms()
            .iter()
            .enumerate()
            .filter(|(k, _)| {
                self.equations
                    .iter()
                    .any(|e| e.coefficients[*k].abs() > tolerances::SPARSE_ZERO)
            })
            .map(|(_, t)| t.clone())
            .collect();
        StructuralForm {
            vars: self.basis.vars().to_vec(),
            terms,
        }
    }

    /// `c₁·t₁ + c₂·t₂ …` for equation `eq`; `0` when empty.
    #[must_use]
    pub fn equation_string(&self, eq: usize) -> String {
        let mut out = String::new();
        for (term, c) in self.active_terms(eq) {
            let name = term.name(self.basis.vars());
            if out.is_empty() {
                let _ = write!(out, "{c:.6}*{name}");
            } else if c < 0.0 {
                let _ = write!(out, " - {:.6}*{name}", -c);
            } else {
                let _ = write!(out, " + {c:.6}*{name}");
            }
        }
        if out.is_empty() {
            out.push('0');
        }
        out
    }
}

/// `10^(lo_exp + i·step)` for `i = 0, 1, …` while the exponent is at most
/// `hi_exp` (inclusive, up to rounding).
#[must_use]
pub fn log_thresholds(lo_exp: f64, hi_exp: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || hi_exp < lo_exp {
        return vec![10f64.powf(lo_exp)];
    }
    let n = ((hi_exp - lo_exp) / step + 1e-9).floor() as usize;
    (0..=n)
        .map(|i| 10f64.powf((i as f64).mul_add(step, lo_exp)))
        .collect()
}

/// Sweep `thresholds` with `optimizer` and keep, per output equation, the
/// candidate with the lowest `objective` score.
///
/// `inputs` are state samples (one row per sample), `outputs` the targets
/// (one row per sample, one column per equation).
///
/// # Errors
///
/// `InvalidInput` on shape mismatches or an empty sweep;
/// `RegressionInfeasible` if every candidate of some equation scores
/// infinite; `LinearAlgebra` from factorizations and solves.
pub fn regress(
    inputs: &[Vec<f64>],
    outputs: &[Vec<f64>],
    basis: &Basis,
    thresholds: &[f64],
    optimizer: &SparseOptimizer,
    objective: &SelectionObjective,
    options: &RegressionOptions,
) -> Result<SparseModel> {
    if inputs.len() != outputs.len() {
        return Err(UdeError::InvalidInput(format!(
            "{} input samples but {} output samples",
            inputs.len(),
            outputs.len()
        )));
    }
    let n_eq = outputs.first().map_or(0, Vec::len);
    if n_eq == 0 || outputs.iter().any(|o| o.len() != n_eq) {
        return Err(UdeError::InvalidInput(
            "outputs must be non-empty rows of equal length".into(),
        ));
    }
    if thresholds.is_empty() || thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
        return Err(UdeError::InvalidInput(
            "threshold sweep must be non-empty, finite and non-negative".into(),
        ));
    }

    let raw = basis.evaluate(inputs)?;
    let library = if options.denoise { denoise(&raw)? } else { raw };
    let (library, norms) = if options.normalize {
        normalize_columns(&library)
    } else {
        let k = library.ncols();
        (library, vec![1.0; k])
    };
    let fitter = match optimizer {
        SparseOptimizer::Sr3(cfg) => Fitter::Sr3(Sr3Solver::new(&library, *cfg)?),
        SparseOptimizer::Stlsq(cfg) => Fitter::Stlsq(*cfg),
    };

    let mut equations = Vec::with_capacity(n_eq);
    for eq in 0..n_eq {
        let y = DVector::from_iterator(outputs.len(), outputs.iter().map(|o| o[eq]));
        let mut refits: HashMap<Vec<usize>, (DVector<f64>, f64)> = HashMap::new();
        let mut best: Option<(f64, f64, DVector<f64>, f64)> = None;

        for &lambda in thresholds {
            let sparse = match &fitter {
                Fitter::Sr3(solver) => solver.fit(&y, lambda),
                Fitter::Stlsq(cfg) => stlsq(&library, &y, lambda, cfg)?,
            };
            let support = support_of(&sparse);
            let (xi, error) = match refits.get(&support) {
                Some(hit) => hit.clone(),
                None => {
                    let fit = refit(&library, &y, &support)?;
                    refits.insert(support, fit.clone());
                    fit
                }
            };
            let score = objective.score(support_of(&xi).len(), error);
            if best.as_ref().map_or(score.is_finite(), |b| score < b.0) {
                best = Some((score, lambda, xi, error));
            }
        }

        let Some((score, threshold, xi, error)) = best else {
            return Err(UdeError::RegressionInfeasible {
                equation: eq,
                candidates: thresholds.len(),
            });
        };
        let coefficients: Vec<f64> = xi.iter().zip(&norms).map(|(c, n)| c / n).collect();
        let fit = EquationFit {
            coefficients,
            threshold,
            error,
            score,
        };
        tracing::info!(
            equation = eq,
            threshold,
            l0 = fit.l0(),
            error,
            score,
            distinct_supports = refits.len(),
            "sparse model selected"
        );
        equations.push(fit);
    }

    let model = SparseModel {
        basis: basis.clone(),
        equations,
    };
    for eq in 0..model.n_equations() {
        tracing::debug!(equation = eq, form = %model.equation_string(eq), "recovered equation");
    }
    Ok(model)
}

/// Second pass: regress again on the basis narrowed to `form`.
///
/// # Errors
///
/// As [`regress`]; `InvalidInput` for an empty form.
pub fn refine(
    inputs: &[Vec<f64>],
    outputs: &[Vec<f64>],
    form: &StructuralForm,
    thresholds: &[f64],
    optimizer: &SparseOptimizer,
    objective: &SelectionObjective,
    options: &RegressionOptions,
) -> Result<SparseModel> {
    let basis = form.to_basis()?;
    tracing::info!(terms = ?form.names(), "refining on narrowed basis");
    regress(inputs, outputs, &basis, thresholds, optimizer, objective, options)
}

/// Optimizer state shared by every threshold of one sweep.
enum Fitter<'a> {
    Sr3(Sr3Solver<'a>),
    Stlsq(StlsqConfig),
}

/// Least squares on `support`, with its residual norm.
fn refit(
    library: &DMatrix<f64>,
    y: &DVector<f64>,
    support: &[usize],
) -> Result<(DVector<f64>, f64)> {
    let xi = least_squares_on_support(library, y, support)?;
    let error = (y - library * &xi).norm();
    Ok((xi, error))
}
