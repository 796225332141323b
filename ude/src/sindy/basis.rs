// SPDX-License-Identifier: AGPL-3.0-only

//! Candidate term dictionaries.
//!
//! A [`Basis`] is an ordered, duplicate-free list of [`Term`]s over named
//! state variables. Evaluating it on `m` samples gives the `m × K` library
//! matrix Θ that the sparse optimizers regress against.

use std::fmt::Write as _;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};

/// One candidate function of the state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// `1`
    Constant,
    /// `Π xᵢ^eᵢ`, one exponent per variable (total degree ≥ 1)
    Monomial(Vec<u32>),
    /// `sin(xᵢ)`
    Sin(usize),
    /// `cos(xᵢ)`
    Cos(usize),
}

impl Term {
    /// Value at state `x`.
    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self {
            Self::Constant => 1.0,
            Self::Monomial(exps) => exps
                .iter()
                .zip(x)
                .filter(|(e, _)| **e > 0)
                .map(|(&e, &v)| v.powi(i32::try_from(e).unwrap_or(i32::MAX)))
                .product(),
            Self::Sin(i) => x[*i].sin(),
            Self::Cos(i) => x[*i].cos(),
        }
    }

    /// Human-readable form, e.g. `x*y`, `x^2`, `sin(y)`.
    #[must_use]
    pub fn name(&self, vars: &[String]) -> String {
        match self {
            Self::Constant => "1".to_string(),
            Self::Monomial(exps) => {
                let mut out = String::new();
                for (v, &e) in vars.iter().zip(exps).filter(|(_, e)| **e > 0) {
                    if !out.is_empty() {
                        out.push('*');
                    }
                    out.push_str(v);
                    if e > 1 {
                        let _ = write!(out, "^{e}");
                    }
                }
                out
            }
            Self::Sin(i) => format!("sin({})", vars[*i]),
            Self::Cos(i) => format!("cos({})", vars[*i]),
        }
    }

    /// Product of the first two variables, `x·y`.
    #[must_use]
    pub fn interaction(n_vars: usize) -> Self {
        let mut exps = vec![0; n_vars];
        for e in exps.iter_mut().take(2) {
            *e = 1;
        }
        Self::Monomial(exps)
    }

    /// Zero-exponent monomials are the constant.
    fn canonical(self) -> Self {
        match self {
            Self::Monomial(exps) if exps.iter().all(|&e| e == 0) => Self::Constant,
            other => other,
        }
    }

    fn check(&self, n_vars: usize) -> Result<()> {
        let ok = match self {
            Self::Constant => true,
            Self::Monomial(exps) => exps.len() == n_vars,
            Self::Sin(i) | Self::Cos(i) => *i < n_vars,
        };
        if ok {
            Ok(())
        } else {
            Err(UdeError::InvalidInput(format!(
                "term {self:?} does not fit {n_vars} variables"
            )))
        }
    }
}

/// Ordered, duplicate-free term dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basis {
    vars: Vec<String>,
    terms: Vec<Term>,
}

impl Basis {
    /// Empty basis over `vars`.
    #[must_use]
    pub fn new(vars: &[&str]) -> Self {
        Self {
            vars: vars.iter().map(|v| (*v).to_string()).collect(),
            terms: Vec::new(),
        }
    }

    /// Basis with the given variable names and terms (duplicates dropped).
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a term refers to a variable that does not exist.
    pub fn from_terms(vars: Vec<String>, terms: impl IntoIterator<Item = Term>) -> Result<Self> {
        let mut basis = Self {
            vars,
            terms: Vec::new(),
        };
        for t in terms {
            basis.push(t)?;
        }
        Ok(basis)
    }

    /// Constant plus every monomial of total degree `1..=max_degree`,
    /// ordered by degree, then lexicographically by exponent (first variable
    /// highest).
    #[must_use]
    pub fn polynomial(vars: &[&str], max_degree: u32) -> Self {
        let mut basis = Self::new(vars);
        basis.terms.push(Term::Constant);
        let n = vars.len();
        if n == 0 {
            return basis;
        }
        for degree in 1..=max_degree {
            let mut exps = Vec::new();
            compositions(n, degree, &mut vec![0; n], 0, &mut exps);
            for e in exps {
                basis.terms.push(Term::Monomial(e));
            }
        }
        basis
    }

    /// Append `sin(xᵢ)` then `cos(xᵢ)` for every variable.
    #[must_use]
    pub fn with_trigonometric(mut self) -> Self {
        let n = self.vars.len();
        for i in 0..n {
            let _ = self.push_unchecked(Term::Sin(i));
        }
        for i in 0..n {
            let _ = self.push_unchecked(Term::Cos(i));
        }
        self
    }

    /// Append a term unless already present; returns whether it was added.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the term refers to a variable that does not exist.
    pub fn push(&mut self, term: Term) -> Result<bool> {
        term.check(self.vars.len())?;
        Ok(self.push_unchecked(term))
    }

    fn push_unchecked(&mut self, term: Term) -> bool {
        let term = term.canonical();
        if self.terms.contains(&term) {
            false
        } else {
            self.terms.push(term);
            true
        }
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True without terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in order.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Variable names.
    #[must_use]
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Position of `term`, if present.
    #[must_use]
    pub fn index_of(&self, term: &Term) -> Option<usize> {
        self.terms.iter().position(|t| t == term)
    }

    /// Term names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name(&self.vars)).collect()
    }

    /// Every term at one state.
    #[must_use]
    pub fn evaluate_point(&self, x: &[f64]) -> Vec<f64> {
        self.terms.iter().map(|t| t.evaluate(x)).collect()
    }

    /// Library matrix Θ, `samples × terms`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if there are no samples, no terms, or a sample does not
    /// have one value per variable.
    pub fn evaluate(&self, inputs: &[Vec<f64>]) -> Result<DMatrix<f64>> {
        if inputs.is_empty() || self.terms.is_empty() {
            return Err(UdeError::InvalidInput(format!(
                "library needs samples and terms ({} × {})",
                inputs.len(),
                self.terms.len()
            )));
        }
        if let Some(bad) = inputs.iter().position(|x| x.len() != self.vars.len()) {
            return Err(UdeError::InvalidInput(format!(
                "sample {bad} has {} values, basis has {} variables",
                inputs[bad].len(),
                self.vars.len()
            )));
        }
        Ok(DMatrix::from_fn(inputs.len(), self.terms.len(), |r, c| {
            self.terms[c].evaluate(&inputs[r])
        }))
    }
}

/// All exponent vectors of length `n` summing to `remaining`, first
/// variable's exponent descending.
fn compositions(
    n: usize,
    remaining: u32,
    current: &mut [u32],
    pos: usize,
    out: &mut Vec<Vec<u32>>,
) {
    if pos + 1 == n {
        current[pos] = remaining;
        out.push(current.to_vec());
        return;
    }
    for e in (0..=remaining).rev() {
        current[pos] = e;
        compositions(n, remaining - e, current, pos + 1, out);
    }
    current[pos] = 0;
}
