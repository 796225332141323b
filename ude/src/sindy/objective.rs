// SPDX-License-Identifier: AGPL-3.0-only

//! Scoring of candidate models in a threshold sweep (lower is better).

use serde::{Deserialize, Serialize};

/// How a candidate with `l0` active terms and residual norm `error` scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionObjective {
    /// ∞ below `min_terms` active terms, else the residual norm.
    ErrorWithMinTerms {
        /// Smallest admissible support
        min_terms: usize,
    },
    /// ∞ below `min_terms` active terms, else `‖(l0, error)‖₂`.
    ComplexityErrorNorm {
        /// Smallest admissible support
        min_terms: usize,
    },
    /// Caller-supplied `f(l0, error)`.
    #[serde(skip)]
    Custom(fn(usize, f64) -> f64),
}

impl Default for SelectionObjective {
    fn default() -> Self {
        Self::ComplexityErrorNorm { min_terms: 1 }
    }
}

impl PartialEq for SelectionObjective {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::ErrorWithMinTerms { min_terms: a },
                Self::ErrorWithMinTerms { min_terms: b },
            )
            | (
                Self::ComplexityErrorNorm { min_terms: a },
                Self::ComplexityErrorNorm { min_terms: b },
            ) => a == b,
            (Self::Custom(f), Self::Custom(g)) => *f as usize == *g as usize,
            _ => false,
        }
    }
}

impl SelectionObjective {
    /// Score one candidate.
    #[must_use]
    pub fn score(&self, l0: usize, error: f64) -> f64 {
        match *self {
            Self::ErrorWithMinTerms { min_terms } => {
                if l0 < min_terms {
                    f64::INFINITY
                } else {
                    error
                }
            }
            Self::ComplexityErrorNorm { min_terms } => {
                if l0 < min_terms {
                    f64::INFINITY
                } else {
                    (l0 as f64).hypot(error)
                }
            }
            Self::Custom(f) => f(l0, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_support_is_infeasible() {
        for obj in [
            SelectionObjective::ErrorWithMinTerms { min_terms: 1 },
            SelectionObjective::ComplexityErrorNorm { min_terms: 1 },
        ] {
            assert!(obj.score(0, 0.0).is_infinite());
        }
    }

    #[test]
    fn error_only_ignores_complexity() {
        let obj = SelectionObjective::ErrorWithMinTerms { min_terms: 1 };
        assert!(obj.score(20, 0.1) < obj.score(1, 0.2));
    }

    #[test]
    fn complexity_norm_prefers_sparse() {
        let obj = SelectionObjective::ComplexityErrorNorm { min_terms: 1 };
        assert!((obj.score(3, 4.0) - 5.0).abs() < 1e-12);
        assert!(obj.score(1, 0.2) < obj.score(20, 0.1));
    }

    #[test]
    fn custom_objective() {
        fn aic_like(l0: usize, err: f64) -> f64 {
            2.0 * l0 as f64 + err
        }
        let obj = SelectionObjective::Custom(aic_like);
        assert!((obj.score(2, 1.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_round_trip_named_objectives() {
        let obj = SelectionObjective::ComplexityErrorNorm { min_terms: 2 };
        let json = serde_json::to_string(&obj).expect("serialize");
        assert_eq!(json, r#"{"complexity_error_norm":{"min_terms":2}}"#);
        let back: SelectionObjective = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, obj);
        assert_ne!(back, SelectionObjective::ErrorWithMinTerms { min_terms: 2 });
    }
}
