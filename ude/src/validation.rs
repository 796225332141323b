// SPDX-License-Identifier: AGPL-3.0-only

//! Acceptance harness for the validation binaries.
//!
//! Every binary records explicit pass/fail checks against the named
//! constants in [`crate::tolerances`], prints a summary on stdout and exits
//! 0 when every check passes, 1 otherwise. A stage that fails with a
//! [`UdeError`] is recorded as a failed check carrying the error kind.

use std::fmt::Write as _;
use std::process;

use crate::error::UdeError;
use crate::trajectory::Discrepancy;

/// One recorded check.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label
    pub label: String,
    /// Whether this check passed
    pub passed: bool,
    /// Observed value
    pub observed: f64,
    /// Expected value or bound
    pub expected: f64,
    /// Tolerance used
    pub tolerance: f64,
    /// How the tolerance was applied
    pub mode: ToleranceMode,
}

/// How a tolerance is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    /// |observed − expected| < tolerance
    Absolute,
    /// observed < bound
    UpperBound,
    /// observed > bound
    LowerBound,
    /// pass/fail only
    Boolean,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::UpperBound => write!(f, "<"),
            Self::LowerBound => write!(f, ">"),
            Self::Boolean => write!(f, "bool"),
        }
    }
}

/// Accumulates checks and produces the summary and exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    /// Name of the validation binary
    pub name: String,
    /// All checks performed
    pub checks: Vec<Check>,
    /// Stage failures as `(stage, error kind, message)`
    pub errors: Vec<(String, &'static str, String)>,
}

impl ValidationHarness {
    /// Harness for a named validation binary.
    #[must_use = "validation harness must be used to run checks"]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, passed: bool, observed: f64, expected: f64, tolerance: f64, mode: ToleranceMode) {
        tracing::debug!(label, passed, observed, expected, tolerance, %mode, "check");
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    /// |observed − expected| < tolerance
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() < tolerance;
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Absolute);
    }

    /// observed < threshold (NaN fails)
    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        self.push(label, observed < threshold, observed, threshold, threshold, ToleranceMode::UpperBound);
    }

    /// observed > threshold (NaN fails)
    pub fn check_lower(&mut self, label: &str, observed: f64, threshold: f64) {
        self.push(label, observed > threshold, observed, threshold, threshold, ToleranceMode::LowerBound);
    }

    /// Plain pass/fail.
    pub fn check_bool(&mut self, label: &str, passed: bool) {
        self.push(label, passed, f64::from(u8::from(passed)), 1.0, 0.0, ToleranceMode::Boolean);
    }

    /// Both trajectory metrics under their bounds; `None` skips that metric.
    pub fn check_discrepancy(
        &mut self,
        label: &str,
        d: &Discrepancy,
        l2_max: Option<f64>,
        linf_max: Option<f64>,
    ) {
        if let Some(bound) = l2_max {
            self.check_upper(&format!("{label} L2"), d.l2, bound);
        }
        if let Some(bound) = linf_max {
            self.check_upper(&format!("{label} L∞"), d.linf, bound);
        }
    }

    /// Record a failed stage; counts as one failed check.
    pub fn record_error(&mut self, stage: &str, err: &UdeError) {
        tracing::error!(stage, kind = err.kind(), error = %err, "stage failed");
        self.errors
            .push((stage.to_string(), err.kind(), err.to_string()));
        self.check_bool(&format!("{stage} completed"), false);
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Total number of checks.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Whether all checks passed (vacuously true when empty).
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// 0 when every check passed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// Summary text printed by [`Self::finish`].
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "═══ {} validation: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            if check.mode == ToleranceMode::Boolean {
                let _ = writeln!(s, "  {icon} {}", check.label);
            } else {
                let _ = writeln!(
                    s,
                    "  {icon} {}: observed={:.6e}, expected={:.6e}, tol={:.2e} ({})",
                    check.label, check.observed, check.expected, check.tolerance, check.mode
                );
            }
        }
        for (stage, kind, message) in &self.errors {
            let _ = writeln!(s, "  ! {stage}: {kind}: {message}");
        }
        if self.all_passed() {
            let _ = writeln!(s, "ALL CHECKS PASSED");
        } else {
            let failed: Vec<&str> = self
                .checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.label.as_str())
                .collect();
            let _ = writeln!(s, "FAILED CHECKS: {}", failed.join(", "));
        }
        s
    }

    /// Print the summary and exit with [`Self::exit_code`].
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.format_summary());
        process::exit(self.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_tracks_pass_fail() {
        let mut h = ValidationHarness::new("test");
        h.check_abs("exact", 1.0, 1.0, 1e-10);
        h.check_abs("close", 1.0001, 1.0, 1e-3);
        h.check_abs("far", 2.0, 1.0, 1e-3);
        assert_eq!(h.passed_count(), 2);
        assert_eq!(h.total_count(), 3);
        assert!(!h.all_passed());
        assert_eq!(h.exit_code(), 1);
    }

    #[test]
    fn bounds_are_strict_and_reject_nan() {
        let mut h = ValidationHarness::new("test");
        h.check_upper("at", 1.0, 1.0);
        h.check_lower("at", 1.0, 1.0);
        h.check_upper("nan", f64::NAN, 1.0);
        h.check_upper("below", 0.5, 1.0);
        assert_eq!(h.passed_count(), 1);
    }

    #[test]
    fn empty_harness_passes() {
        let h = ValidationHarness::new("empty");
        assert!(h.all_passed());
        assert_eq!(h.exit_code(), 0);
    }

    #[test]
    fn discrepancy_checks_both_metrics() {
        let mut h = ValidationHarness::new("test");
        let d = Discrepancy { l2: 0.3, linf: 0.2 };
        h.check_discrepancy("symbolic", &d, Some(0.5), Some(0.15));
        assert_eq!(h.total_count(), 2);
        assert_eq!(h.passed_count(), 1);
        assert_eq!(h.checks[1].label, "symbolic L∞");
        h.check_discrepancy("trained", &d, Some(0.1), None);
        assert_eq!(h.total_count(), 3);
    }

    #[test]
    fn recorded_error_fails_and_is_summarized() {
        let mut h = ValidationHarness::new("ude");
        h.check_bool("ok", true);
        h.record_error(
            "train",
            &UdeError::OptimizationDivergence {
                loss: 3.0,
                threshold: 1e-2,
            },
        );
        assert!(!h.all_passed());
        let s = h.format_summary();
        assert!(s.contains("1/2"));
        assert!(s.contains("OptimizationDivergence"));
        assert!(s.contains("FAILED CHECKS: train completed"));
    }

    #[test]
    fn summary_reports_success() {
        let mut h = ValidationHarness::new("numerics");
        h.check_abs("a", 1.0, 1.0, 1e-10);
        h.check_bool("b", true);
        let s = h.format_summary();
        assert!(s.contains("numerics"));
        assert!(s.contains("ALL CHECKS PASSED"));
        assert_eq!(ToleranceMode::UpperBound.to_string(), "<");
    }
}
