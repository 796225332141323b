// SPDX-License-Identifier: AGPL-3.0-only

//! Provenance of the reference Lotka-Volterra setup.
//!
//! The physical parameters, initial state and sampling grid reproduce the
//! "missing physics" predator-prey experiment of the universal differential
//! equation literature, so recovered coefficients can be compared to known
//! values.
//!
//! ## Sources
//!
//! | Item | Reference |
//! |------|-----------|
//! | UDE + SINDy on Lotka-Volterra | Rackauckas et al., *Universal Differential Equations for Scientific Machine Learning*, arXiv:2001.04385 |
//! | SINDy | Brunton, Proctor & Kutz, PNAS 113, 3932 (2016) |
//! | SR3 | Zheng, Askham, Brunton, Kutz & Aravkin, IEEE Access 7, 1404 (2019) |
//! | Optimal SV hard threshold | Gavish & Donoho, IEEE Trans. Inf. Theory 60, 5040 (2014) |

use crate::lotka_volterra::LotkaVolterraParams;

/// A reference value with its origin.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceValue {
    /// Human-readable label
    pub label: &'static str,
    /// The value
    pub value: f64,
    /// Where it comes from
    pub source: &'static str,
}

/// True physical parameters `(α, β, γ, δ)` of the reference run.
pub const LOTKA_VOLTERRA_REFERENCE: LotkaVolterraParams = LotkaVolterraParams {
    alpha: 1.3,
    beta: 0.9,
    gamma: 0.8,
    delta: 1.8,
};

/// Initial (prey, predator) populations.
pub const REFERENCE_U0: [f64; 2] = [0.442_492_96, 4.628_059_4];

/// Start of the simulated window.
pub const REFERENCE_T0: f64 = 0.0;

/// End of the simulated window.
pub const REFERENCE_T_END: f64 = 3.0;

/// Output cadence (31 samples over [0, 3]).
pub const REFERENCE_SAVE_DT: f64 = 0.1;

/// Additive noise σ on the observations.
pub const REFERENCE_NOISE: f64 = 1e-3;

/// Seed of the reference noise draw and network initialization.
pub const REFERENCE_SEED: u64 = 5443;

/// Interaction coefficient β (prey loss per encounter), to be recovered.
pub const TRUE_BETA: ReferenceValue = ReferenceValue {
    label: "β (x·y coefficient in dx/dt, negated)",
    value: LOTKA_VOLTERRA_REFERENCE.beta,
    source: "arXiv:2001.04385 §3, Lotka-Volterra example",
};

/// Interaction coefficient γ (predator gain per encounter), to be recovered.
pub const TRUE_GAMMA: ReferenceValue = ReferenceValue {
    label: "γ (x·y coefficient in dy/dt)",
    value: LOTKA_VOLTERRA_REFERENCE.gamma,
    source: "arXiv:2001.04385 §3, Lotka-Volterra example",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_parameters_positive() {
        let p = LOTKA_VOLTERRA_REFERENCE;
        for v in [p.alpha, p.beta, p.gamma, p.delta] {
            assert!(v > 0.0 && v.is_finite());
        }
    }

    #[test]
    fn recovery_targets_track_parameters() {
        assert!((TRUE_BETA.value - 0.9).abs() < f64::EPSILON);
        assert!((TRUE_GAMMA.value - 0.8).abs() < f64::EPSILON);
        assert!(!TRUE_BETA.source.is_empty());
    }

    #[test]
    fn reference_grid_is_31_samples() {
        let n = ((REFERENCE_T_END - REFERENCE_T0) / REFERENCE_SAVE_DT).round() as usize + 1;
        assert_eq!(n, 31);
    }
}
