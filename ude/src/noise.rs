// SPDX-License-Identifier: AGPL-3.0-only

//! Seeded Gaussian observation noise.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};
use crate::trajectory::Trajectory;

/// How the per-entry standard deviation is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sigma", rename_all = "snake_case")]
pub enum NoiseModel {
    /// i.i.d. `N(0, σ²)` on every entry.
    Absolute(f64),
    /// Component `j` gets `N(0, (σ·mean_j)²)`.
    MeanRelative(f64),
}

impl NoiseModel {
    /// Noise magnitude `σ`.
    #[must_use]
    pub const fn sigma(self) -> f64 {
        match self {
            Self::Absolute(s) | Self::MeanRelative(s) => s,
        }
    }
}

/// Return a noisy copy of `clean`; times and shape are preserved.
///
/// The draw order is sample-major, component-minor, so a given seed always
/// produces the same perturbation for the same shape.
///
/// # Errors
///
/// `InvalidInput` if `σ` is negative or not finite.
pub fn add_noise(clean: &Trajectory, model: NoiseModel, seed: u64) -> Result<Trajectory> {
    let sigma = model.sigma();
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(UdeError::InvalidInput(format!(
            "noise magnitude must be finite and ≥ 0, got {sigma}"
        )));
    }
    let scales: Vec<f64> = match model {
        NoiseModel::Absolute(s) => vec![s; clean.dim()],
        NoiseModel::MeanRelative(s) => clean.component_means().iter().map(|m| s * m).collect(),
    };
    let standard = Normal::new(0.0, 1.0)
        .map_err(|e| UdeError::InvalidInput(format!("standard normal: {e}")))?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok(clean.map_entries(|j, v| scales[j].mul_add(standard.sample(&mut rng), v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lotka_volterra::simulate_reference;
    use crate::numerical::Rk45Config;
    use crate::provenance::{LOTKA_VOLTERRA_REFERENCE, REFERENCE_U0};
    use crate::trajectory::sample_times;

    fn clean() -> Trajectory {
        let times = sample_times(0.0, 3.0, 0.1);
        simulate_reference(
            &LOTKA_VOLTERRA_REFERENCE,
            &REFERENCE_U0,
            &times,
            &Rk45Config::new(1e-10, 1e-10),
        )
        .expect("reference solve")
    }

    fn mean_abs_perturbation(a: &Trajectory, b: &Trajectory) -> f64 {
        let fa = a.flatten();
        let fb = b.flatten();
        fa.iter().zip(&fb).map(|(x, y)| (x - y).abs()).sum::<f64>() / fa.len() as f64
    }

    #[test]
    fn preserves_shape_and_times() {
        let c = clean();
        let n = add_noise(&c, NoiseModel::Absolute(1e-3), 5443).expect("noise");
        assert_eq!(n.len(), c.len());
        assert_eq!(n.dim(), c.dim());
        assert_eq!(n.times(), c.times());
        assert_ne!(n.states(), c.states());
    }

    #[test]
    fn identical_seed_identical_output() {
        let c = clean();
        let a = add_noise(&c, NoiseModel::Absolute(1e-3), 9).expect("noise");
        let b = add_noise(&c, NoiseModel::Absolute(1e-3), 9).expect("noise");
        assert_eq!(a, b);
        let other = add_noise(&c, NoiseModel::Absolute(1e-3), 10).expect("noise");
        assert_ne!(a, other);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let c = clean();
        let n = add_noise(&c, NoiseModel::Absolute(0.0), 1).expect("noise");
        assert_eq!(n, c);
    }

    #[test]
    fn perturbation_scales_linearly_with_sigma() {
        // Same seed ⇒ same standard-normal draws, so the ratio is exact.
        let c = clean();
        let small = add_noise(&c, NoiseModel::Absolute(1e-3), 42).expect("noise");
        let large = add_noise(&c, NoiseModel::Absolute(1e-2), 42).expect("noise");
        let ratio = mean_abs_perturbation(&c, &large) / mean_abs_perturbation(&c, &small);
        assert!((ratio - 10.0).abs() < 1e-6, "ratio = {ratio}");
    }

    #[test]
    fn perturbation_magnitude_matches_gaussian_expectation() {
        // E|N(0, σ²)| = σ √(2/π); averaged over many seeds.
        let c = clean();
        let sigma = 1e-2;
        let mut total = 0.0;
        let seeds = 200;
        for seed in 0..seeds {
            let n = add_noise(&c, NoiseModel::Absolute(sigma), seed).expect("noise");
            total += mean_abs_perturbation(&c, &n);
        }
        let mean = total / seeds as f64;
        let expected = sigma * (2.0 / std::f64::consts::PI).sqrt();
        assert!((mean - expected).abs() / expected < 0.05, "mean = {mean}");
    }

    #[test]
    fn mean_relative_scales_per_component() {
        let c = clean();
        let n = add_noise(&c, NoiseModel::MeanRelative(0.0), 3).expect("noise");
        assert_eq!(n, c);
        let n = add_noise(&c, NoiseModel::MeanRelative(5e-2), 3).expect("noise");
        assert_eq!(n.len(), c.len());
    }

    #[test]
    fn rejects_negative_sigma() {
        let c = clean();
        assert!(add_noise(&c, NoiseModel::Absolute(-1.0), 0).is_err());
        assert!(add_noise(&c, NoiseModel::MeanRelative(f64::NAN), 0).is_err());
    }
}
