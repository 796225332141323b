// SPDX-License-Identifier: AGPL-3.0-only

//! Sampled ODE trajectories and the discrepancy metrics used for acceptance.

use crate::error::{Result, UdeError};

/// Ordered `(time, state)` samples with a fixed state dimension.
///
/// Built once by the integrator or the noise generator and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
    dim: usize,
}

/// L2 (Frobenius) and L∞ (max-abs) norms of the difference of two trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discrepancy {
    /// √Σ (a − b)² over all samples and components
    pub l2: f64,
    /// max |a − b| over all samples and components
    pub linf: f64,
}

impl Trajectory {
    /// Build a trajectory from sample times and one state per time.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if lengths differ, there are no samples, or state rows
    /// have different dimensions.
    pub fn new(times: Vec<f64>, states: Vec<Vec<f64>>) -> Result<Self> {
        if times.len() != states.len() {
            return Err(UdeError::InvalidInput(format!(
                "{} sample times but {} states",
                times.len(),
                states.len()
            )));
        }
        let dim = states
            .first()
            .map(Vec::len)
            .ok_or_else(|| UdeError::InvalidInput("empty trajectory".into()))?;
        if let Some(bad) = states.iter().position(|s| s.len() != dim) {
            return Err(UdeError::InvalidInput(format!(
                "state {bad} has dimension {}, expected {dim}",
                states[bad].len()
            )));
        }
        Ok(Self { times, states, dim })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false for a constructed trajectory; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// State dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Sample times.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// All states in time order.
    #[must_use]
    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    /// State at sample `i`.
    #[must_use]
    pub fn state(&self, i: usize) -> &[f64] {
        &self.states[i]
    }

    /// Last state.
    #[must_use]
    pub fn final_state(&self) -> &[f64] {
        &self.states[self.states.len() - 1]
    }

    /// Time series of component `j`.
    #[must_use]
    pub fn component(&self, j: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[j]).collect()
    }

    /// Per-component mean over all samples.
    #[must_use]
    pub fn component_means(&self) -> Vec<f64> {
        let n = self.len() as f64;
        (0..self.dim)
            .map(|j| self.states.iter().map(|s| s[j]).sum::<f64>() / n)
            .collect()
    }

    /// Same times, states transformed entry-wise by `f(component, value)`.
    #[must_use]
    pub fn map_entries(&self, mut f: impl FnMut(usize, f64) -> f64) -> Self {
        let states = self
            .states
            .iter()
            .map(|s| s.iter().enumerate().map(|(j, &v)| f(j, v)).collect())
            .collect();
        Self {
            times: self.times.clone(),
            states,
            dim: self.dim,
        }
    }

    /// Sum of squared differences against `other` (the training loss).
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the shapes differ.
    pub fn sum_squared_error(&self, other: &Self) -> Result<f64> {
        self.check_aligned(other)?;
        Ok(self
            .states
            .iter()
            .zip(&other.states)
            .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)))
            .sum())
    }

    /// L2 and L∞ norms of `self − other`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the shapes differ.
    pub fn discrepancy(&self, other: &Self) -> Result<Discrepancy> {
        self.check_aligned(other)?;
        let mut sq = 0.0;
        let mut linf = 0.0_f64;
        for (a, b) in self.states.iter().zip(&other.states) {
            for (x, y) in a.iter().zip(b) {
                let d = x - y;
                sq += d * d;
                linf = linf.max(d.abs());
            }
        }
        Ok(Discrepancy {
            l2: sq.sqrt(),
            linf,
        })
    }

    /// Flatten into a row-major `samples × dim` vector.
    #[must_use]
    pub fn flatten(&self) -> Vec<f64> {
        self.states.iter().flatten().copied().collect()
    }

    fn check_aligned(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() || self.dim != other.dim {
            return Err(UdeError::InvalidInput(format!(
                "trajectory shapes differ: {}×{} vs {}×{}",
                self.len(),
                self.dim,
                other.len(),
                other.dim
            )));
        }
        Ok(())
    }
}

/// Evenly spaced sample times `t0, t0 + dt, …` up to and including `t_end`.
///
/// Times are computed as `t0 + i·dt` (not accumulated) so the grid carries no
/// drift; the last point is snapped to `t_end` when within `dt·1e-9`.
#[must_use]
pub fn sample_times(t0: f64, t_end: f64, dt: f64) -> Vec<f64> {
    if dt <= 0.0 || t_end < t0 {
        return vec![t0];
    }
    let n = ((t_end - t0) / dt + 1e-9).floor() as usize;
    let mut times: Vec<f64> = (0..=n).map(|i| (i as f64).mul_add(dt, t0)).collect();
    if let Some(last) = times.last_mut() {
        if (*last - t_end).abs() < dt * 1e-9 {
            *last = t_end;
        }
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point() -> Trajectory {
        Trajectory::new(vec![0.0, 1.0], vec![vec![1.0, 2.0], vec![3.0, 4.0]])
            .expect("valid trajectory")
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Trajectory::new(vec![0.0], vec![]).unwrap_err();
        assert!(matches!(err, UdeError::InvalidInput(_)));
    }

    #[test]
    fn rejects_ragged_states() {
        let err = Trajectory::new(vec![0.0, 1.0], vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.to_string().contains("dimension 1"));
    }

    #[test]
    fn component_and_means() {
        let t = two_point();
        assert_eq!(t.component(1), vec![2.0, 4.0]);
        assert_eq!(t.component_means(), vec![2.0, 3.0]);
        assert_eq!(t.final_state(), &[3.0, 4.0]);
    }

    #[test]
    fn discrepancy_norms() {
        let a = two_point();
        let b = a.map_entries(|j, v| if j == 0 { v + 3.0 } else { v - 4.0 });
        let d = a.discrepancy(&b).expect("aligned");
        assert!((d.l2 - (9.0_f64 * 2.0 + 16.0 * 2.0).sqrt()).abs() < 1e-12);
        assert!((d.linf - 4.0).abs() < 1e-12);
        assert!((a.sum_squared_error(&b).expect("aligned") - 50.0).abs() < 1e-12);
    }

    #[test]
    fn discrepancy_rejects_shape_mismatch() {
        let a = two_point();
        let b = Trajectory::new(vec![0.0], vec![vec![1.0, 2.0]]).expect("valid");
        assert!(a.discrepancy(&b).is_err());
    }

    #[test]
    fn sample_grid_matches_saveat() {
        let times = sample_times(0.0, 3.0, 0.1);
        assert_eq!(times.len(), 31);
        assert!(times[0].abs() < f64::EPSILON);
        assert!((times[30] - 3.0).abs() < f64::EPSILON);
        assert!((times[7] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn sample_grid_degenerate_dt() {
        assert_eq!(sample_times(1.0, 3.0, 0.0), vec![1.0]);
    }
}
