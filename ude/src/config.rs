// SPDX-License-Identifier: AGPL-3.0-only

//! Experiment configuration.
//!
//! [`ExperimentConfig::default`] is the reference run; a JSON file may
//! override any subset of fields (missing fields keep their defaults).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};
use crate::lotka_volterra::{LotkaVolterraParams, STATE_DIM};
use crate::network::{Activation, Mlp};
use crate::noise::NoiseModel;
use crate::numerical::Rk45Config;
use crate::provenance;
use crate::sindy::{
    log_thresholds, Basis, RegressionOptions, SelectionObjective, Sr3Config, SparseOptimizer,
    StlsqConfig,
};
use crate::tolerances;
use crate::trainer::TrainSchedule;
use crate::trajectory::sample_times;

/// Residual network architecture and initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Layer widths, first and last equal to the state dimension
    pub widths: Vec<usize>,
    /// Hidden activation
    pub activation: Activation,
    /// Seed of the Glorot initialization
    pub init_seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            widths: vec![STATE_DIM, 32, 32, STATE_DIM],
            activation: Activation::Tanh,
            init_seed: provenance::REFERENCE_SEED,
        }
    }
}

impl NetworkConfig {
    /// Build the network.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for invalid widths.
    pub fn build(&self) -> Result<Mlp> {
        Mlp::new(&self.widths, self.activation)
    }
}

/// Threshold sweep `10^(lo_exp : step : hi_exp)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSweep {
    /// First exponent
    pub lo_exp: f64,
    /// Last exponent (inclusive)
    pub hi_exp: f64,
    /// Exponent increment
    pub step: f64,
}

impl Default for ThresholdSweep {
    fn default() -> Self {
        Self {
            lo_exp: -7.0,
            hi_exp: 3.0,
            step: 0.1,
        }
    }
}

impl ThresholdSweep {
    /// The thresholds, ascending.
    #[must_use]
    pub fn thresholds(&self) -> Vec<f64> {
        log_thresholds(self.lo_exp, self.hi_exp, self.step)
    }
}

/// Both regression passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SindyConfig {
    /// Highest total degree of the broad polynomial basis
    pub max_degree: u32,
    /// Append sin and cos of each variable to the broad basis
    pub trigonometric: bool,
    /// Pass-1 sweep
    pub sweep: ThresholdSweep,
    /// Pass-1 optimizer
    pub broad_optimizer: SparseOptimizer,
    /// Pass-1 preprocessing
    pub broad_options: RegressionOptions,
    /// Model selection for both passes
    pub objective: SelectionObjective,
    /// Pass-2 single threshold
    pub refine_threshold: f64,
    /// Pass-2 optimizer
    pub refine_optimizer: SparseOptimizer,
    /// Pass-2 preprocessing
    pub refine_options: RegressionOptions,
}

impl Default for SindyConfig {
    fn default() -> Self {
        Self {
            max_degree: 5,
            trigonometric: true,
            sweep: ThresholdSweep::default(),
            broad_optimizer: SparseOptimizer::Sr3(Sr3Config::default()),
            broad_options: RegressionOptions {
                normalize: true,
                denoise: true,
            },
            objective: SelectionObjective::default(),
            refine_threshold: 0.01,
            refine_optimizer: SparseOptimizer::Stlsq(StlsqConfig::default()),
            refine_options: RegressionOptions::default(),
        }
    }
}

impl SindyConfig {
    /// Pass-1 basis over `vars`.
    #[must_use]
    pub fn broad_basis(&self, vars: &[&str]) -> Basis {
        let basis = Basis::polynomial(vars, self.max_degree);
        if self.trigonometric {
            basis.with_trigonometric()
        } else {
            basis
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Names the checkpoint file
    pub name: String,
    /// Ground-truth parameters
    pub params: LotkaVolterraParams,
    /// Initial state
    pub u0: Vec<f64>,
    /// Start time
    pub t0: f64,
    /// End time (inclusive)
    pub t_end: f64,
    /// Sample spacing
    pub save_dt: f64,
    /// Ground-truth solver relative tolerance
    pub reference_rtol: f64,
    /// Ground-truth solver absolute tolerance
    pub reference_atol: f64,
    /// Training and resimulation relative tolerance
    pub training_rtol: f64,
    /// Training and resimulation absolute tolerance
    pub training_atol: f64,
    /// Observation noise
    pub noise: NoiseModel,
    /// Noise seed
    pub seed: u64,
    /// Residual network
    pub network: NetworkConfig,
    /// Optimizer phases and acceptance
    pub training: TrainSchedule,
    /// Symbolic regression
    pub sindy: SindyConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "lotka_volterra_ude".to_string(),
            params: provenance::LOTKA_VOLTERRA_REFERENCE,
            u0: provenance::REFERENCE_U0.to_vec(),
            t0: provenance::REFERENCE_T0,
            t_end: provenance::REFERENCE_T_END,
            save_dt: provenance::REFERENCE_SAVE_DT,
            reference_rtol: tolerances::REFERENCE_RTOL,
            reference_atol: tolerances::REFERENCE_ATOL,
            training_rtol: tolerances::TRAINING_RTOL,
            training_atol: tolerances::TRAINING_ATOL,
            noise: NoiseModel::Absolute(provenance::REFERENCE_NOISE),
            seed: provenance::REFERENCE_SEED,
            network: NetworkConfig::default(),
            training: TrainSchedule::default(),
            sindy: SindyConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load from a JSON file and validate.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be opened, parsed or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config_err = |reason: String| UdeError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let file = std::fs::File::open(path).map_err(|e| config_err(e.to_string()))?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| config_err(e.to_string()))?;
        config.validate().map_err(|e| config_err(e.to_string()))?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run.
    ///
    /// # Errors
    ///
    /// `InvalidInput` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(UdeError::InvalidInput(msg));
        if self.name.trim().is_empty() {
            return invalid("experiment name is empty".into());
        }
        if self.u0.len() != STATE_DIM || self.u0.iter().any(|v| !v.is_finite()) {
            return invalid(format!("u0 must hold {STATE_DIM} finite values, got {:?}", self.u0));
        }
        if !positive(self.t_end - self.t0) || !positive(self.save_dt) {
            return invalid(format!(
                "empty time grid: t0 = {}, t_end = {}, save_dt = {}",
                self.t0, self.t_end, self.save_dt
            ));
        }
        for (field, v) in [
            ("reference_rtol", self.reference_rtol),
            ("reference_atol", self.reference_atol),
            ("training_rtol", self.training_rtol),
            ("training_atol", self.training_atol),
        ] {
            if !positive(v) {
                return invalid(format!("{field} must be positive, got {v}"));
            }
        }
        let sigma = self.noise.sigma();
        if !non_negative(sigma) {
            return invalid(format!("noise σ must be non-negative, got {sigma}"));
        }
        let w = &self.network.widths;
        if w.len() < 2 || w[0] != STATE_DIM || w[w.len() - 1] != STATE_DIM {
            return invalid(format!(
                "network widths must start and end at {STATE_DIM}, got {w:?}"
            ));
        }
        if !positive(self.training.acceptance_loss) {
            return invalid(format!(
                "acceptance loss must be positive, got {}",
                self.training.acceptance_loss
            ));
        }
        let sweep = &self.sindy.sweep;
        if !positive(sweep.step) || !non_negative(sweep.hi_exp - sweep.lo_exp) {
            return invalid(format!("threshold sweep is empty: {sweep:?}"));
        }
        if !non_negative(self.sindy.refine_threshold) {
            return invalid(format!(
                "refine threshold must be non-negative, got {}",
                self.sindy.refine_threshold
            ));
        }
        Ok(())
    }

    /// Sample times of every trajectory in the run.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        sample_times(self.t0, self.t_end, self.save_dt)
    }

    /// Solver settings for the ground truth.
    #[must_use]
    pub const fn reference_solver(&self) -> Rk45Config {
        Rk45Config::new(self.reference_rtol, self.reference_atol)
    }

    /// Solver settings inside the training loss.
    #[must_use]
    pub const fn training_solver(&self) -> Rk45Config {
        Rk45Config::new(self.training_rtol, self.training_atol)
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_is_reference_run() {
        let cfg = ExperimentConfig::default();
        cfg.validate().expect("reference config is valid");
        assert_eq!(cfg.times().len(), 31);
        assert_eq!(cfg.network.build().expect("mlp").widths(), &[2, 32, 32, 2]);
        assert_eq!(cfg.sindy.sweep.thresholds().len(), 101);
        assert_eq!(cfg.sindy.broad_basis(&["x", "y"]).len(), 25);
        assert!((cfg.sindy.refine_threshold - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.noise, NoiseModel::Absolute(1e-3));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        write!(
            file,
            r#"{{"name": "lv_small", "network": {{"widths": [2, 8, 2], "activation": "rbf"}},
               "training": {{"adam": {{"iterations": 50}}}}}}"#
        )
        .expect("write");
        let cfg = ExperimentConfig::from_json_file(file.path()).expect("load");
        assert_eq!(cfg.name, "lv_small");
        assert_eq!(cfg.network.widths, vec![2, 8, 2]);
        assert_eq!(cfg.network.activation, Activation::Rbf);
        assert_eq!(cfg.network.init_seed, provenance::REFERENCE_SEED);
        assert_eq!(cfg.training.adam.iterations, 50);
        assert!((cfg.training.adam.learning_rate - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.sindy, SindyConfig::default());
    }

    #[test]
    fn bad_widths_are_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        write!(file, r#"{{"network": {{"widths": [3, 8, 2]}}}}"#).expect("write");
        let err = ExperimentConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), "Config");
        assert!(err.to_string().contains("widths"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = ExperimentConfig::from_json_file(Path::new("/nonexistent/ude.json")).unwrap_err();
        assert!(matches!(err, UdeError::Config { .. }));
    }

    #[test]
    fn validate_rejects_empty_grid_and_tolerances() {
        let mut cfg = ExperimentConfig {
            t_end: 0.0,
            ..ExperimentConfig::default()
        };
        assert!(cfg.validate().is_err());
        cfg.t_end = 3.0;
        cfg.training_atol = 0.0;
        assert!(cfg.validate().is_err());
        cfg.training_atol = 1e-6;
        cfg.noise = NoiseModel::Absolute(-1.0);
        assert!(cfg.validate().is_err());
    }
}
