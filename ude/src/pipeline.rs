// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end UDE → SINDy experiment.
//!
//! | Stage | Output |
//! |-------|--------|
//! | `generate_data` | ground truth and noisy observations |
//! | `train` | residual network parameters (trained or cached) |
//! | `regress_broad` | pass-1 sparse model over the broad basis |
//! | `regress_refined` | pass-2 model over the narrowed basis |
//! | `assemble_and_validate` | symbolic hybrid, resimulation, discrepancies |
//!
//! Each stage is a public function so tests and binaries can run a prefix of
//! the pipeline; [`run`] chains them and tags a failure with its stage.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;

use crate::assemble::{recovered_interaction, SymbolicHybrid};
use crate::checkpoint::Checkpoint;
use crate::config::ExperimentConfig;
use crate::discovery;
use crate::error::{Result, UdeError};
use crate::lotka_volterra::{simulate_hybrid, simulate_reference};
use crate::network::{Mlp, ResidualModel};
use crate::noise::add_noise;
use crate::optimize::{log_progress, Observer};
use crate::sensitivity::HybridProblem;
use crate::sindy::{refine, regress, SparseModel};
use crate::trainer::{train_or_load, CachePolicy, TrainOutcome};
use crate::trajectory::{Discrepancy, Trajectory};

/// State variable names used in every basis.
pub const STATE_VARS: [&str; 2] = ["x", "y"];

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Ground truth and noise
    GenerateData,
    /// Adam + BFGS or checkpoint
    Train,
    /// Pass-1 regression
    RegressBroad,
    /// Pass-2 regression
    RegressRefined,
    /// Symbolic resimulation and metrics
    AssembleAndValidate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GenerateData => "generate_data",
            Self::Train => "train",
            Self::RegressBroad => "regress_broad",
            Self::RegressRefined => "regress_refined",
            Self::AssembleAndValidate => "assemble_and_validate",
        })
    }
}

/// A stage failure.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {source}")]
pub struct PipelineError {
    /// Where the run stopped
    pub stage: Stage,
    /// Why
    #[source]
    pub source: UdeError,
}

trait StageContext<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageContext<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|source| PipelineError { stage, source })
    }
}

/// Run-time switches not part of the experiment definition.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Ignore an existing checkpoint and overwrite it
    pub retrain: bool,
    /// Checkpoint directory; discovered when `None`
    pub checkpoint_dir: Option<PathBuf>,
}

impl PipelineOptions {
    /// Cache policy implied by `retrain`.
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        if self.retrain {
            CachePolicy::Retrain
        } else {
            CachePolicy::ReuseIfPresent
        }
    }
}

/// Ground truth and its noisy observation on a shared time grid.
#[derive(Debug, Clone)]
pub struct GeneratedData {
    /// Noise-free reference solution
    pub truth: Trajectory,
    /// Observations used for training
    pub noisy: Trajectory,
}

/// State samples and network outputs fed to both regression passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionData {
    /// `X̂`: trained hybrid states
    pub inputs: Vec<Vec<f64>>,
    /// `Ŷ = g(X̂; θ)`
    pub outputs: Vec<Vec<f64>>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Ground truth and observations
    pub data: GeneratedData,
    /// Parameters, loss history and their source
    pub training: TrainOutcome,
    /// Hybrid with the trained network, resimulated
    pub trained: Trajectory,
    /// `trained` against the ground truth
    pub trained_discrepancy: Discrepancy,
    /// Pass-1 model
    pub broad: SparseModel,
    /// Pass-2 model
    pub refined: SparseModel,
    /// Recovered `(β̂, γ̂)` from the pass-2 model
    pub recovered: (f64, f64),
    /// Symbolic hybrid, resimulated
    pub symbolic: Trajectory,
    /// `symbolic` against the ground truth
    pub symbolic_discrepancy: Discrepancy,
}

/// Simulate the ground truth and add observation noise.
///
/// # Errors
///
/// `NumericalDivergence` from the solver; `InvalidInput` from the noise model.
pub fn generate_data(config: &ExperimentConfig) -> Result<GeneratedData> {
    let times = config.times();
    let truth = simulate_reference(&config.params, &config.u0, &times, &config.reference_solver())?;
    let noisy = add_noise(&truth, config.noise, config.seed)?;
    tracing::info!(
        samples = truth.len(),
        t_end = config.t_end,
        noise = ?config.noise,
        seed = config.seed,
        "data generated"
    );
    Ok(GeneratedData { truth, noisy })
}

/// Fit the residual network to the observations, or load it from
/// `checkpoint` when the policy allows.
///
/// # Errors
///
/// As [`train_or_load`].
pub fn train(
    config: &ExperimentConfig,
    model: &Mlp,
    data: &GeneratedData,
    checkpoint: &Checkpoint,
    policy: CachePolicy,
    observer: &mut Observer<'_>,
) -> Result<TrainOutcome> {
    let problem = HybridProblem::new(
        config.params,
        model,
        &config.u0,
        &data.noisy,
        config.training_solver(),
    )?;
    let theta0 = model.initial_params(config.network.init_seed);
    tracing::info!(
        n_params = theta0.len(),
        widths = ?model.widths(),
        checkpoint = %checkpoint.path().display(),
        ?policy,
        "training start"
    );
    let outcome = train_or_load(checkpoint, policy, &problem, &theta0, &config.training, observer)?;
    tracing::info!(
        loss = outcome.final_loss,
        source = ?outcome.source,
        iterations = outcome.history.len(),
        "training done"
    );
    Ok(outcome)
}

/// Resimulate the trained hybrid on the ground-truth grid.
///
/// # Errors
///
/// `NumericalDivergence` from the solver.
pub fn resimulate_trained(
    config: &ExperimentConfig,
    model: &Mlp,
    theta: &[f64],
    truth: &Trajectory,
) -> Result<Trajectory> {
    simulate_hybrid(
        &config.params,
        model,
        theta,
        &config.u0,
        truth.times(),
        &config.reference_solver(),
    )
}

/// Pair each state of `trajectory` with the network output there.
#[must_use]
pub fn network_samples<M: ResidualModel + ?Sized>(
    model: &M,
    theta: &[f64],
    trajectory: &Trajectory,
) -> RegressionData {
    let inputs = trajectory.states().to_vec();
    let outputs = inputs
        .iter()
        .map(|x| {
            let mut g = vec![0.0; model.state_dim()];
            model.eval(x, theta, &mut g);
            g
        })
        .collect();
    RegressionData { inputs, outputs }
}

/// Pass 1: sweep the broad basis.
///
/// # Errors
///
/// As [`regress`].
pub fn regress_broad(config: &ExperimentConfig, samples: &RegressionData) -> Result<SparseModel> {
    let sindy = &config.sindy;
    let basis = sindy.broad_basis(&STATE_VARS);
    let thresholds = sindy.sweep.thresholds();
    tracing::info!(
        terms = basis.len(),
        thresholds = thresholds.len(),
        optimizer = ?sindy.broad_optimizer,
        "regression pass 1"
    );
    regress(
        &samples.inputs,
        &samples.outputs,
        &basis,
        &thresholds,
        &sindy.broad_optimizer,
        &sindy.objective,
        &sindy.broad_options,
    )
}

/// Pass 2: refit on the terms active anywhere in `broad`.
///
/// # Errors
///
/// As [`refine`]; `InvalidInput` if `broad` has no active term.
pub fn regress_refined(
    config: &ExperimentConfig,
    samples: &RegressionData,
    broad: &SparseModel,
) -> Result<SparseModel> {
    let sindy = &config.sindy;
    let form = broad.structural_form();
    tracing::info!(terms = ?form.names(), threshold = sindy.refine_threshold, "regression pass 2");
    refine(
        &samples.inputs,
        &samples.outputs,
        &form,
        &[sindy.refine_threshold],
        &sindy.refine_optimizer,
        &sindy.objective,
        &sindy.refine_options,
    )
}

/// Substitute `refined` for the network, resimulate with the ground-truth
/// solver settings and measure the discrepancy.
///
/// # Errors
///
/// `InvalidInput` for a malformed model; `NumericalDivergence` from the
/// solver.
pub fn assemble_and_validate(
    config: &ExperimentConfig,
    refined: &SparseModel,
    truth: &Trajectory,
) -> Result<(Trajectory, Discrepancy)> {
    let hybrid = SymbolicHybrid::new(config.params, refined.clone())?;
    let symbolic = hybrid.simulate(&config.u0, truth.times(), &config.reference_solver())?;
    let discrepancy = symbolic.discrepancy(truth)?;
    tracing::info!(
        l2 = discrepancy.l2,
        linf = discrepancy.linf,
        "symbolic hybrid resimulated"
    );
    Ok((symbolic, discrepancy))
}

/// Run every stage with the progress logger as observer.
///
/// # Errors
///
/// The first failing stage and its error.
pub fn run(
    config: &ExperimentConfig,
    options: &PipelineOptions,
) -> std::result::Result<PipelineReport, PipelineError> {
    let mut observer = log_progress;
    run_with_observer(config, options, &mut observer)
}

/// As [`run`] with a caller-supplied training observer.
///
/// # Errors
///
/// The first failing stage and its error.
pub fn run_with_observer(
    config: &ExperimentConfig,
    options: &PipelineOptions,
    observer: &mut Observer<'_>,
) -> std::result::Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    config.validate().at(Stage::GenerateData)?;
    let data = generate_data(config).at(Stage::GenerateData)?;

    let model = config.network.build().at(Stage::Train)?;
    let checkpoint = discovery::checkpoint_for(&config.name, options.checkpoint_dir.as_deref());
    let training = train(
        config,
        &model,
        &data,
        &checkpoint,
        options.cache_policy(),
        observer,
    )
    .at(Stage::Train)?;
    let trained = resimulate_trained(config, &model, &training.params, &data.truth).at(Stage::Train)?;
    let trained_discrepancy = trained.discrepancy(&data.truth).at(Stage::Train)?;
    tracing::info!(
        l2 = trained_discrepancy.l2,
        linf = trained_discrepancy.linf,
        "trained hybrid resimulated"
    );

    let samples = network_samples(&model, &training.params, &trained);
    let broad = regress_broad(config, &samples).at(Stage::RegressBroad)?;
    let refined = regress_refined(config, &samples, &broad).at(Stage::RegressRefined)?;
    let recovered = recovered_interaction(&refined).at(Stage::RegressRefined)?;
    tracing::info!(beta = recovered.0, gamma = recovered.1, "interaction recovered");

    let (symbolic, symbolic_discrepancy) =
        assemble_and_validate(config, &refined, &data.truth).at(Stage::AssembleAndValidate)?;

    tracing::info!(
        elapsed_s = start.elapsed().as_secs_f64(),
        "pipeline complete"
    );
    Ok(PipelineReport {
        data,
        training,
        trained,
        trained_discrepancy,
        broad,
        refined,
        recovered,
        symbolic,
        symbolic_discrepancy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Activation;
    use crate::provenance::LOTKA_VOLTERRA_REFERENCE;
    use crate::sindy::Term;

    #[test]
    fn generated_data_shares_grid() {
        let cfg = ExperimentConfig::default();
        let data = generate_data(&cfg).expect("data");
        assert_eq!(data.truth.len(), 31);
        assert_eq!(data.truth.times(), data.noisy.times());
        assert!(data.truth.discrepancy(&data.noisy).expect("d").linf < 1e-2);
    }

    #[test]
    fn network_samples_pair_states_with_outputs() {
        let mlp = Mlp::new(&[2, 4, 2], Activation::Tanh).expect("mlp");
        let theta = mlp.initial_params(1);
        let data = generate_data(&ExperimentConfig::default()).expect("data");
        let s = network_samples(&mlp, &theta, &data.truth);
        assert_eq!(s.inputs.len(), data.truth.len());
        let mut g = [0.0; 2];
        mlp.eval(&s.inputs[5], &theta, &mut g);
        assert_eq!(s.outputs[5], g.to_vec());
    }

    #[test]
    fn exact_interaction_samples_pass_both_regressions() {
        let cfg = ExperimentConfig::default();
        let data = generate_data(&cfg).expect("data");
        let p = LOTKA_VOLTERRA_REFERENCE;
        let samples = RegressionData {
            inputs: data.truth.states().to_vec(),
            outputs: data
                .truth
                .states()
                .iter()
                .map(|u| p.interaction(u).to_vec())
                .collect(),
        };
        let broad = regress_broad(&cfg, &samples).expect("pass 1");
        assert!(broad.structural_form().terms().contains(&Term::interaction(2)));
        let refined = regress_refined(&cfg, &samples, &broad).expect("pass 2");
        let (beta, gamma) = recovered_interaction(&refined).expect("coeffs");
        assert!((beta - p.beta).abs() < 1e-6, "β̂ = {beta}");
        assert!((gamma - p.gamma).abs() < 1e-6, "γ̂ = {gamma}");

        let (_, d) = assemble_and_validate(&cfg, &refined, &data.truth).expect("assemble");
        assert!(d.linf < 1e-4, "L∞ = {}", d.linf);
    }

    #[test]
    fn stage_tag_survives_error() {
        let cfg = ExperimentConfig {
            t_end: -1.0,
            ..ExperimentConfig::default()
        };
        let err = run(&cfg, &PipelineOptions::default()).unwrap_err();
        assert_eq!(err.stage, Stage::GenerateData);
        assert!(err.to_string().starts_with("stage generate_data failed"));
    }

    #[test]
    fn retrain_flag_selects_policy() {
        let opts = PipelineOptions {
            retrain: true,
            checkpoint_dir: None,
        };
        assert_eq!(opts.cache_policy(), CachePolicy::Retrain);
        assert_eq!(
            PipelineOptions::default().cache_policy(),
            CachePolicy::ReuseIfPresent
        );
    }
}
