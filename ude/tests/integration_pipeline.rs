// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: staged UDE → SINDy pipeline public API.
//!
//! The end-to-end run trains a 1 218-parameter network and is ignored by
//! default; run it with `cargo test --release -- --ignored`.

use ude_sindy::assemble::recovered_interaction;
use ude_sindy::config::{ExperimentConfig, NetworkConfig};
use ude_sindy::optimize::{AdamConfig, BfgsConfig};
use ude_sindy::pipeline::{
    generate_data, regress_broad, regress_refined, run, PipelineOptions, RegressionData, Stage,
};
use ude_sindy::provenance::LOTKA_VOLTERRA_REFERENCE;
use ude_sindy::sindy::refine;
use ude_sindy::tolerances;
use ude_sindy::trainer::{ParamSource, TrainSchedule};

fn interaction_samples(cfg: &ExperimentConfig) -> RegressionData {
    let data = generate_data(cfg).expect("data");
    let p = LOTKA_VOLTERRA_REFERENCE;
    let inputs = data.truth.states().to_vec();
    let outputs = inputs
        .iter()
        .enumerate()
        .map(|(i, u)| {
            let wobble = 1e-4 * (0.7 * i as f64).sin();
            let [gx, gy] = p.interaction(u);
            vec![gx + wobble, gy - wobble]
        })
        .collect();
    RegressionData { inputs, outputs }
}

#[test]
fn refined_regression_is_idempotent() {
    let cfg = ExperimentConfig::default();
    let samples = interaction_samples(&cfg);
    let broad = regress_broad(&cfg, &samples).expect("pass 1");
    let first = regress_refined(&cfg, &samples, &broad).expect("pass 2");
    let second = regress_refined(&cfg, &samples, &broad).expect("pass 2 again");
    assert_eq!(first, second);

    let sindy = &cfg.sindy;
    let again = refine(
        &samples.inputs,
        &samples.outputs,
        &first.structural_form(),
        &[sindy.refine_threshold],
        &sindy.refine_optimizer,
        &sindy.objective,
        &sindy.refine_options,
    )
    .expect("refine on own form");
    assert_eq!(again.structural_form(), first.structural_form());

    let (beta, gamma) = recovered_interaction(&first).expect("coefficients");
    assert!((beta - LOTKA_VOLTERRA_REFERENCE.beta).abs() < 1e-3, "β̂ = {beta}");
    assert!((gamma - LOTKA_VOLTERRA_REFERENCE.gamma).abs() < 1e-3, "γ̂ = {gamma}");
}

#[test]
fn invalid_config_fails_in_first_stage() {
    let cfg = ExperimentConfig {
        u0: vec![1.0],
        ..ExperimentConfig::default()
    };
    let err = run(&cfg, &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.stage, Stage::GenerateData);
    assert_eq!(err.source.kind(), "InvalidInput");
}

#[test]
fn unreachable_acceptance_fails_training_without_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = ExperimentConfig {
        name: "unreachable".to_string(),
        network: NetworkConfig {
            widths: vec![2, 4, 2],
            ..NetworkConfig::default()
        },
        training: TrainSchedule {
            adam: AdamConfig {
                iterations: 3,
                ..AdamConfig::default()
            },
            bfgs: BfgsConfig {
                max_iter: 2,
                ..BfgsConfig::default()
            },
            acceptance_loss: 1e-300,
            ..TrainSchedule::default()
        },
        ..ExperimentConfig::default()
    };
    let opts = PipelineOptions {
        retrain: false,
        checkpoint_dir: Some(dir.path().to_path_buf()),
    };
    let err = run(&cfg, &opts).unwrap_err();
    assert_eq!(err.stage, Stage::Train);
    assert_eq!(err.source.kind(), "OptimizationDivergence");
    assert!(!dir.path().join("unreachable.json").exists());
}

#[test]
#[ignore = "trains the full network; minutes in release mode"]
fn reference_run_meets_acceptance_and_reuses_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = ExperimentConfig::default();
    let opts = PipelineOptions {
        retrain: false,
        checkpoint_dir: Some(dir.path().to_path_buf()),
    };

    let report = run(&cfg, &opts).expect("pipeline");
    assert_eq!(report.training.source, ParamSource::Trained);
    assert!(report.training.final_loss < tolerances::TRAIN_LOSS_ACCEPTANCE);
    assert!(report.trained_discrepancy.l2 < tolerances::TRAINED_TRAJECTORY_L2);
    let (beta, gamma) = report.recovered;
    assert!((beta - cfg.params.beta).abs() < tolerances::INTERACTION_COEFF_ABS, "β̂ = {beta}");
    assert!((gamma - cfg.params.gamma).abs() < tolerances::INTERACTION_COEFF_ABS, "γ̂ = {gamma}");
    assert!(report.symbolic_discrepancy.l2 < tolerances::SYMBOLIC_TRAJECTORY_L2);
    assert!(report.symbolic_discrepancy.linf < tolerances::SYMBOLIC_TRAJECTORY_LINF);

    let cached = run(&cfg, &opts).expect("cached pipeline");
    assert_eq!(cached.training.source, ParamSource::Checkpoint);
    assert!(cached.training.history.is_empty());
    assert_eq!(cached.training.params, report.training.params);
    assert_eq!(cached.refined, report.refined);
}
