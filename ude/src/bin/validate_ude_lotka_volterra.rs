// SPDX-License-Identifier: AGPL-3.0-only

//! Validate the UDE → SINDy pipeline on the reference Lotka-Volterra run.
//!
//! Usage:
//!   `validate_ude_lotka_volterra [--config=<path.json>] [--retrain] [--checkpoint-dir=<dir>]`
//!
//! Checks (exit 0 when all pass, 1 otherwise):
//!   - known-term-only hybrid ≡ ground truth with β = γ = 0
//!   - final training loss below the acceptance threshold
//!   - trained hybrid vs ground truth, L2
//!   - recovered β̂, γ̂ against the true interaction coefficients
//!   - symbolic hybrid vs ground truth, L2 and L∞

use std::path::PathBuf;

use ude_sindy::config::ExperimentConfig;
use ude_sindy::lotka_volterra::{simulate_hybrid, simulate_reference, LotkaVolterraParams};
use ude_sindy::network::ZeroResidual;
use ude_sindy::pipeline::{self, PipelineOptions, PipelineReport};
use ude_sindy::provenance::{TRUE_BETA, TRUE_GAMMA};
use ude_sindy::tolerances;
use ude_sindy::validation::ValidationHarness;

struct CliArgs {
    config: Option<PathBuf>,
    retrain: bool,
    checkpoint_dir: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut config = None;
    let mut retrain = false;
    let mut checkpoint_dir = None;
    for arg in std::env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(val));
        } else if let Some(val) = arg.strip_prefix("--checkpoint-dir=") {
            checkpoint_dir = Some(PathBuf::from(val));
        } else if arg == "--retrain" {
            retrain = true;
        } else {
            tracing::warn!(arg, "ignoring unknown argument");
        }
    }
    CliArgs {
        config,
        retrain,
        checkpoint_dir,
    }
}

fn check_zero_residual(harness: &mut ValidationHarness, config: &ExperimentConfig) {
    let known_only = LotkaVolterraParams {
        beta: 0.0,
        gamma: 0.0,
        ..config.params
    };
    let times = config.times();
    let solver = config.reference_solver();
    let result = simulate_reference(&known_only, &config.u0, &times, &solver).and_then(|truth| {
        let hybrid = simulate_hybrid(&known_only, &ZeroResidual::new(2), &[], &config.u0, &times, &solver)?;
        hybrid.discrepancy(&truth)
    });
    match result {
        Ok(d) => {
            println!("  known-term-only hybrid vs ground truth: L∞ = {:.3e}", d.linf);
            harness.check_upper("zero-residual hybrid ≡ ground truth", d.linf, tolerances::EXACT_F64);
        }
        Err(e) => harness.record_error("zero-residual hybrid", &e),
    }
}

fn report_checks(harness: &mut ValidationHarness, config: &ExperimentConfig, report: &PipelineReport) {
    let history = &report.training.history;
    println!("\n── Training ──");
    println!(
        "  source: {:?}, {} recorded iterations, final loss {:.6e}",
        report.training.source,
        history.len(),
        report.training.final_loss
    );
    if let (Some(first), Some(last)) = (history.records().first(), history.records().last()) {
        println!("  loss {:.6e} → {:.6e}", first.loss, last.loss);
    }
    harness.check_upper(
        "training loss < acceptance",
        report.training.final_loss,
        config.training.acceptance_loss,
    );
    harness.check_discrepancy(
        "trained hybrid",
        &report.trained_discrepancy,
        Some(tolerances::TRAINED_TRAJECTORY_L2),
        None,
    );

    println!("\n── Sparse regression ──");
    for (pass, model) in [("pass 1", &report.broad), ("pass 2", &report.refined)] {
        println!("  {pass} ({} terms):", model.basis().len());
        println!("    dx/dt − αx = {}", model.equation_string(0));
        println!("    dy/dt + δy = {}", model.equation_string(1));
    }
    let (beta, gamma) = report.recovered;
    println!(
        "  β̂ = {beta:.6} ({}: {:.3}), γ̂ = {gamma:.6} ({}: {:.3})",
        TRUE_BETA.label, config.params.beta, TRUE_GAMMA.label, config.params.gamma
    );
    harness.check_abs("recovered β", beta, config.params.beta, tolerances::INTERACTION_COEFF_ABS);
    harness.check_abs("recovered γ", gamma, config.params.gamma, tolerances::INTERACTION_COEFF_ABS);

    println!("\n── Symbolic hybrid ──");
    println!(
        "  L2 = {:.6e}, L∞ = {:.6e}",
        report.symbolic_discrepancy.l2, report.symbolic_discrepancy.linf
    );
    harness.check_discrepancy(
        "symbolic hybrid",
        &report.symbolic_discrepancy,
        Some(tolerances::SYMBOLIC_TRAJECTORY_L2),
        Some(tolerances::SYMBOLIC_TRAJECTORY_LINF),
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("═══════════════════════════════════════════════════════════");
    println!("  UDE + SINDy: Lotka-Volterra missing-physics recovery");
    println!("  Reference: {}", TRUE_BETA.source);
    println!("═══════════════════════════════════════════════════════════\n");

    let args = parse_args();
    let mut harness = ValidationHarness::new("ude_lotka_volterra");

    let config = match &args.config {
        Some(path) => match ExperimentConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                harness.record_error("config", &e);
                harness.finish();
            }
        },
        None => ExperimentConfig::default(),
    };
    println!(
        "  experiment: {}, p = ({}, {}, {}, {}), u0 = {:?}, t ∈ [{}, {}] every {}",
        config.name,
        config.params.alpha,
        config.params.beta,
        config.params.gamma,
        config.params.delta,
        config.u0,
        config.t0,
        config.t_end,
        config.save_dt
    );

    println!("\n── Known-term-only hybrid ──");
    check_zero_residual(&mut harness, &config);

    let options = PipelineOptions {
        retrain: args.retrain,
        checkpoint_dir: args.checkpoint_dir,
    };
    match pipeline::run(&config, &options) {
        Ok(report) => report_checks(&mut harness, &config, &report),
        Err(e) => harness.record_error(&e.stage.to_string(), &e.source),
    }

    harness.finish();
}
