// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: checkpoint persistence and discovery.

use std::fs;

use ude_sindy::checkpoint::Checkpoint;
use ude_sindy::discovery;
use ude_sindy::network::{Activation, Mlp, ResidualModel};

#[test]
fn network_parameters_round_trip_bit_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mlp = Mlp::new(&[2, 32, 32, 2], Activation::Tanh).expect("mlp");
    let mut theta = mlp.initial_params(5443);
    theta[0] = 0.1 + 0.2;
    theta[1] = f64::MIN_POSITIVE;
    theta[2] = -1.0 / 3.0;
    theta[3] = 1e300;

    let ckpt = Checkpoint::new(dir.path(), "round_trip");
    ckpt.save(&theta).expect("save");
    let back = ckpt.load().expect("load");
    assert_eq!(back.len(), theta.len());
    for (a, b) in theta.iter().zip(&back) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn checkpoint_lives_under_override_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ckpt = discovery::checkpoint_for("lotka_volterra_ude", Some(dir.path()));
    assert_eq!(ckpt.path(), dir.path().join("lotka_volterra_ude.json"));
    assert!(!ckpt.exists());
    ckpt.save(&[1.0, 2.0]).expect("save");
    assert!(ckpt.exists());
    assert!(!dir.path().join("lotka_volterra_ude.json.tmp").exists());
}

#[test]
fn save_overwrites_previous_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ckpt = Checkpoint::new(dir.path(), "overwrite");
    ckpt.save(&[1.0, 2.0, 3.0]).expect("first");
    ckpt.save(&[4.0]).expect("second");
    assert_eq!(ckpt.load().expect("load"), vec![4.0]);
}

#[test]
fn truncated_file_is_checkpoint_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ckpt = Checkpoint::new(dir.path(), "truncated");
    ckpt.save(&[1.0, 2.0]).expect("save");
    let text = fs::read_to_string(ckpt.path()).expect("read");
    fs::write(ckpt.path(), &text[..text.len() / 2]).expect("truncate");
    let err = ckpt.load().unwrap_err();
    assert_eq!(err.kind(), "CheckpointIOError");
}
