// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime discovery of the checkpoint directory.
//!
//! No hardcoded absolute paths. Discovery order:
//!
//! 1. Injected override (tests, `--checkpoint-dir=`)
//! 2. Environment variable (`UDE_CHECKPOINT_DIR`)
//! 3. `CARGO_MANIFEST_DIR` parent joined with [`paths::CHECKPOINTS`]

use std::path::{Path, PathBuf};

use crate::checkpoint::Checkpoint;

/// Environment variable naming the checkpoint directory.
pub const CHECKPOINT_DIR_ENV: &str = "UDE_CHECKPOINT_DIR";

/// Well-known subdirectories of the workspace root.
pub mod paths {
    /// Trained-parameter checkpoints
    pub const CHECKPOINTS: &str = "checkpoints";
}

/// Workspace root in the development layout (parent of the crate manifest).
#[must_use]
pub fn workspace_root() -> PathBuf {
    let manifest_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_root
        .parent()
        .map_or_else(|| manifest_root.clone(), Path::to_path_buf)
}

/// Checkpoint directory from the environment, else the workspace default.
#[must_use]
pub fn checkpoint_dir() -> PathBuf {
    checkpoint_dir_with_override(None)
}

/// Checkpoint directory with an optional injected override, checked before
/// the environment so tests need no global env mutation.
#[must_use]
pub fn checkpoint_dir_with_override(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    match std::env::var(CHECKPOINT_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => workspace_root().join(paths::CHECKPOINTS),
    }
}

/// Checkpoint for `experiment` in the discovered directory.
#[must_use]
pub fn checkpoint_for(experiment: &str, override_dir: Option<&Path>) -> Checkpoint {
    Checkpoint::new(checkpoint_dir_with_override(override_dir), experiment)
}
