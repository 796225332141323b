// SPDX-License-Identifier: AGPL-3.0-only

//! Trained-parameter checkpoints.
//!
//! One JSON file per experiment, `<dir>/<experiment>.json`:
//!
//! ```json
//! { "experiment": "lotka_volterra_ude", "key": "p", "values": [ ... ] }
//! ```
//!
//! `serde_json` is built with `float_roundtrip`, so a save followed by a load
//! reproduces every parameter bit for bit. Writes go to a temporary sibling
//! that is renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, UdeError};

/// Key under which the parameter vector is stored.
pub const PARAMS_KEY: &str = "p";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    experiment: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    values: Option<Vec<f64>>,
}

/// Handle to one experiment's checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    experiment: String,
    path: PathBuf,
}

impl Checkpoint {
    /// Checkpoint for `experiment` inside `dir` (the directory is created on
    /// first save).
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            path: dir.as_ref().join(format!("{experiment}.json")),
        }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Whether a checkpoint file is present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `values` under [`PARAMS_KEY`].
    ///
    /// # Errors
    ///
    /// `CheckpointIo` if a value is not finite, or on any I/O or
    /// serialization failure.
    pub fn save(&self, values: &[f64]) -> Result<()> {
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(self.io_error(format!("parameter {i} is not finite ({})", values[i])));
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let file = CheckpointFile {
            experiment: self.experiment.clone(),
            key: Some(PARAMS_KEY.to_string()),
            values: Some(values.to_vec()),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| self.io_error(e))?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
            f.write_all(&json).map_err(|e| self.io_error(e))?;
            f.sync_all().map_err(|e| self.io_error(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        tracing::info!(path = %self.path.display(), n_params = values.len(), "checkpoint saved");
        Ok(())
    }

    /// Read the stored parameter vector.
    ///
    /// # Errors
    ///
    /// `CheckpointIo` if the file is missing, empty, unreadable, not valid
    /// JSON, or lacks the parameter key.
    pub fn load(&self) -> Result<Vec<f64>> {
        let bytes = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(self.io_error("empty checkpoint file"));
        }
        let file: CheckpointFile =
            serde_json::from_slice(&bytes).map_err(|e| self.io_error(format!("corrupt: {e}")))?;
        match (file.key.as_deref(), file.values) {
            (Some(PARAMS_KEY), Some(values)) => {
                if file.experiment != self.experiment {
                    tracing::warn!(
                        stored = %file.experiment,
                        expected = %self.experiment,
                        "checkpoint experiment name differs"
                    );
                }
                tracing::info!(
                    path = %self.path.display(),
                    n_params = values.len(),
                    "checkpoint loaded"
                );
                Ok(values)
            }
            _ => Err(self.io_error(format!("missing key \"{PARAMS_KEY}\""))),
        }
    }

    fn io_error(&self, reason: impl ToString) -> UdeError {
        UdeError::CheckpointIo {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
