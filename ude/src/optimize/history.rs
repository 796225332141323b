// SPDX-License-Identifier: AGPL-3.0-only

//! Append-only loss history spanning both optimizer phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Optimizer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// First-order warm-up
    Adam,
    /// Quasi-Newton refinement
    Bfgs,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::Bfgs => write!(f, "bfgs"),
        }
    }
}

/// One `(phase, iteration, loss)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    /// Phase that produced the entry
    pub phase: Phase,
    /// 1-based iteration within the phase
    pub iteration: usize,
    /// Loss value
    pub loss: f64,
}

/// Ordered loss records. Owned by whoever drives training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    records: Vec<LossRecord>,
}

impl LossHistory {
    /// Empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append one record.
    pub fn push(&mut self, phase: Phase, iteration: usize, loss: f64) {
        self.records.push(LossRecord {
            phase,
            iteration,
            loss,
        });
    }

    /// All records in order.
    #[must_use]
    pub fn records(&self) -> &[LossRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True before the first iteration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one phase.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &LossRecord> {
        self.records.iter().filter(move |r| r.phase == phase)
    }

    /// Most recent loss.
    #[must_use]
    pub fn last_loss(&self) -> Option<f64> {
        self.records.last().map(|r| r.loss)
    }

    /// Smallest loss seen.
    #[must_use]
    pub fn best_loss(&self) -> Option<f64> {
        self.records
            .iter()
            .map(|r| r.loss)
            .fold(None, |best, l| Some(best.map_or(l, |b: f64| b.min(l))))
    }
}
