// ============================================================
// Layer 6 — Epoch Stats Log
// ============================================================
// Appends one JSON object per epoch to {output_dir}/log.txt.
//
// Each metric from the epoch loop is prefixed with "train_",
// then the epoch number is added:
//
//   {"epoch":0,"train_loss":0.912345,"train_lr":0.000037}
//   {"epoch":1,"train_loss":0.804112,"train_lr":0.000112}
//
// Appending (rather than rewriting) keeps the history of a
// resumed run in one file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// One line of log.txt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,

    #[serde(flatten)]
    pub stats: BTreeMap<String, f64>,
}

impl EpochRecord {
    /// Build a record from the epoch loop's averages
    pub fn from_train_stats(epoch: usize, train: &BTreeMap<String, f64>) -> Self {
        let stats = train
            .iter()
            .map(|(k, v)| (format!("train_{k}"), *v))
            .collect();
        Self { epoch, stats }
    }
}

pub struct StatsLog {
    path: PathBuf,
}

impl StatsLog {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create output dir '{}'", dir.display()))?;
        Ok(Self { path: dir.join("log.txt") })
    }

    pub fn log(&self, record: &EpochRecord) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;
        writeln!(f, "{}", serde_json::to_string(record)?)?;

        tracing::debug!("Logged epoch {} stats to '{}'", record.epoch, self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
