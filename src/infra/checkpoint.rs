// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores MAE weights using Burn's CompactRecorder.
//
// Files in the output directory:
//   checkpoint-{epoch}.mpk.gz  ← model weights after that epoch
//   latest_epoch.json          ← epoch of the newest checkpoint
//   pretrain_config.json       ← the run's PretrainConfig
//
// Resuming reads latest_epoch.json, loads those weights into a
// freshly initialised model, and training continues at the
// following epoch. Optimizer moments are not saved, so AdamW
// warms its statistics up again after a resume.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::ml::model::MaskedAutoencoder;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Save model weights for `epoch` and point latest_epoch.json at them.
    pub fn save_model<B: Backend>(
        &self,
        model: &MaskedAutoencoder<B>,
        epoch: usize,
    ) -> Result<()> {
        // recorder appends the extension
        let path = self.dir.join(format!("checkpoint-{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", path.display())
            })?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::info!("Saved checkpoint for epoch {} to '{}'", epoch, path.display());
        Ok(())
    }

    /// Load the newest checkpoint into `model`.
    /// Returns the restored model and the epoch it was saved after.
    pub fn load_latest<B: Backend>(
        &self,
        model:  MaskedAutoencoder<B>,
        device: &B::Device,
    ) -> Result<(MaskedAutoencoder<B>, usize)> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("checkpoint-{epoch}"));

        tracing::info!("Resuming from checkpoint of epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'", path.display())
            })?;

        Ok((model.load_record(record), epoch))
    }

    /// True once at least one checkpoint has been written.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join("latest_epoch.json").exists()
    }

    pub fn save_config(&self, cfg: &PretrainConfig) -> Result<()> {
        let path = self.dir.join("pretrain_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| {
                format!("Cannot write config to '{}'", path.display())
            })?;

        tracing::debug!("Saved pretraining config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<PretrainConfig> {
        let path = self.dir.join("pretrain_config.json");

        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!("Cannot read config from '{}'", path.display())
            })?;

        Ok(serde_json::from_str(&json)?)
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");

        let s = fs::read_to_string(&path)
            .with_context(|| {
                format!("Cannot find '{}'. Nothing to resume from.", path.display())
            })?;

        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
