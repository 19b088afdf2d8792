// ============================================================
// Layer 2 — PretrainUseCase
// ============================================================
// Orchestrates a pretraining run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Open the clip source        (Layer 4 - data)
//   Step 3: Prepare the output dir      (Layer 6 - infra)
//   Step 4: Save config for later runs  (Layer 6 - infra)
//   Step 5: Run the epoch loop          (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    grid::DEFAULT_GRID_SIZE,
    loader::ClipFolder,
    preprocessor::ClipTransform,
    synthetic::SyntheticClips,
};
use crate::domain::traits::ClipSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    engine::EpochConfig,
    lr_sched::LrSchedule,
    model::MaskedAutoencoderConfig,
    trainer::{run_pretraining, BackendKind},
};

// ─── Pretraining Configuration ───────────────────────────────────────────────
// Every knob of a run. Saved next to the checkpoints as
// pretrain_config.json so a resumed run can be compared against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainConfig {
    /// Frame folders (root/class/clip/frames); None trains on synthetic clips
    pub data_path:         Option<String>,
    pub synthetic_clips:   usize,
    pub output_dir:        String,
    /// Scalars and reconstruction images; None disables them
    pub log_dir:           Option<String>,
    pub backend:           BackendKind,

    pub frame_size:        usize,
    pub grid_size:         usize,
    pub patch_size:        usize,
    pub batch_size:        usize,
    pub epochs:            usize,
    pub accum_iter:        usize,

    pub mask_ratio:        f64,
    pub norm_pix_loss:     bool,
    pub embed_dim:         usize,
    pub depth:             usize,
    pub num_heads:         usize,
    pub decoder_embed_dim: usize,
    pub decoder_depth:     usize,
    pub decoder_num_heads: usize,

    pub weight_decay:      f64,
    /// Absolute lr; when None it is derived from blr
    pub lr:                Option<f64>,
    /// lr per 256 samples of effective batch
    pub blr:               f64,
    pub min_lr:            f64,
    pub warmup_epochs:     usize,
    pub clip_grad:         Option<f32>,

    pub vis_every:         usize,
    pub print_freq:        usize,
    pub save_every:        usize,
    pub seed:              u64,
    pub num_workers:       usize,
    pub resume:            bool,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            data_path:         None,
            synthetic_clips:   256,
            output_dir:        "output_dir".to_string(),
            log_dir:           None,
            backend:           BackendKind::Wgpu,

            frame_size:        32,
            grid_size:         DEFAULT_GRID_SIZE,
            patch_size:        16,
            batch_size:        16,
            epochs:            400,
            accum_iter:        1,

            mask_ratio:        0.75,
            norm_pix_loss:     false,
            embed_dim:         192,
            depth:             12,
            num_heads:         3,
            decoder_embed_dim: 128,
            decoder_depth:     4,
            decoder_num_heads: 4,

            weight_decay:      0.05,
            lr:                None,
            blr:               1e-3,
            min_lr:            0.0,
            warmup_epochs:     40,
            clip_grad:         None,

            vis_every:         250,
            print_freq:        20,
            save_every:        20,
            seed:              0,
            num_workers:       4,
            resume:            false,
        }
    }
}

impl PretrainConfig {
    /// Side length of the grid image the model sees
    pub fn image_size(&self) -> usize {
        self.frame_size * self.grid_size
    }

    pub fn frames_per_clip(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// `lr`, or `blr · effective batch / 256`
    pub fn effective_lr(&self, world_size: usize) -> f64 {
        self.lr.unwrap_or_else(|| {
            let eff_batch_size = self.batch_size * self.accum_iter * world_size;
            self.blr * eff_batch_size as f64 / 256.0
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.accum_iter == 0 || self.epochs == 0 {
            bail!("batch_size, accum_iter and epochs must all be at least 1");
        }
        if self.grid_size == 0 || self.frame_size == 0 || self.patch_size == 0 {
            bail!("grid_size, frame_size and patch_size must all be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mask_ratio) {
            bail!("mask_ratio must be in [0, 1], got {}", self.mask_ratio);
        }
        if self.image_size() % self.patch_size != 0 {
            bail!(
                "grid image side {} is not a multiple of patch_size {}",
                self.image_size(), self.patch_size
            );
        }
        if self.embed_dim % self.num_heads != 0 {
            bail!("embed_dim {} not divisible by num_heads {}", self.embed_dim, self.num_heads);
        }
        if self.decoder_embed_dim % self.decoder_num_heads != 0 {
            bail!(
                "decoder_embed_dim {} not divisible by decoder_num_heads {}",
                self.decoder_embed_dim, self.decoder_num_heads
            );
        }
        if self.data_path.is_none() && self.synthetic_clips == 0 {
            bail!("no data_path given and synthetic_clips is 0");
        }
        Ok(())
    }

    pub fn model_config(&self) -> MaskedAutoencoderConfig {
        let side = self.image_size();
        MaskedAutoencoderConfig::new(side, side, self.patch_size, 3)
            .with_embed_dim(self.embed_dim)
            .with_depth(self.depth)
            .with_num_heads(self.num_heads)
            .with_decoder_embed_dim(self.decoder_embed_dim)
            .with_decoder_depth(self.decoder_depth)
            .with_decoder_num_heads(self.decoder_num_heads)
            .with_norm_pix_loss(self.norm_pix_loss)
    }

    pub fn epoch_config(&self, lr: f64) -> EpochConfig {
        EpochConfig {
            accum_iter: self.accum_iter,
            mask_ratio: self.mask_ratio,
            grid_size:  self.grid_size,
            vis_every:  self.vis_every,
            print_freq: self.print_freq,
            schedule:   LrSchedule {
                lr,
                min_lr:        self.min_lr,
                warmup_epochs: self.warmup_epochs as f64,
                epochs:        self.epochs as f64,
            },
        }
    }

    /// Folder-backed source when data_path is set, synthetic otherwise
    pub fn open_source(&self) -> Result<Box<dyn ClipSource>> {
        let frames = self.frames_per_clip();
        match &self.data_path {
            Some(path) => {
                let transform = ClipTransform::pretrain(self.frame_size as u32);
                let folder = ClipFolder::open(path, frames, transform)
                    .with_context(|| format!("Cannot index clips under '{path}'"))?;
                if folder.is_empty() {
                    bail!("no clip under '{path}' has {frames} frames");
                }
                Ok(Box::new(folder))
            }
            None => {
                tracing::info!("No data_path given, using {} synthetic clips", self.synthetic_clips);
                Ok(Box::new(SyntheticClips::new(
                    self.synthetic_clips, frames, self.frame_size, self.seed,
                )))
            }
        }
    }
}

// ─── PretrainUseCase ──────────────────────────────────────────────────────────
pub struct PretrainUseCase {
    config: PretrainConfig,
}

impl PretrainUseCase {
    pub fn new(config: PretrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate().context("Invalid pretraining configuration")?;

        // ── Step 2: Clip source ───────────────────────────────────────────────
        let source = cfg.open_source()?;
        tracing::info!(
            "{} clips of {} frames → {}x{} grid images",
            source.len(), cfg.frames_per_clip(), cfg.image_size(), cfg.image_size()
        );

        // ── Step 3: Output directory ──────────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(cfg.output_dir.clone())?;
        if cfg.resume && ckpt_manager.has_checkpoint() {
            check_resume_shape(cfg, &ckpt_manager)?;
        }

        // ── Step 4: Save config ───────────────────────────────────────────────
        ckpt_manager.save_config(cfg)?;

        // ── Step 5: Epoch loop ────────────────────────────────────────────────
        run_pretraining(cfg, source, ckpt_manager)
    }
}

/// Refuse to resume into a model of a different shape. An unreadable
/// saved config only skips the check.
fn check_resume_shape(cfg: &PretrainConfig, ckpt_manager: &CheckpointManager) -> Result<()> {
    match ckpt_manager.load_config() {
        Ok(previous) => {
            if previous.model_config().num_patches() != cfg.model_config().num_patches()
                || previous.embed_dim != cfg.embed_dim
            {
                bail!("Checkpoint in '{}' was trained with a different model shape", cfg.output_dir);
            }
            Ok(())
        }
        Err(e) => {
            tracing::warn!(
                "Cannot read saved config in '{}', skipping shape check: {e:#}",
                cfg.output_dir
            );
            Ok(())
        }
    }
}
