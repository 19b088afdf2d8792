// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `pretrain` and `preview`, and
// all their configurable flags.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::preview_use_case::PreviewConfig;
use crate::application::pretrain_use_case::PretrainConfig;
use crate::ml::trainer::BackendKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain the masked autoencoder on clips tiled into frame grids
    Pretrain(PretrainArgs),

    /// Write one clip as the grid image the model sees
    Preview(PreviewArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendArg {
    Wgpu,
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

#[derive(Args, Debug)]
pub struct PretrainArgs {
    /// Root of pre-extracted frames: <root>/<class>/<clip>/<frame>.jpg.
    /// Omit to train on synthetic clips.
    #[arg(long)]
    pub data_path: Option<String>,

    /// Synthetic clips per epoch when no data path is given
    #[arg(long, default_value_t = 256)]
    pub synthetic_clips: usize,

    /// Where checkpoints, log.txt and pretrain_config.json go
    #[arg(long, default_value = "output_dir")]
    pub output_dir: String,

    /// Where scalars and reconstruction images go
    #[arg(long)]
    pub log_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Side length of every frame after resizing
    #[arg(long, default_value_t = 32)]
    pub frame_size: usize,

    /// Frames per clip are grid_size²
    #[arg(long, default_value_t = 4)]
    pub grid_size: usize,

    #[arg(long, default_value_t = 16)]
    pub patch_size: usize,

    /// Clips per batch, per worker
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 400)]
    pub epochs: usize,

    /// Accumulate gradients over this many batches before stepping
    #[arg(long, default_value_t = 1)]
    pub accum_iter: usize,

    /// Fraction of patches hidden from the encoder
    #[arg(long, default_value_t = 0.75)]
    pub mask_ratio: f64,

    /// Normalise each target patch by its own mean / std
    #[arg(long)]
    pub norm_pix_loss: bool,

    #[arg(long, default_value_t = 192)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 12)]
    pub depth: usize,

    #[arg(long, default_value_t = 3)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 128)]
    pub decoder_embed_dim: usize,

    #[arg(long, default_value_t = 4)]
    pub decoder_depth: usize,

    #[arg(long, default_value_t = 4)]
    pub decoder_num_heads: usize,

    #[arg(long, default_value_t = 0.05)]
    pub weight_decay: f64,

    /// Absolute learning rate; overrides --blr
    #[arg(long)]
    pub lr: Option<f64>,

    /// Base learning rate: lr = blr * effective batch size / 256
    #[arg(long, default_value_t = 1e-3)]
    pub blr: f64,

    /// Floor of the cosine schedule
    #[arg(long, default_value_t = 0.0)]
    pub min_lr: f64,

    #[arg(long, default_value_t = 40)]
    pub warmup_epochs: usize,

    /// Clip gradients to this global L2 norm
    #[arg(long)]
    pub clip_grad: Option<f32>,

    /// Log a reconstruction every N steps (0 disables)
    #[arg(long, default_value_t = 250)]
    pub vis_every: usize,

    #[arg(long, default_value_t = 20)]
    pub print_freq: usize,

    /// Checkpoint every N epochs; the last epoch is always saved
    #[arg(long, default_value_t = 20)]
    pub save_every: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Data-loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Continue from the newest checkpoint in output_dir
    #[arg(long)]
    pub resume: bool,
}

/// The application layer never sees clap types.
impl From<PretrainArgs> for PretrainConfig {
    fn from(a: PretrainArgs) -> Self {
        PretrainConfig {
            data_path:         a.data_path,
            synthetic_clips:   a.synthetic_clips,
            output_dir:        a.output_dir,
            log_dir:           a.log_dir,
            backend:           a.backend.into(),
            frame_size:        a.frame_size,
            grid_size:         a.grid_size,
            patch_size:        a.patch_size,
            batch_size:        a.batch_size,
            epochs:            a.epochs,
            accum_iter:        a.accum_iter,
            mask_ratio:        a.mask_ratio,
            norm_pix_loss:     a.norm_pix_loss,
            embed_dim:         a.embed_dim,
            depth:             a.depth,
            num_heads:         a.num_heads,
            decoder_embed_dim: a.decoder_embed_dim,
            decoder_depth:     a.decoder_depth,
            decoder_num_heads: a.decoder_num_heads,
            weight_decay:      a.weight_decay,
            lr:                a.lr,
            blr:               a.blr,
            min_lr:            a.min_lr,
            warmup_epochs:     a.warmup_epochs,
            clip_grad:         a.clip_grad,
            vis_every:         a.vis_every,
            print_freq:        a.print_freq,
            save_every:        a.save_every,
            seed:              a.seed,
            num_workers:       a.num_workers,
            resume:            a.resume,
        }
    }
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Same layout as `pretrain --data-path`; omit for a synthetic clip
    #[arg(long)]
    pub data_path: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub clip_index: usize,

    #[arg(long, default_value_t = 32)]
    pub frame_size: usize,

    #[arg(long, default_value_t = 4)]
    pub grid_size: usize,

    #[arg(long, default_value = "grid_preview.png")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl From<PreviewArgs> for PreviewConfig {
    fn from(a: PreviewArgs) -> Self {
        PreviewConfig {
            data_path:  a.data_path,
            clip_index: a.clip_index,
            frame_size: a.frame_size,
            grid_size:  a.grid_size,
            output:     a.output,
            seed:       a.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_pretrain_defaults_match_config_defaults() {
        let cli = TestCli::parse_from(["grid-mae", "pretrain"]);
        let Commands::Pretrain(args) = cli.command else { panic!("expected pretrain") };
        let cfg: PretrainConfig = args.into();
        let def = PretrainConfig::default();
        assert_eq!(cfg.epochs, def.epochs);
        assert_eq!(cfg.mask_ratio, def.mask_ratio);
        assert_eq!(cfg.grid_size, def.grid_size);
        assert_eq!(cfg.vis_every, def.vis_every);
        assert!(cfg.lr.is_none());
    }

    #[test]
    fn test_pretrain_flags() {
        let cli = TestCli::parse_from([
            "grid-mae", "pretrain",
            "--backend", "ndarray", "--accum-iter", "4", "--lr", "0.0002", "--resume",
        ]);
        let Commands::Pretrain(args) = cli.command else { panic!("expected pretrain") };
        let cfg: PretrainConfig = args.into();
        assert_eq!(cfg.backend, BackendKind::NdArray);
        assert_eq!(cfg.accum_iter, 4);
        assert_eq!(cfg.lr, Some(2e-4));
        assert!(cfg.resume);
    }

    #[test]
    fn test_preview_args() {
        let cli = TestCli::parse_from(["grid-mae", "preview", "--clip-index", "3", "--output", "x.png"]);
        let Commands::Preview(args) = cli.command else { panic!("expected preview") };
        let cfg: PreviewConfig = args.into();
        assert_eq!(cfg.clip_index, 3);
        assert_eq!(cfg.output, PathBuf::from("x.png"));
    }
}
