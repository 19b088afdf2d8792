// ============================================================
// Layer 5 — Pretraining Driver
// ============================================================
// Builds everything the epoch loop needs and runs it for every
// remaining epoch:
//
//   backend + seed          → model (fresh or resumed)
//   AdamW(β 0.9 / 0.95)     → AccumulatingOptimizer
//   ClipDataset + batcher   → DataLoader → LoaderSource
//   log_dir set             → FileSummaryWriter, else NullWriter
//   each epoch              → train_one_epoch, checkpoint, log.txt
//
// Training runs on Autodiff<Wgpu> or Autodiff<NdArray>; the
// loop itself is generic over the backend.

use std::time::Instant;

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    optim::AdamWConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::data::{batcher::ClipBatcher, dataset::ClipDataset, source::LoaderSource};
use crate::domain::traits::{ClipSource, ProcessGroup, SummaryWriter};
use crate::infra::{
    checkpoint::CheckpointManager,
    distributed::SingleProcess,
    metrics::format_duration,
    stats_log::{EpochRecord, StatsLog},
    writer::{FileSummaryWriter, NullWriter},
};
use crate::ml::device::BurnDevice;
use crate::ml::engine::train_one_epoch;
use crate::ml::model::MaskedAutoencoder;
use crate::ml::scaler::{AccumulatingOptimizer, GradScaler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    NdArray,
}

pub fn run_pretraining(
    cfg:          &PretrainConfig,
    source:       Box<dyn ClipSource>,
    ckpt_manager: CheckpointManager,
) -> Result<()> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<Autodiff<Wgpu>>(cfg, source, ckpt_manager, device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            train_loop::<Autodiff<NdArray>>(cfg, source, ckpt_manager, device)
        }
    }
}

fn train_loop<B: AutodiffBackend>(
    cfg:          &PretrainConfig,
    source:       Box<dyn ClipSource>,
    ckpt_manager: CheckpointManager,
    device:       B::Device,
) -> Result<()> {
    let group = SingleProcess;
    B::seed(cfg.seed + group.rank() as u64);

    // ── Build or resume model ─────────────────────────────────────────────────
    let model_cfg = cfg.model_config();
    let mut model: MaskedAutoencoder<B> = model_cfg.init(&device);
    let mut start_epoch = 0;
    if cfg.resume {
        let (restored, epoch) = ckpt_manager.load_latest(model, &device)?;
        model = restored;
        start_epoch = epoch + 1;
    }
    tracing::info!(
        "Model ready: {} patches of {}x{}, encoder depth {}, decoder depth {}",
        model_cfg.num_patches(), cfg.patch_size, cfg.patch_size,
        cfg.depth, cfg.decoder_depth,
    );

    // ── Optimizer ─────────────────────────────────────────────────────────────
    let eff_batch_size = cfg.batch_size * cfg.accum_iter * group.world_size();
    let lr = cfg.effective_lr(group.world_size());
    tracing::info!("base lr: {:.2e}", lr * 256.0 / eff_batch_size as f64);
    tracing::info!("actual lr: {:.2e}", lr);
    tracing::info!("accumulate grad iterations: {}", cfg.accum_iter);
    tracing::info!("effective batch size: {}", eff_batch_size);

    let optim_cfg = AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.95)
        .with_weight_decay(cfg.weight_decay as f32)
        .with_grad_clipping(cfg.clip_grad.map(GradientClippingConfig::Norm));
    let mut optimizer = AccumulatingOptimizer::new(optim_cfg.init(), lr);
    let mut scaler = GradScaler::new();

    // ── Data loader ───────────────────────────────────────────────────────────
    let dataset = ClipDataset::from_boxed(source);
    tracing::info!("Dataset: {} clips", dataset.clip_count());
    let mut builder = DataLoaderBuilder::new(ClipBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed);
    // zero or one worker stays on the single-threaded loader
    if cfg.num_workers > 1 {
        builder = builder.num_workers(cfg.num_workers);
    }
    let loader = builder.build(dataset);
    let batches = LoaderSource::new(loader, cfg.batch_size, cfg.num_workers);

    // ── Sinks ─────────────────────────────────────────────────────────────────
    let mut writer: Box<dyn SummaryWriter> = match &cfg.log_dir {
        Some(dir) if group.is_main_process() => Box::new(
            FileSummaryWriter::create(dir)
                .with_context(|| format!("Cannot open log dir '{dir}'"))?,
        ),
        _ => Box::new(NullWriter),
    };
    let stats_log = StatsLog::new(&cfg.output_dir)?;
    let transfer = BurnDevice::<B>::new(device);
    let epoch_cfg = cfg.epoch_config(lr);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    tracing::info!("Start training for {} epochs", cfg.epochs);
    let started = Instant::now();

    for epoch in start_epoch..cfg.epochs {
        let (trained, train_stats) = train_one_epoch(
            model,
            &batches,
            &mut optimizer,
            &transfer,
            epoch,
            &mut scaler,
            writer.as_mut(),
            &group,
            &epoch_cfg,
        )?;
        model = trained;

        let is_last = epoch + 1 == cfg.epochs;
        if cfg.save_every > 0 && (epoch % cfg.save_every == 0 || is_last) {
            ckpt_manager.save_model(&model, epoch)?;
        }

        if group.is_main_process() {
            writer.flush()?;
            stats_log.log(&EpochRecord::from_train_stats(epoch, &train_stats))?;
        }
    }

    tracing::info!(
        "Training time {}",
        format_duration(started.elapsed().as_secs_f64())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticClips;

    fn smoke_config(out: &std::path::Path) -> PretrainConfig {
        PretrainConfig {
            backend:           BackendKind::NdArray,
            output_dir:        out.join("out").to_string_lossy().into_owned(),
            log_dir:           Some(out.join("logs").to_string_lossy().into_owned()),
            frame_size:        4,
            patch_size:        4,
            batch_size:        2,
            epochs:            2,
            save_every:        1,
            num_workers:       1,
            embed_dim:         8,
            depth:             1,
            num_heads:         2,
            decoder_embed_dim: 8,
            decoder_depth:     1,
            decoder_num_heads: 2,
            vis_every:         1,
            ..PretrainConfig::default()
        }
    }

    #[test]
    fn test_two_epoch_run_writes_logs_and_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = smoke_config(tmp.path());
        let ckpt = CheckpointManager::new(cfg.output_dir.clone()).unwrap();

        run_pretraining(&cfg, Box::new(SyntheticClips::new(4, 16, 4, 0)), ckpt).unwrap();

        let out = tmp.path().join("out");
        let log = std::fs::read_to_string(out.join("log.txt")).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("\"train_loss\""));
        assert!(out.join("latest_epoch.json").exists());
        assert!(tmp.path().join("logs/scalars.jsonl").exists());
    }

    #[test]
    fn test_resume_continues_after_saved_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = smoke_config(tmp.path());
        run_pretraining(
            &cfg,
            Box::new(SyntheticClips::new(2, 16, 4, 0)),
            CheckpointManager::new(cfg.output_dir.clone()).unwrap(),
        ).unwrap();

        // saved through epoch 1; asking for 3 epochs runs only epoch 2
        let resumed = PretrainConfig { epochs: 3, resume: true, ..cfg };
        run_pretraining(
            &resumed,
            Box::new(SyntheticClips::new(2, 16, 4, 0)),
            CheckpointManager::new(resumed.output_dir.clone()).unwrap(),
        ).unwrap();

        let log = std::fs::read_to_string(tmp.path().join("out/log.txt")).unwrap();
        let epochs: Vec<usize> = log.lines()
            .map(|l| serde_json::from_str::<EpochRecord>(l).unwrap().epoch)
            .collect();
        assert_eq!(epochs, vec![0, 1, 2]);
    }
}
