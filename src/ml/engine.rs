// ============================================================
// Layer 5 — Pretraining Epoch
// ============================================================
// One pass over the batch stream:
//
//   for each batch (step = 0, 1, ...):
//     step % k == 0        → set lr for epoch + step / len
//     frames → device → F×F grid image
//     forward (loss, pred, mask)
//     loss not finite      → stop, NonFiniteLoss
//     backward(loss / k), step optimizer if (step + 1) % k == 0
//     record raw loss and lr, reduce loss across workers
//     step % vis_every == 0 → reconstruction | input image
//     (step + 1) % k == 0  → train_loss, lr at epoch_1000x
//
// k is accum_iter. The model is moved in and handed back with
// the epoch-global averages of every meter.

use std::collections::BTreeMap;

use burn::{prelude::*, tensor::backend::AutodiffBackend};

use crate::data::batcher::FrameBatch;
use crate::data::grid::{frames_to_grid, DEFAULT_GRID_SIZE};
use crate::data::source::BatchSource;
use crate::domain::image::ImageChw;
use crate::domain::traits::{ProcessGroup, SummaryWriter};
use crate::error::{PretrainError, PretrainResult};
use crate::infra::metrics::{MeterFormat, MetricLogger, SmoothedValue};
use crate::ml::device::DeviceTransfer;
use crate::ml::lr_sched::{adjust_learning_rate, LrSchedule};
use crate::ml::model::{MaeOutput, MaskedImageModel};
use crate::ml::scaler::{LossScaler, ParamOptimizer};

pub const RECONSTRUCTION_TAG: &str = "Example reconstruction from train set";

#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Batches per optimizer update
    pub accum_iter: usize,
    pub mask_ratio: f64,
    /// Frames per clip must equal grid_size²
    pub grid_size:  usize,
    /// Reconstruction image every this many steps; 0 disables
    pub vis_every:  usize,
    pub print_freq: usize,
    pub schedule:   LrSchedule,
}

impl EpochConfig {
    pub fn new(schedule: LrSchedule) -> Self {
        Self {
            accum_iter: 1,
            mask_ratio: 0.75,
            grid_size:  DEFAULT_GRID_SIZE,
            vis_every:  250,
            print_freq: 20,
            schedule,
        }
    }

    pub fn validate(&self) -> PretrainResult<()> {
        if self.accum_iter == 0 {
            return Err(PretrainError::InvalidConfig("accum_iter must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.mask_ratio) {
            return Err(PretrainError::InvalidConfig(format!(
                "mask_ratio must be in [0, 1], got {}", self.mask_ratio
            )));
        }
        if self.grid_size == 0 {
            return Err(PretrainError::InvalidConfig("grid_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// `epoch + step / len`
pub fn fractional_epoch(step: usize, len: usize, epoch: usize) -> f64 {
    if len == 0 {
        return epoch as f64;
    }
    step as f64 / len as f64 + epoch as f64
}

/// Scalar x-axis: fractional epoch in thousandths, so curves from
/// runs with different batch sizes line up.
pub fn epoch_1000x(step: usize, len: usize, epoch: usize) -> u64 {
    (fractional_epoch(step, len, epoch) * 1000.0).round() as u64
}

#[allow(clippy::too_many_arguments)]
pub fn train_one_epoch<B, M, O, S>(
    mut model:     M,
    data_source:   &dyn BatchSource<FrameBatch<B>>,
    optimizer:     &mut O,
    device:        &dyn DeviceTransfer<B>,
    epoch:         usize,
    scaler:        &mut S,
    writer:        &mut dyn SummaryWriter,
    process_group: &dyn ProcessGroup,
    config:        &EpochConfig,
) -> PretrainResult<(M, BTreeMap<String, f64>)>
where
    B: AutodiffBackend,
    M: MaskedImageModel<B>,
    O: ParamOptimizer<B, M>,
    S: LossScaler<B, M>,
{
    config.validate()?;

    let mut metric_logger = MetricLogger::new("  ", config.print_freq);
    metric_logger.add_meter(
        "lr",
        SmoothedValue::new(1).with_format(MeterFormat::Value { precision: 6 }),
    );
    let header = format!("Epoch: [{epoch}]");
    let accum_iter = config.accum_iter;
    let len = data_source.num_batches();

    optimizer.zero_grad();

    if let Some(dir) = writer.log_dir() {
        tracing::info!("log_dir: {}", dir.display());
    }

    for (step, batch) in data_source.iter().enumerate() {
        // per-iteration schedule, one lr per accumulation window
        if step % accum_iter == 0 {
            adjust_learning_rate(optimizer, fractional_epoch(step, len, epoch), &config.schedule);
        }

        let frames = device.transfer(batch.frames);
        let samples = frames_to_grid(frames, config.grid_size)?;

        let MaeOutput { loss, pred, .. } = model.forward_mae(samples.clone(), config.mask_ratio);

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            tracing::error!("Loss is {}, stopping training", loss_value);
            return Err(PretrainError::NonFiniteLoss { epoch, step, value: loss_value });
        }

        let update_grad = (step + 1) % accum_iter == 0;
        let loss = loss.div_scalar(accum_iter as f64);
        model = scaler.backward_step(loss, optimizer, model, update_grad);
        if update_grad {
            optimizer.zero_grad();
        }

        device.synchronize();

        metric_logger.update("loss", loss_value);
        let lr = optimizer.lr();
        metric_logger.update("lr", lr);

        let loss_value_reduce = process_group.all_reduce_mean(loss_value);

        if config.vis_every > 0 && step % config.vis_every == 0 {
            let image = reconstruction_image(&model, pred, samples)?;
            writer.add_image(RECONSTRUCTION_TAG, &image, epoch as u64)?;
        }

        if update_grad {
            let x = epoch_1000x(step, len, epoch);
            writer.add_scalar("train_loss", loss_value_reduce, x)?;
            writer.add_scalar("lr", lr, x)?;
        }

        metric_logger.log_every(step, len, &header);
    }

    // gather the stats from all processes
    metric_logger.synchronize_between_processes(process_group);
    tracing::info!("Averaged stats: {}", metric_logger);
    writer.flush()?;

    Ok((model, metric_logger.global_averages()))
}

/// Sample 0's reconstruction next to its input, joined along width:
/// `[C, H, 2W]`.
fn reconstruction_image<B, M>(
    model:   &M,
    pred:    Tensor<B, 3>,
    samples: Tensor<B, 4>,
) -> PretrainResult<ImageChw>
where
    B: AutodiffBackend,
    M: MaskedImageModel<B>,
{
    let unpatched = model.unpatchify(pred.detach()).slice([0..1]);
    let input = samples.detach().slice([0..1]);
    let combined = Tensor::cat(vec![unpatched, input], 3);

    let [_, channels, height, width] = combined.dims();
    let data = combined
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PretrainError::TensorData(format!("{e:?}")))?;

    Ok(ImageChw::new(channels, height, width, data))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::{Cell, RefCell},
        path::{Path, PathBuf},
        rc::Rc,
    };

    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::batcher::Batcher,
        module::AutodiffModule,
        optim::{AdamWConfig, GradientsParams},
    };

    use crate::data::batcher::ClipBatcher;
    use crate::data::synthetic::SyntheticClips;
    use crate::domain::traits::ClipSource;
    use crate::infra::distributed::SingleProcess;
    use crate::ml::device::BurnDevice;
    use crate::ml::model::{MaskedAutoencoder, MaskedAutoencoderConfig};
    use crate::ml::scaler::{AccumulatingOptimizer, GradScaler, LrControl};

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        SetLr(f64),
        Backward { loss: f64, update: bool },
        Step,
        ZeroGrad,
    }

    type Events = Rc<RefCell<Vec<Event>>>;

    struct RecordingOptimizer {
        lr:     f64,
        events: Events,
    }

    impl LrControl for RecordingOptimizer {
        fn lr(&self) -> f64 { self.lr }
        fn set_lr(&mut self, lr: f64) {
            self.lr = lr;
            self.events.borrow_mut().push(Event::SetLr(lr));
        }
    }

    impl<B: AutodiffBackend, M: AutodiffModule<B>> ParamOptimizer<B, M> for RecordingOptimizer {
        fn accumulate(&mut self, _model: &M, _grads: GradientsParams) {}
        fn step(&mut self, model: M) -> M {
            self.events.borrow_mut().push(Event::Step);
            model
        }
        fn zero_grad(&mut self) {
            self.events.borrow_mut().push(Event::ZeroGrad);
        }
    }

    /// Records what reaches backward; steps but never computes gradients
    struct RecordingScaler {
        events: Events,
    }

    impl<B: AutodiffBackend, M: AutodiffModule<B>> LossScaler<B, M> for RecordingScaler {
        fn backward_step<O: ParamOptimizer<B, M>>(
            &mut self,
            loss:        Tensor<B, 1>,
            optimizer:   &mut O,
            model:       M,
            update_grad: bool,
        ) -> M {
            let loss = loss.into_scalar().elem::<f64>();
            self.events.borrow_mut().push(Event::Backward { loss, update: update_grad });
            if update_grad { optimizer.step(model) } else { model }
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        dir:     PathBuf,
        scalars: Vec<(String, f64, u64)>,
        images:  Vec<(String, ImageChw, u64)>,
    }

    impl SummaryWriter for RecordingWriter {
        fn log_dir(&self) -> Option<&Path> { Some(&self.dir) }
        fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> PretrainResult<()> {
            self.scalars.push((tag.to_string(), value, step));
            Ok(())
        }
        fn add_image(&mut self, tag: &str, image: &ImageChw, step: u64) -> PretrainResult<()> {
            self.images.push((tag.to_string(), image.clone(), step));
            Ok(())
        }
    }

    struct CountingDevice {
        syncs: Cell<usize>,
    }

    impl DeviceTransfer<TestBackend> for CountingDevice {
        fn transfer(&self, frames: Tensor<TestBackend, 5>) -> Tensor<TestBackend, 5> { frames }
        fn synchronize(&self) { self.syncs.set(self.syncs.get() + 1); }
    }

    fn tiny_model() -> MaskedAutoencoder<TestBackend> {
        MaskedAutoencoderConfig::new(16, 16, 4, 3)
            .with_embed_dim(8)
            .with_depth(1)
            .with_num_heads(2)
            .with_decoder_embed_dim(8)
            .with_decoder_depth(1)
            .with_decoder_num_heads(2)
            .init(&Default::default())
    }

    /// `count` single-clip batches of 16 frames at 4×4 pixels
    fn batches(count: usize, frames: usize) -> Vec<FrameBatch<TestBackend>> {
        let src = SyntheticClips::new(count, frames, 4, 1);
        let batcher = ClipBatcher::<TestBackend>::new(Default::default());
        (0..count)
            .map(|i| batcher.batch(vec![src.load(i).unwrap()]))
            .collect()
    }

    fn config(accum_iter: usize) -> EpochConfig {
        EpochConfig {
            accum_iter,
            vis_every: 0,
            ..EpochConfig::new(LrSchedule { lr: 1e-3, min_lr: 0.0, warmup_epochs: 2.0, epochs: 10.0 })
        }
    }

    struct Harness {
        events:  Events,
        optim:   RecordingOptimizer,
        scaler:  RecordingScaler,
        writer:  RecordingWriter,
        device:  CountingDevice,
    }

    impl Harness {
        fn new() -> Self {
            let events: Events = Rc::default();
            Self {
                optim:  RecordingOptimizer { lr: 0.0, events: events.clone() },
                scaler: RecordingScaler { events: events.clone() },
                writer: RecordingWriter::default(),
                device: CountingDevice { syncs: Cell::new(0) },
                events,
            }
        }

        fn run(
            &mut self,
            data:   &Vec<FrameBatch<TestBackend>>,
            epoch:  usize,
            config: &EpochConfig,
        ) -> PretrainResult<BTreeMap<String, f64>> {
            train_one_epoch(
                tiny_model(), data, &mut self.optim, &self.device, epoch,
                &mut self.scaler, &mut self.writer, &SingleProcess, config,
            )
            .map(|(_, stats)| stats)
        }

        fn events(&self) -> Vec<Event> {
            self.events.borrow().clone()
        }
    }

    fn kind(e: &Event) -> &'static str {
        match e {
            Event::SetLr(_)                          => "lr",
            Event::Backward { update: false, .. }    => "bwd",
            Event::Backward { update: true, .. }     => "bwd+",
            Event::Step                              => "step",
            Event::ZeroGrad                          => "zero",
        }
    }

    #[test]
    fn test_accumulation_cadence() {
        let mut h = Harness::new();
        h.run(&batches(7, 16), 0, &config(3)).unwrap();

        let kinds: Vec<&str> = h.events().as_slice().iter().map(kind).collect();
        assert_eq!(kinds, vec![
            "zero",
            "lr", "bwd", "bwd", "bwd+", "step", "zero",
            "lr", "bwd", "bwd", "bwd+", "step", "zero",
            "lr", "bwd",
        ]);
        assert_eq!(h.device.syncs.get(), 7);
    }

    #[test]
    fn test_lr_follows_fractional_epoch() {
        let mut h = Harness::new();
        let cfg = config(3);
        h.run(&batches(7, 16), 2, &cfg).unwrap();

        let lrs: Vec<f64> = h.events().as_slice().iter()
            .filter_map(|e| match e { Event::SetLr(v) => Some(*v), _ => None })
            .collect();
        let expected: Vec<f64> = [0, 3, 6].iter()
            .map(|&s| cfg.schedule.lr_at(2.0 + s as f64 / 7.0))
            .collect();
        assert_eq!(lrs, expected);
    }

    #[test]
    fn test_non_finite_loss_stops_before_backward() {
        let device = Default::default();
        let frames = Tensor::<TestBackend, 5>::full([1, 16, 3, 4, 4], f32::NAN, &device);
        let labels = Tensor::<TestBackend, 1, Int>::zeros([1], &device);
        let data = vec![FrameBatch { frames, labels }];

        let mut h = Harness::new();
        let err = h.run(&data, 3, &config(1)).unwrap_err();

        assert!(matches!(err, PretrainError::NonFiniteLoss { epoch: 3, step: 0, .. }));
        let kinds: Vec<&str> = h.events().as_slice().iter().map(kind).collect();
        assert_eq!(kinds, vec!["zero", "lr"]);
    }

    #[test]
    fn test_backward_sees_normalised_loss_metrics_see_raw() {
        let mut h = Harness::new();
        let stats = h.run(&batches(4, 16), 0, &config(4)).unwrap();

        let passed: Vec<f64> = h.events().as_slice().iter()
            .filter_map(|e| match e { Event::Backward { loss, .. } => Some(*loss), _ => None })
            .collect();
        assert_eq!(passed.len(), 4);
        let raw_mean = passed.iter().map(|l| l * 4.0).sum::<f64>() / 4.0;
        assert!((stats["loss"] - raw_mean).abs() < 1e-4, "{} vs {}", stats["loss"], raw_mean);
        assert!(stats.contains_key("lr"));
    }

    #[test]
    fn test_wrong_frame_count_is_shape_mismatch() {
        let mut h = Harness::new();
        let err = h.run(&batches(1, 9), 0, &config(1)).unwrap_err();
        assert!(matches!(err, PretrainError::ShapeMismatch { frames: 9, grid: 4 }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut h = Harness::new();
        let cfg = EpochConfig { mask_ratio: 1.5, ..config(1) };
        assert!(matches!(h.run(&batches(1, 16), 0, &cfg), Err(PretrainError::InvalidConfig(_))));
        let cfg = EpochConfig { mask_ratio: -0.1, ..config(1) };
        assert!(matches!(h.run(&batches(1, 16), 0, &cfg), Err(PretrainError::InvalidConfig(_))));
        let cfg = config(0);
        assert!(matches!(h.run(&batches(1, 16), 0, &cfg), Err(PretrainError::InvalidConfig(_))));
    }

    #[test]
    fn test_writer_gets_scalars_on_updates_and_images_on_cadence() {
        let mut h = Harness::new();
        let cfg = EpochConfig { vis_every: 2, ..config(2) };
        h.run(&batches(4, 16), 1, &cfg).unwrap();

        let tags: Vec<(&str, u64)> = h.writer.scalars.as_slice().iter()
            .map(|(t, _, s)| (t.as_str(), *s))
            .collect();
        assert_eq!(tags, vec![
            ("train_loss", 1250), ("lr", 1250),
            ("train_loss", 1750), ("lr", 1750),
        ]);

        assert_eq!(h.writer.images.len(), 2);
        let (tag, image, step) = &h.writer.images[0];
        assert_eq!(tag, RECONSTRUCTION_TAG);
        assert_eq!(*step, 1);
        // 16×16 grid, reconstruction and input side by side
        assert_eq!((image.channels, image.height, image.width), (3, 16, 32));
    }

    #[test]
    fn test_input_half_of_image_is_the_grid() {
        let data = batches(1, 16);
        let grid = frames_to_grid(data[0].frames.clone(), 4).unwrap();
        let grid = grid.into_data().convert::<f32>().to_vec::<f32>().unwrap();

        let mut h = Harness::new();
        let cfg = EpochConfig { vis_every: 1, ..config(1) };
        h.run(&data, 0, &cfg).unwrap();

        let image = &h.writer.images[0].1;
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(image.at(0, y, 16 + x), grid[y * 16 + x]);
            }
        }
    }

    #[test]
    fn test_epoch_1000x_is_monotonic() {
        let len = 7;
        let xs: Vec<u64> = (0..3)
            .flat_map(|epoch| (0..len).map(move |step| epoch_1000x(step, len, epoch)))
            .collect();
        assert!(xs.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(epoch_1000x(0, len, 2), 2000);
        // 1/7 of an epoch rounds to 143
        assert_eq!(epoch_1000x(1, len, 0), 143);
    }

    #[test]
    fn test_real_optimizer_updates_weights() {
        let device = Default::default();
        let model = tiny_model();
        let before = model.decoder_pred.weight.val()
            .into_data().convert::<f32>().to_vec::<f32>().unwrap();

        let mut optim = AccumulatingOptimizer::new(
            AdamWConfig::new().with_beta_1(0.9).with_beta_2(0.95).init(),
            1e-3,
        );
        let mut scaler = GradScaler::new();
        let mut writer = RecordingWriter::default();
        let data = batches(4, 16);

        let (model, stats) = train_one_epoch(
            model, &data, &mut optim, &BurnDevice::<TestBackend>::new(device), 5,
            &mut scaler, &mut writer, &SingleProcess, &config(2),
        ).unwrap();

        let after = model.decoder_pred.weight.val()
            .into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_ne!(before, after);
        assert_eq!(scaler.updates(), 2);
        assert!(stats["loss"].is_finite());
        assert_eq!(writer.scalars.len(), 4);
    }
}
