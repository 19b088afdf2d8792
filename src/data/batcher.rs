// ============================================================
// Layer 4 — Clip Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<VideoClip>
// into one 5-D frames tensor.
//
//   Input:  N clips, each F × C × H × W floats
//   Output: FrameBatch { frames: [N, F, C, H, W], labels: [N] }
//
// Every clip in a batch must share the same dimensions; the
// loader and the synthetic source both guarantee this by
// resizing to a single frame_size.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::clip::VideoClip;

// ─── FrameBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FrameBatch<B: Backend> {
    /// [batch, frames, channels, height, width]
    pub frames: Tensor<B, 5>,

    /// [batch] — class index per clip, unused by pretraining
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> FrameBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.frames.dims()[0]
    }
}

// ─── ClipBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ClipBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClipBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<VideoClip, FrameBatch<B>> for ClipBatcher<B> {
    fn batch(&self, items: Vec<VideoClip>) -> FrameBatch<B> {
        let batch_size = items.len();
        let [frames, channels, height, width] = items[0].dims();

        let flat: Vec<f32> = items
            .iter()
            .flat_map(|clip| clip.pixels.iter().copied())
            .collect();
        let labels: Vec<i32> = items.iter().map(|clip| clip.label as i32).collect();

        let frames = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([batch_size, frames, channels, height, width]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        FrameBatch { frames, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::data::synthetic::SyntheticClips;
    use crate::domain::traits::ClipSource;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_stacks_clips_in_order() {
        let src = SyntheticClips::new(3, 4, 5, 9);
        let clips: Vec<VideoClip> = (0..3).map(|i| src.load(i).unwrap()).collect();
        let first_value = clips[1].pixels[0];

        let batcher = ClipBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(clips);

        assert_eq!(batch.frames.dims(), [3, 4, 3, 5, 5]);
        assert_eq!(batch.labels.dims(), [3]);
        assert_eq!(batch.batch_size(), 3);

        let v = batch.frames
            .slice([1..2, 0..1, 0..1, 0..1, 0..1])
            .into_scalar()
            .elem::<f32>();
        assert_eq!(v, first_value);
    }
}
