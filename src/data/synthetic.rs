// ============================================================
// Layer 4 — Synthetic Clips
// ============================================================
// Deterministic toy videos for smoke runs and tests: a bright
// square drifts across a noisy background, one step per frame.
//
// Clip `i` is generated from StdRng seeded with seed + i, so
// the same index always yields the same clip no matter which
// loader worker asks for it.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::clip::VideoClip;
use crate::domain::traits::ClipSource;
use crate::error::{PretrainError, PretrainResult};

#[derive(Debug, Clone)]
pub struct SyntheticClips {
    count:      usize,
    frames:     usize,
    frame_size: usize,
    seed:       u64,
}

impl SyntheticClips {
    pub fn new(count: usize, frames: usize, frame_size: usize, seed: u64) -> Self {
        Self { count, frames, frame_size, seed }
    }

    fn generate(&self, index: usize) -> VideoClip {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        let size = self.frame_size;
        let plane = size * size;

        let side = (size / 4).max(1);
        let max_pos = (size - side) as f32;
        let (mut x, mut y) = (rng.gen_range(0.0..=max_pos), rng.gen_range(0.0..=max_pos));
        let (vx, vy) = (rng.gen_range(-1.5f32..1.5), rng.gen_range(-1.5f32..1.5));
        let colour: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];

        let mut pixels = Vec::with_capacity(self.frames * 3 * plane);
        for _ in 0..self.frames {
            let (sx, sy) = (x.round() as usize, y.round() as usize);
            for c in 0..3 {
                for py in 0..size {
                    for px in 0..size {
                        let inside = px >= sx && px < sx + side && py >= sy && py < sy + side;
                        let base = if inside { colour[c] } else { 0.1 };
                        let noise: f32 = rng.gen_range(-0.05..0.05);
                        // roughly the same range as ImageNet-normalised pixels
                        pixels.push((base + noise - 0.45) / 0.225);
                    }
                }
            }
            // bounce off the borders
            x += vx;
            y += vy;
            if x < 0.0 || x > max_pos { x = x.clamp(0.0, max_pos); }
            if y < 0.0 || y > max_pos { y = y.clamp(0.0, max_pos); }
        }

        VideoClip::new(format!("synthetic-{index}"), 0, self.frames, 3, size, size, pixels)
    }
}

impl ClipSource for SyntheticClips {
    fn len(&self) -> usize {
        self.count
    }

    fn load(&self, index: usize) -> PretrainResult<VideoClip> {
        if index >= self.count {
            return Err(PretrainError::InvalidConfig(format!(
                "synthetic clip {index} out of range (have {})", self.count
            )));
        }
        Ok(self.generate(index))
    }
}
