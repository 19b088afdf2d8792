// ============================================================
// Layer 4 — Clip Preprocessor
// ============================================================
// Turns decoded RGB frames into normalised CHW float buffers.
//
// Pretraining augmentation (applied in order):
//   1. Random resized crop — area scale in [0.2, 1.0],
//      aspect ratio in [3/4, 4/3]
//   2. Resize the crop to frame_size × frame_size
//   3. Random horizontal flip (p = 0.5)
//   4. Normalise with ImageNet mean / std
//
// The crop box and flip are sampled ONCE per clip and reused
// for every frame. Sampling them per frame would make the
// grid cells disagree spatially and the model could solve the
// masked patches from motion artefacts.

use image::{imageops::FilterType, RgbImage};
use rand::Rng;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// Crop window and flip decision shared by all frames of a clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropParams {
    pub x:      u32,
    pub y:      u32,
    pub width:  u32,
    pub height: u32,
    pub flip:   bool,
}

impl CropParams {
    /// The whole frame, unflipped
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height, flip: false }
    }
}

#[derive(Debug, Clone)]
pub struct ClipTransform {
    /// Output side length of every frame
    pub frame_size: u32,
    pub scale:      (f64, f64),
    pub ratio:      (f64, f64),
    pub hflip:      bool,
    /// Disable to get deterministic full-frame resizing
    pub augment:    bool,
}

impl ClipTransform {
    /// MAE pretraining defaults
    pub fn pretrain(frame_size: u32) -> Self {
        Self {
            frame_size,
            scale:   (0.2, 1.0),
            ratio:   (3.0 / 4.0, 4.0 / 3.0),
            hflip:   true,
            augment: true,
        }
    }

    /// Resize + normalise only
    pub fn eval(frame_size: u32) -> Self {
        Self { augment: false, hflip: false, ..Self::pretrain(frame_size) }
    }

    /// Pick a crop window for a `width` × `height` source.
    ///
    /// Tries ten random boxes like torchvision's RandomResizedCrop,
    /// then falls back to a centre crop clamped to the ratio range.
    pub fn sample_params<R: Rng>(&self, width: u32, height: u32, rng: &mut R) -> CropParams {
        if !self.augment || width == 0 || height == 0 {
            return CropParams::full(width, height);
        }
        let flip = self.hflip && rng.gen_bool(0.5);
        let area = (width as f64) * (height as f64);
        let (log_lo, log_hi) = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect = rng.gen_range(log_lo..=log_hi).exp();
            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;
            if w > 0 && h > 0 && w <= width && h <= height {
                let x = rng.gen_range(0..=width - w);
                let y = rng.gen_range(0..=height - h);
                return CropParams { x, y, width: w, height: h, flip };
            }
        }

        // Fallback: centre crop
        let in_ratio = width as f64 / height as f64;
        let (w, h) = if in_ratio < self.ratio.0 {
            (width, ((width as f64) / self.ratio.0).round() as u32)
        } else if in_ratio > self.ratio.1 {
            (((height as f64) * self.ratio.1).round() as u32, height)
        } else {
            (width, height)
        };
        let (w, h) = (w.clamp(1, width), h.clamp(1, height));
        CropParams { x: (width - w) / 2, y: (height - h) / 2, width: w, height: h, flip }
    }

    /// Crop, resize, flip and normalise one frame into CHW floats.
    pub fn apply(&self, frame: &RgbImage, params: &CropParams) -> Vec<f32> {
        let cropped = image::imageops::crop_imm(
            frame, params.x, params.y, params.width, params.height,
        ).to_image();
        let resized = image::imageops::resize(
            &cropped, self.frame_size, self.frame_size, FilterType::CatmullRom,
        );
        let resized = if params.flip {
            image::imageops::flip_horizontal(&resized)
        } else {
            resized
        };
        to_chw_normalised(&resized)
    }
}

/// RGB bytes → CHW floats normalised with ImageNet statistics
pub fn to_chw_normalised(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, px) in img.enumerate_pixels() {
        let i = (y * w + x) as usize;
        for c in 0..3 {
            out[c * plane + i] = (px[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}
