// ============================================================
// Layer 3 — VideoClip Domain Type
// ============================================================
// One decoded video clip, ready to be batched.
//
// Pixels are stored flat in [frames, channels, height, width]
// order (frame-major, then CHW per frame), which is exactly
// the layout the batcher reshapes into a 5-D tensor.
//
// The label is carried along because folder datasets have one
// (the class directory) but pretraining never reads it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoClip {
    /// Where the clip came from (directory name or synthetic id)
    pub source: String,

    /// Class index; ignored by the pretraining loop
    pub label: usize,

    pub frames:   usize,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,

    /// Flat pixel buffer, length = frames * channels * height * width
    pub pixels: Vec<f32>,
}

impl VideoClip {
    pub fn new(
        source:   impl Into<String>,
        label:    usize,
        frames:   usize,
        channels: usize,
        height:   usize,
        width:    usize,
        pixels:   Vec<f32>,
    ) -> Self {
        debug_assert_eq!(pixels.len(), frames * channels * height * width);
        Self { source: source.into(), label, frames, channels, height, width, pixels }
    }

    /// Number of values in one frame (C * H * W)
    pub fn frame_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Borrow the pixels of a single frame
    pub fn frame(&self, index: usize) -> &[f32] {
        let len = self.frame_len();
        &self.pixels[index * len..(index + 1) * len]
    }

    /// (frames, channels, height, width)
    pub fn dims(&self) -> [usize; 4] {
        [self.frames, self.channels, self.height, self.width]
    }
}
