// ============================================================
// Layer 4 — Frame Grid Rearrangement
// ============================================================
// Tiles the F² frames of every clip into one F×F grid image
// so an image MAE can consume a whole clip at once.
//
//   frames: [B, F², C, H, W]
//      │  permute  → [B, C, F², H, W]
//      │  reshape  → [B, C, F, F, H, W]      (grid row, grid col)
//      │  permute  → [B, C, F, H, F, W]      (row, y, col, x)
//      ▼  reshape  → [B, C, F·H, F·W]
//
// Frame f ends up at grid row f / F, column f % F, so the
// first row of the grid holds frames 0..F in temporal order.
// The transform only moves values, and grid_to_frames undoes
// it exactly.

use burn::prelude::*;

use crate::error::{PretrainError, PretrainResult};

/// Default grid side; 4×4 = 16 frames per clip.
pub const DEFAULT_GRID_SIZE: usize = 4;

/// Rearrange `[B, grid², C, H, W]` frames into `[B, C, grid·H, grid·W]`.
pub fn frames_to_grid<B: Backend>(
    frames: Tensor<B, 5>,
    grid:   usize,
) -> PretrainResult<Tensor<B, 4>> {
    let [batch, num_frames, channels, height, width] = frames.dims();
    if grid == 0 || num_frames != grid * grid {
        return Err(PretrainError::ShapeMismatch { frames: num_frames, grid });
    }

    Ok(frames
        .permute([0, 2, 1, 3, 4])
        .reshape([batch, channels, grid, grid, height, width])
        .permute([0, 1, 2, 4, 3, 5])
        .reshape([batch, channels, grid * height, grid * width]))
}

/// Inverse of [`frames_to_grid`]: `[B, C, grid·H, grid·W]` → `[B, grid², C, H, W]`.
pub fn grid_to_frames<B: Backend>(
    image: Tensor<B, 4>,
    grid:  usize,
) -> PretrainResult<Tensor<B, 5>> {
    let [batch, channels, grid_h, grid_w] = image.dims();
    if grid == 0 || grid_h % grid != 0 || grid_w % grid != 0 {
        return Err(PretrainError::GridShape { height: grid_h, width: grid_w, grid });
    }
    let (height, width) = (grid_h / grid, grid_w / grid);

    Ok(image
        .reshape([batch, channels, grid, height, grid, width])
        .permute([0, 1, 2, 4, 3, 5])
        .reshape([batch, channels, grid * grid, height, width])
        .permute([0, 2, 1, 3, 4]))
}
