// ============================================================
// Layer 2 — PreviewUseCase
// ============================================================
// Renders one clip exactly as the model will see it: frames
// resized and normalised without augmentation, tiled into the
// F×F grid, written as a PNG.
//
// Runs on the NdArray backend; no gradients are involved.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{backend::NdArray, prelude::*};

use crate::data::{
    grid::{frames_to_grid, DEFAULT_GRID_SIZE},
    loader::ClipFolder,
    preprocessor::ClipTransform,
    synthetic::SyntheticClips,
};
use crate::domain::{image::ImageChw, traits::ClipSource};
use crate::error::PretrainError;
use crate::infra::writer::encode_png;

type PreviewBackend = NdArray<f32>;

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub data_path:  Option<String>,
    pub clip_index: usize,
    pub frame_size: usize,
    pub grid_size:  usize,
    pub output:     PathBuf,
    pub seed:       u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            data_path:  None,
            clip_index: 0,
            frame_size: 32,
            grid_size:  DEFAULT_GRID_SIZE,
            output:     PathBuf::from("grid_preview.png"),
            seed:       0,
        }
    }
}

pub struct PreviewUseCase {
    config: PreviewConfig,
}

impl PreviewUseCase {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Write the grid PNG and return its path
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;
        let frames = cfg.grid_size * cfg.grid_size;

        let source: Box<dyn ClipSource> = match &cfg.data_path {
            Some(path) => Box::new(ClipFolder::open(
                path, frames, ClipTransform::eval(cfg.frame_size as u32),
            )?),
            None => Box::new(SyntheticClips::new(
                cfg.clip_index + 1, frames, cfg.frame_size, cfg.seed,
            )),
        };
        let clip = source
            .load(cfg.clip_index)
            .with_context(|| format!("Cannot load clip {}", cfg.clip_index))?;
        tracing::info!("Previewing clip '{}' ({} frames)", clip.source, clip.frames);

        let device = Default::default();
        let [f, c, h, w] = clip.dims();
        let tensor = Tensor::<PreviewBackend, 1>::from_floats(clip.pixels.as_slice(), &device)
            .reshape([1, f, c, h, w]);
        let grid = frames_to_grid(tensor, cfg.grid_size)?;

        let [_, channels, height, width] = grid.dims();
        let data = grid
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PretrainError::TensorData(format!("{e:?}")))?;

        encode_png(&ImageChw::new(channels, height, width, data), &cfg.output)?;
        Ok(cfg.output.clone())
    }
}
