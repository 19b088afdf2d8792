// ============================================================
// Layer 6 — Summary Writers
// ============================================================
// Two SummaryWriter implementations:
//
//   FileSummaryWriter — scalars appended as JSON lines to
//                       {log_dir}/scalars.jsonl, images saved as
//                       {log_dir}/images/{tag}-{step:06}-{seq:04}.png
//                       where seq counts images per tag
//   NullWriter        — drops everything
//
// Images arrive as raw model-space floats. They are min-max
// stretched to 0..255 per image before encoding, so normalised
// inputs and reconstructions are both viewable.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::domain::image::ImageChw;
use crate::domain::traits::SummaryWriter;
use crate::error::{PretrainError, PretrainResult};

/// One line of scalars.jsonl
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalarEvent {
    pub tag:       String,
    pub value:     f64,
    pub step:      u64,
    pub wall_time: f64,
}

pub struct FileSummaryWriter {
    log_dir:    PathBuf,
    images_dir: PathBuf,
    scalars:    BufWriter<File>,
    image_seq:  HashMap<String, u64>,
}

impl FileSummaryWriter {
    pub fn create(log_dir: impl Into<PathBuf>) -> PretrainResult<Self> {
        let log_dir = log_dir.into();
        let images_dir = log_dir.join("images");
        fs::create_dir_all(&images_dir).map_err(|e| PretrainError::io(&images_dir, e))?;

        let scalars_path = log_dir.join("scalars.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&scalars_path)
            .map_err(|e| PretrainError::io(&scalars_path, e))?;

        Ok(Self {
            log_dir,
            images_dir,
            scalars: BufWriter::new(file),
            image_seq: HashMap::new(),
        })
    }

    /// Path of the `seq`-th image written under `tag`
    pub fn image_path(&self, tag: &str, step: u64, seq: u64) -> PathBuf {
        self.images_dir.join(format!("{}-{step:06}-{seq:04}.png", slug(tag)))
    }
}

impl SummaryWriter for FileSummaryWriter {
    fn log_dir(&self) -> Option<&Path> {
        Some(&self.log_dir)
    }

    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> PretrainResult<()> {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let event = ScalarEvent { tag: tag.to_string(), value, step, wall_time };
        let line = serde_json::to_string(&event)?;
        writeln!(self.scalars, "{line}").map_err(|e| PretrainError::io(&self.log_dir, e))
    }

    fn add_image(&mut self, tag: &str, image: &ImageChw, step: u64) -> PretrainResult<()> {
        let seq = self.image_seq.entry(tag.to_string()).or_insert(0);
        let current = *seq;
        *seq += 1;
        let path = self.image_path(tag, step, current);
        encode_png(image, &path)?;
        tracing::debug!("Wrote image '{}'", path.display());
        Ok(())
    }

    fn flush(&mut self) -> PretrainResult<()> {
        self.scalars.flush().map_err(|e| PretrainError::io(&self.log_dir, e))
    }
}

impl Drop for FileSummaryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.scalars.flush() {
            tracing::warn!("Failed to flush scalars in '{}': {e}", self.log_dir.display());
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullWriter;

impl SummaryWriter for NullWriter {
    fn log_dir(&self) -> Option<&Path> {
        None
    }

    fn add_scalar(&mut self, _tag: &str, _value: f64, _step: u64) -> PretrainResult<()> {
        Ok(())
    }

    fn add_image(&mut self, _tag: &str, _image: &ImageChw, _step: u64) -> PretrainResult<()> {
        Ok(())
    }
}

/// Save a 1- or 3-channel CHW float image as PNG.
pub fn encode_png(image: &ImageChw, path: &Path) -> PretrainResult<()> {
    let (lo, hi) = image.value_range();
    let span = if hi > lo { hi - lo } else { 1.0 };
    let to_byte = |v: f32| (((v - lo) / span).clamp(0.0, 1.0) * 255.0).round() as u8;
    let (w, h) = (image.width as u32, image.height as u32);

    let result = match image.channels {
        1 => image::GrayImage::from_fn(w, h, |x, y| {
            image::Luma([to_byte(image.at(0, y as usize, x as usize))])
        })
        .save(path),
        3 => image::RgbImage::from_fn(w, h, |x, y| {
            let (x, y) = (x as usize, y as usize);
            image::Rgb([
                to_byte(image.at(0, y, x)),
                to_byte(image.at(1, y, x)),
                to_byte(image.at(2, y, x)),
            ])
        })
        .save(path),
        n => {
            return Err(PretrainError::InvalidConfig(format!(
                "cannot encode a {n}-channel image"
            )))
        }
    };
    result.map_err(|e| PretrainError::image(path, e))
}

/// "Example reconstruction" → "example_reconstruction"
fn slug(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
