// ============================================================
// Typed errors for the data, model and engine layers
// ============================================================
// The application and CLI layers wrap these in anyhow with
// extra context; everything below them returns PretrainError
// so tests can match on the exact failure.
//
// NonFiniteLoss is the only fatal variant: the engine returns
// it before any backward pass runs and nothing catches it.

use std::path::PathBuf;
use thiserror::Error;

pub type PretrainResult<T> = Result<T, PretrainError>;

#[derive(Debug, Error)]
pub enum PretrainError {
    #[error("loss is {value}, stopping training (epoch {epoch}, step {step})")]
    NonFiniteLoss { epoch: usize, step: usize, value: f64 },

    #[error("clip has {frames} frames but a {grid}x{grid} grid needs {}", grid * grid)]
    ShapeMismatch { frames: usize, grid: usize },

    #[error("grid image {height}x{width} cannot be split into a {grid}x{grid} grid")]
    GridShape { height: usize, width: usize, grid: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tensor data conversion failed: {0}")]
    TensorData(String),
}

impl PretrainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image { path: path.into(), source }
    }
}
