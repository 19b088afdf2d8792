// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop talks to its collaborators only through
// these traits, so tests can swap in recording fakes:
//
//   ClipSource     → where raw clips come from
//                    (ClipFolder, SyntheticClips)
//   SummaryWriter  → scalar / image sink
//                    (FileSummaryWriter, NullWriter)
//   ProcessGroup   → cross-worker reductions
//                    (SingleProcess)
//
// None of them mention Burn types; tensors are converted to
// plain buffers before they cross this boundary.

use std::path::Path;

use crate::domain::clip::VideoClip;
use crate::domain::image::ImageChw;
use crate::error::PretrainResult;

// ─── ClipSource ───────────────────────────────────────────────────────────────
/// Random-access collection of video clips.
///
/// `load` is called from data-loader worker threads, hence
/// the Send + Sync bound.
pub trait ClipSource: Send + Sync {
    /// Number of clips available
    fn len(&self) -> usize;

    /// Decode clip `index` into a normalised pixel buffer
    fn load(&self, index: usize) -> PretrainResult<VideoClip>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── SummaryWriter ────────────────────────────────────────────────────────────
/// Sink for training curves and diagnostic images.
///
/// A run without a log directory gets a writer whose methods
/// do nothing, so the loop never branches on "is logging on".
pub trait SummaryWriter {
    /// Directory the writer persists into, if any
    fn log_dir(&self) -> Option<&Path>;

    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> PretrainResult<()>;

    fn add_image(&mut self, tag: &str, image: &ImageChw, step: u64) -> PretrainResult<()>;

    fn flush(&mut self) -> PretrainResult<()> {
        Ok(())
    }
}

// ─── ProcessGroup ─────────────────────────────────────────────────────────────
/// Collective operations across data-parallel workers.
///
/// Every worker must call each collective in the same order,
/// otherwise the group deadlocks.
pub trait ProcessGroup {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Element-wise sum of `values` across all workers, in place
    fn all_reduce_sum(&self, values: &mut [f64]);

    /// Mean of a scalar across all workers
    fn all_reduce_mean(&self, value: f64) -> f64 {
        let world = self.world_size();
        if world <= 1 {
            return value;
        }
        let mut buf = [value];
        self.all_reduce_sum(&mut buf);
        buf[0] / world as f64
    }

    fn is_main_process(&self) -> bool {
        self.rank() == 0
    }
}
