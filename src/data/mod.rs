// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from frames on disk to the grid images the model
// consumes:
//
//   frame folders / synthetic generator
//       │
//       ▼
//   ClipSource (ClipFolder, SyntheticClips)
//       │        decode + ClipTransform augmentation
//       ▼
//   ClipDataset      → Burn Dataset<VideoClip>
//       │
//       ▼
//   ClipBatcher      → FrameBatch [B, F², C, H, W]
//       │
//       ▼
//   BatchSource      → what the epoch loop iterates
//       │
//       ▼
//   frames_to_grid   → [B, C, F·H, F·W]  (inside the loop)

/// Indexes and decodes clip folders
pub mod loader;

/// Deterministic toy clips for smoke runs
pub mod synthetic;

/// Crop / resize / flip / normalise per clip
pub mod preprocessor;

/// Burn Dataset adapter over a ClipSource
pub mod dataset;

/// Burn Batcher producing FrameBatch tensors
pub mod batcher;

/// Iteration + length abstraction for the epoch loop
pub mod source;

/// Frame ↔ grid tensor rearrangement
pub mod grid;
