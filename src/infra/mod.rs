// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the training loop and the
// application layer:
//
//   checkpoint.rs  — model weights + run config on disk
//                    (Burn CompactRecorder, serde_json)
//
//   metrics.rs     — SmoothedValue / MetricLogger running
//                    statistics and progress lines
//
//   stats_log.rs   — one JSON line per epoch in log.txt
//
//   writer.rs      — scalar / image summary writers
//
//   distributed.rs — process groups for cross-worker
//                    reductions

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Smoothed metrics and the epoch metric logger
pub mod metrics;

/// Per-epoch JSON-lines log
pub mod stats_log;

/// Summary writers (files / no-op)
pub mod writer;

/// Process groups
pub mod distributed;
