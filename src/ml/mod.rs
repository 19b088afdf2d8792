// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model, optimization and the training loop.
//
//   model.rs     — masked autoencoder: patch embedding, random
//                  masking, encoder, decoder with mask token,
//                  masked-patch MSE loss
//   scaler.rs    — gradient accumulation over a burn optimizer
//                  and the backward / conditional step
//   lr_sched.rs  — warmup + cosine schedule on fractional epochs
//   device.rs    — batch transfer and device barrier
//   engine.rs    — one pretraining epoch
//   trainer.rs   — backend choice, resume, epoch loop, checkpoints

/// Masked autoencoder architecture
pub mod model;

/// Optimizer wrapper and loss scaler
pub mod scaler;

/// Learning-rate schedule
pub mod lr_sched;

/// Device transfer capability
pub mod device;

/// Single-epoch pretraining loop
pub mod engine;

/// Full pretraining run
pub mod trainer;
