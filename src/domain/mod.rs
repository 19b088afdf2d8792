// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system
// works with: video clips, images, and the capabilities the
// training loop depends on.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits

// A decoded video clip (frames × CHW)
pub mod clip;

// A CHW float image for summary writers
pub mod image;

// Capabilities the training loop is written against
pub mod traits;
