// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: each use case wires data, ml and
// infra together for one command. No tensor math and no
// printing happen here.

// The pretraining workflow
pub mod pretrain_use_case;

// Render one clip as a grid image
pub mod preview_use_case;
