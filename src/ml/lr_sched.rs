// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// Linear warmup followed by a half-cosine decay, evaluated on
// the fractional epoch so the lr changes within an epoch:
//
//   e < warmup : lr · e / warmup
//   otherwise  : min_lr + (lr − min_lr) · ½ · (1 + cos(π · t))
//                where t = (e − warmup) / (epochs − warmup)

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::ml::scaler::LrControl;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LrSchedule {
    /// Peak learning rate, reached at the end of warmup
    pub lr:            f64,
    pub min_lr:        f64,
    pub warmup_epochs: f64,
    pub epochs:        f64,
}

impl LrSchedule {
    pub fn lr_at(&self, epoch: f64) -> f64 {
        if epoch < self.warmup_epochs {
            return self.lr * epoch / self.warmup_epochs;
        }
        let span = self.epochs - self.warmup_epochs;
        if span <= 0.0 {
            return self.min_lr;
        }
        let t = ((epoch - self.warmup_epochs) / span).min(1.0);
        self.min_lr + (self.lr - self.min_lr) * 0.5 * (1.0 + (PI * t).cos())
    }
}

/// Set the optimizer's lr for `epoch` (fractional) and return it.
pub fn adjust_learning_rate<O: LrControl + ?Sized>(
    optimizer: &mut O,
    epoch:     f64,
    schedule:  &LrSchedule,
) -> f64 {
    let lr = schedule.lr_at(epoch);
    optimizer.set_lr(lr);
    lr
}
