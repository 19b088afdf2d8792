// ============================================================
// Layer 5 — Optimizer Wrapper and Loss Scaler
// ============================================================
// Burn optimizers take (lr, model, grads) on every call and
// keep no notion of "pending gradients". The epoch loop needs
// the PyTorch-style split instead:
//
//   accumulate  → add this backward's grads to the window
//   step        → apply the summed window once
//   zero_grad   → drop whatever is pending
//
// AccumulatingOptimizer provides that on top of any burn
// Optimizer with a GradientsAccumulator. GradScaler runs the
// backward pass and decides whether this call also steps.
//
// There is no loss scaling here: burn has no fp16 autocast,
// so gradients never need unscaling. Clipping lives in the
// optimizer config (AdamWConfig::with_grad_clipping).

use std::marker::PhantomData;

use burn::{
    module::AutodiffModule,
    optim::{GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

/// Current learning rate, readable and settable by the schedule.
pub trait LrControl {
    fn lr(&self) -> f64;
    fn set_lr(&mut self, lr: f64);
}

pub trait ParamOptimizer<B: AutodiffBackend, M: AutodiffModule<B>>: LrControl {
    /// Add one backward pass worth of gradients to the pending window
    fn accumulate(&mut self, model: &M, grads: GradientsParams);

    /// Apply the pending window at the current lr
    fn step(&mut self, model: M) -> M;

    /// Discard pending gradients
    fn zero_grad(&mut self);
}

// ─── AccumulatingOptimizer ────────────────────────────────────────────────────
pub struct AccumulatingOptimizer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    inner:       O,
    accumulator: GradientsAccumulator<M>,
    lr:          f64,
    pending:     usize,
    _backend:    PhantomData<B>,
}

impl<B, M, O> AccumulatingOptimizer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(inner: O, lr: f64) -> Self {
        Self {
            inner,
            accumulator: GradientsAccumulator::new(),
            lr,
            pending: 0,
            _backend: PhantomData,
        }
    }

    /// Backward passes accumulated since the last step or zero_grad
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl<B, M, O> LrControl for AccumulatingOptimizer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }
}

impl<B, M, O> ParamOptimizer<B, M> for AccumulatingOptimizer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn accumulate(&mut self, model: &M, grads: GradientsParams) {
        self.accumulator.accumulate::<B>(model, grads);
        self.pending += 1;
    }

    fn step(&mut self, model: M) -> M {
        if self.pending == 0 {
            tracing::debug!("Optimizer step with no pending gradients, skipped");
            return model;
        }
        let grads = self.accumulator.grads();
        self.pending = 0;
        self.inner.step(self.lr, model, grads)
    }

    fn zero_grad(&mut self) {
        // grads() hands back the window and leaves the accumulator empty
        let _ = self.accumulator.grads();
        self.pending = 0;
    }
}

// ─── LossScaler ───────────────────────────────────────────────────────────────
pub trait LossScaler<B: AutodiffBackend, M: AutodiffModule<B>> {
    /// Backward `loss` into the optimizer's window; step when `update_grad`.
    fn backward_step<O: ParamOptimizer<B, M>>(
        &mut self,
        loss:        Tensor<B, 1>,
        optimizer:   &mut O,
        model:       M,
        update_grad: bool,
    ) -> M;
}

#[derive(Debug, Clone, Default)]
pub struct GradScaler {
    updates: usize,
}

impl GradScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimizer steps taken through this scaler
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> LossScaler<B, M> for GradScaler {
    fn backward_step<O: ParamOptimizer<B, M>>(
        &mut self,
        loss:        Tensor<B, 1>,
        optimizer:   &mut O,
        model:       M,
        update_grad: bool,
    ) -> M {
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        optimizer.accumulate(&model, grads);

        if !update_grad {
            return model;
        }
        self.updates += 1;
        optimizer.step(model)
    }
}
