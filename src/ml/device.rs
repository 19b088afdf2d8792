// ============================================================
// Layer 5 — Device Transfer
// ============================================================
// Where batches are moved before the forward pass, and how the
// loop waits for queued kernels before reading metrics. Tests
// substitute a counting fake.

use std::marker::PhantomData;

use burn::prelude::*;

pub trait DeviceTransfer<B: Backend> {
    fn transfer(&self, frames: Tensor<B, 5>) -> Tensor<B, 5>;

    /// Block until every queued operation on the device has finished
    fn synchronize(&self);
}

#[derive(Debug, Clone)]
pub struct BurnDevice<B: Backend> {
    device:   B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> BurnDevice<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device, _backend: PhantomData }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> DeviceTransfer<B> for BurnDevice<B> {
    fn transfer(&self, frames: Tensor<B, 5>) -> Tensor<B, 5> {
        frames.to_device(&self.device)
    }

    fn synchronize(&self) {
        B::sync(&self.device);
    }
}
