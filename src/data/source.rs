// ============================================================
// Layer 4 — Batch Sources
// ============================================================
// The epoch loop needs two things from its data: an iterator
// over batches and the number of batches in one pass (for the
// fractional-epoch clock). BatchSource captures exactly that,
// over either a Burn DataLoader or a plain Vec in tests.

use std::sync::Arc;

use burn::data::dataloader::DataLoader;

pub trait BatchSource<O> {
    fn iter(&self) -> Box<dyn Iterator<Item = O> + '_>;

    /// Batches yielded by one full pass
    fn num_batches(&self) -> usize;
}

/// Burn DataLoader plus the batch size and worker count it was built with.
///
/// Burn reports dataset items, not batches. With several workers
/// each one batches its own slice of the dataset, so every slice
/// can end in a partial batch of its own.
pub struct LoaderSource<O> {
    loader:      Arc<dyn DataLoader<O>>,
    batch_size:  usize,
    num_workers: usize,
}

impl<O> LoaderSource<O> {
    pub fn new(loader: Arc<dyn DataLoader<O>>, batch_size: usize, num_workers: usize) -> Self {
        Self { loader, batch_size: batch_size.max(1), num_workers }
    }
}

/// Batches one pass yields when `items` are split the way burn's
/// multi-threaded loader splits them: `items / workers` per worker,
/// the remainder going to the last one.
pub fn batches_per_pass(items: usize, batch_size: usize, num_workers: usize) -> usize {
    let batch_size = batch_size.max(1);
    if num_workers <= 1 {
        return items.div_ceil(batch_size);
    }
    let share = items / num_workers;
    let last = items - share * (num_workers - 1);
    share.div_ceil(batch_size) * (num_workers - 1) + last.div_ceil(batch_size)
}

impl<O> BatchSource<O> for LoaderSource<O> {
    fn iter(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.loader.iter())
    }

    fn num_batches(&self) -> usize {
        batches_per_pass(self.loader.num_items(), self.batch_size, self.num_workers)
    }
}

impl<O: Clone> BatchSource<O> for Vec<O> {
    fn iter(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.as_slice().iter().cloned())
    }

    fn num_batches(&self) -> usize {
        self.len()
    }
}
