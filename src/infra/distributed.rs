// ============================================================
// Layer 6 — Process Groups
// ============================================================
// The only group shipped is the trivial one: a single worker
// whose reductions are identities. Multi-worker runs plug in
// another ProcessGroup implementation without touching the
// training loop.

use crate::domain::traits::ProcessGroup;

#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_process_reductions_are_identity() {
        let g = SingleProcess;
        let mut v = [1.5, 2.5];
        g.all_reduce_sum(&mut v);
        assert_eq!(v, [1.5, 2.5]);
        assert_eq!(g.all_reduce_mean(3.0), 3.0);
        assert!(g.is_main_process());
    }
}
