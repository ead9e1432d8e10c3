//! Minibatch partitioning for an epoch
//!
//! Minibatches are contiguous, non-overlapping and visited in order, so a
//! run over identical rollout files is deterministic. Trailing transitions
//! that do not fill a whole minibatch are left out of the epoch.

use std::ops::Range;

/// Minibatch size used on the CPU
pub const CPU_BATCH_SIZE: usize = 64;

/// Upper bound for the minibatch size on an accelerator
pub const MAX_ACCELERATED_BATCH_SIZE: usize = 256;

/// Pick a minibatch size from the device class and the number of samples
///
/// On the CPU the size is fixed. On an accelerator small datasets get small
/// minibatches and large ones grow up to [`MAX_ACCELERATED_BATCH_SIZE`].
pub fn adaptive_batch_size(accelerated: bool, num_samples: usize) -> usize {
    if !accelerated {
        return CPU_BATCH_SIZE;
    }
    match num_samples {
        n if n < 500 => 32,
        n if n < 2_000 => 64,
        n if n < 10_000 => 128,
        n => MAX_ACCELERATED_BATCH_SIZE.min(n / 8),
    }
}

/// Minibatch layout for one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinibatchPlan {
    /// Transitions per minibatch
    pub batch_size: usize,
    /// Number of minibatches
    pub num_batches: usize,
}

impl MinibatchPlan {
    /// Plan minibatches over `num_samples` transitions
    ///
    /// At least one minibatch is produced for a non-empty dataset: when the
    /// dataset is smaller than `batch_size`, the single minibatch covers
    /// all of it.
    pub fn new(num_samples: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let num_batches = num_samples / batch_size;
        if num_batches == 0 {
            Self { batch_size: num_samples, num_batches: usize::from(num_samples > 0) }
        } else {
            Self { batch_size, num_batches }
        }
    }

    /// Index range of minibatch `idx`
    pub fn range(&self, idx: usize) -> Range<usize> {
        let start = idx * self.batch_size;
        start..start + self.batch_size
    }

    /// Iterate over all minibatch ranges in order
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.num_batches).map(move |idx| self.range(idx))
    }

    /// Minibatch indices at which progress is logged
    ///
    /// The first and last minibatch plus the 25/50/75% marks, deduplicated.
    pub fn log_points(&self) -> Vec<usize> {
        if self.num_batches == 0 {
            return Vec::new();
        }
        let n = self.num_batches;
        let mut points = vec![0, n / 4, n / 2, n * 3 / 4, n - 1];
        points.sort_unstable();
        points.dedup();
        points
    }
}
