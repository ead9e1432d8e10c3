//! Training statistics for PPO
//!
//! This module defines structures for tracking and aggregating
//! training metrics during PPO training.

use serde::{Deserialize, Serialize};

/// Loss scalars from a single optimization step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLosses {
    /// Clipped surrogate policy loss
    pub policy_loss: f64,

    /// Weighted value function loss
    pub value_loss: f64,

    /// Weighted negative entropy
    pub entropy_loss: f64,

    /// Sum of the three terms
    pub total_loss: f64,
}

/// Append-only per-step loss logs
///
/// The four series always have the same length: one entry per applied
/// optimization step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    /// Policy loss per step
    pub policy_loss: Vec<f64>,
    /// Value loss per step
    pub value_loss: Vec<f64>,
    /// Entropy loss per step
    pub entropy_loss: Vec<f64>,
    /// Total loss per step
    pub total_loss: Vec<f64>,
}

impl LossHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one step
    pub fn push(&mut self, losses: &StepLosses) {
        self.policy_loss.push(losses.policy_loss);
        self.value_loss.push(losses.value_loss);
        self.entropy_loss.push(losses.entropy_loss);
        self.total_loss.push(losses.total_loss);
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.total_loss.len()
    }

    /// Check if no step has been recorded
    pub fn is_empty(&self) -> bool {
        self.total_loss.is_empty()
    }

    /// True if the four series have equal length
    pub fn is_consistent(&self) -> bool {
        let n = self.total_loss.len();
        self.policy_loss.len() == n && self.value_loss.len() == n && self.entropy_loss.len() == n
    }

    /// Most recent step
    pub fn last(&self) -> Option<StepLosses> {
        let idx = self.len().checked_sub(1)?;
        self.get(idx)
    }

    /// Step at `idx`
    pub fn get(&self, idx: usize) -> Option<StepLosses> {
        Some(StepLosses {
            policy_loss: *self.policy_loss.get(idx)?,
            value_loss: *self.value_loss.get(idx)?,
            entropy_loss: *self.entropy_loss.get(idx)?,
            total_loss: *self.total_loss.get(idx)?,
        })
    }

    /// Per-series mean over all recorded steps
    pub fn mean(&self) -> Option<StepLosses> {
        if self.is_empty() {
            return None;
        }
        let mean = |series: &[f64]| series.iter().sum::<f64>() / series.len() as f64;
        Some(StepLosses {
            policy_loss: mean(&self.policy_loss),
            value_loss: mean(&self.value_loss),
            entropy_loss: mean(&self.entropy_loss),
            total_loss: mean(&self.total_loss),
        })
    }

    /// Per-series minimum over all recorded steps
    pub fn min(&self) -> Option<StepLosses> {
        if self.is_empty() {
            return None;
        }
        let min = |series: &[f64]| series.iter().copied().fold(f64::INFINITY, f64::min);
        Some(StepLosses {
            policy_loss: min(&self.policy_loss),
            value_loss: min(&self.value_loss),
            entropy_loss: min(&self.entropy_loss),
            total_loss: min(&self.total_loss),
        })
    }
}

/// Aggregated statistics for one epoch of minibatch updates
///
/// Skipped steps count as zero losses in the means, matching what is
/// recorded for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochStats {
    sum: StepLosses,
    last: StepLosses,
    /// Steps whose update was applied
    pub applied: usize,
    /// Steps skipped for numerical reasons
    pub skipped: usize,
}

impl EpochStats {
    /// Create zero-initialized statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied step
    pub fn record(&mut self, losses: &StepLosses) {
        self.sum.policy_loss += losses.policy_loss;
        self.sum.value_loss += losses.value_loss;
        self.sum.entropy_loss += losses.entropy_loss;
        self.sum.total_loss += losses.total_loss;
        self.last = *losses;
        self.applied += 1;
    }

    /// Record a skipped step with zero losses
    pub fn record_skip(&mut self) {
        self.last = StepLosses::default();
        self.skipped += 1;
    }

    /// Total number of steps seen
    pub fn steps(&self) -> usize {
        self.applied + self.skipped
    }

    /// Mean losses over all steps
    pub fn mean(&self) -> StepLosses {
        let n = self.steps();
        if n == 0 {
            return StepLosses::default();
        }
        let scale = n as f64;
        StepLosses {
            policy_loss: self.sum.policy_loss / scale,
            value_loss: self.sum.value_loss / scale,
            entropy_loss: self.sum.entropy_loss / scale,
            total_loss: self.sum.total_loss / scale,
        }
    }

    /// Losses of the final step
    pub fn last(&self) -> StepLosses {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(policy: f64, value: f64) -> StepLosses {
        StepLosses {
            policy_loss: policy,
            value_loss: value,
            entropy_loss: -0.1,
            total_loss: policy + value - 0.1,
        }
    }

    #[test]
    fn test_history_summary() {
        let mut history = LossHistory::new();
        assert!(history.mean().is_none());
        assert!(history.last().is_none());

        history.push(&losses(1.0, 4.0));
        history.push(&losses(-1.0, 2.0));
        history.push(&losses(0.5, 3.0));

        assert_eq!(history.len(), 3);
        assert!(history.is_consistent());

        let mean = history.mean().unwrap();
        assert!((mean.policy_loss - 0.5 / 3.0).abs() < 1e-12);
        assert!((mean.value_loss - 3.0).abs() < 1e-12);

        let min = history.min().unwrap();
        assert_eq!(min.policy_loss, -1.0);
        assert_eq!(min.value_loss, 2.0);

        assert_eq!(history.last().unwrap(), losses(0.5, 3.0));
    }

    #[test]
    fn test_epoch_stats_counts_skips_as_zero() {
        let mut stats = EpochStats::new();
        stats.record(&losses(2.0, 4.0));
        stats.record_skip();

        assert_eq!(stats.steps(), 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.mean().policy_loss, 1.0);
        assert_eq!(stats.mean().value_loss, 2.0);
        assert_eq!(stats.last(), StepLosses::default());
    }
}
