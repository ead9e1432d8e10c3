//! Rollout storage and epoch-level concatenation
//!
//! Transitions are kept in struct-of-arrays layout so a contiguous range of
//! the epoch can be handed to the optimizer as borrowed slices without
//! copying.

use std::ops::Range;

/// Action dimensionality: steer, throttle, brake
pub const ACTION_DIM: usize = 3;

/// One environment transition as recorded by the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    /// Observation vector
    pub state: Vec<f32>,
    /// Action taken: `[steer, throttle, brake]`
    pub action: [f32; ACTION_DIM],
    /// Reward received
    pub reward: f32,
    /// Whether the episode ended on this transition
    pub done: bool,
    /// Log probability of the action under the behavior policy
    pub log_prob: f32,
    /// Value estimate at collection time
    pub value: f32,
}

/// All valid transitions of a single rollout file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolloutData {
    /// Observation width shared by every transition in this rollout
    pub obs_dim: usize,

    /// Observations [len, obs_dim], row-major
    pub observations: Vec<f32>,

    /// Actions [len, ACTION_DIM], row-major
    pub actions: Vec<f32>,

    /// Rewards [len]
    pub rewards: Vec<f32>,

    /// Episode boundary flags [len]
    pub dones: Vec<bool>,

    /// Behavior log probabilities [len]
    pub log_probs: Vec<f32>,

    /// Behavior value estimates [len]
    pub values: Vec<f32>,

    /// Cumulative episode reward
    pub total_reward: f32,
}

impl RolloutData {
    /// Create an empty rollout with a fixed observation width
    pub fn new(obs_dim: usize) -> Self {
        Self { obs_dim, ..Default::default() }
    }

    /// Append one transition
    ///
    /// Returns `false` (and stores nothing) if the state width differs from
    /// `obs_dim`.
    pub fn push(&mut self, exp: &Experience) -> bool {
        if exp.state.len() != self.obs_dim {
            return false;
        }
        self.observations.extend_from_slice(&exp.state);
        self.actions.extend_from_slice(&exp.action);
        self.rewards.push(exp.reward);
        self.dones.push(exp.done);
        self.log_probs.push(exp.log_prob);
        self.values.push(exp.value);
        true
    }

    /// Number of transitions
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if the rollout holds no transitions
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Concatenation of every rollout accepted for one epoch, in file order
#[derive(Debug, Clone, Default)]
pub struct EpochBuffer {
    obs_dim: usize,
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
}

impl EpochBuffer {
    /// Create an empty buffer for the run's observation width
    pub fn new(obs_dim: usize) -> Self {
        Self { obs_dim, ..Default::default() }
    }

    /// Append a rollout
    ///
    /// Returns `false` without modifying the buffer when the rollout's width
    /// disagrees with the buffer's.
    pub fn extend(&mut self, rollout: &RolloutData) -> bool {
        if rollout.obs_dim != self.obs_dim {
            return false;
        }
        self.observations.extend_from_slice(&rollout.observations);
        self.actions.extend_from_slice(&rollout.actions);
        self.rewards.extend_from_slice(&rollout.rewards);
        self.dones.extend_from_slice(&rollout.dones);
        self.log_probs.extend_from_slice(&rollout.log_probs);
        self.values.extend_from_slice(&rollout.values);
        true
    }

    /// Observation width
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Total number of transitions
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Borrow a contiguous range of transitions as a minibatch
    ///
    /// # Panics
    ///
    /// Panics if `range` extends past `len()`.
    pub fn batch(&self, range: Range<usize>) -> RolloutBatch<'_> {
        assert!(range.end <= self.len(), "batch range {:?} exceeds buffer length {}", range, self.len());
        let d = self.obs_dim;
        RolloutBatch {
            obs_dim: d,
            observations: &self.observations[range.start * d..range.end * d],
            actions: &self.actions[range.start * ACTION_DIM..range.end * ACTION_DIM],
            rewards: &self.rewards[range.clone()],
            dones: &self.dones[range.clone()],
            log_probs: &self.log_probs[range.clone()],
            values: &self.values[range],
        }
    }

    /// Borrow every transition as a single batch
    pub fn as_batch(&self) -> RolloutBatch<'_> {
        self.batch(0..self.len())
    }
}

/// A contiguous slice of the epoch's transitions for one optimization step
#[derive(Debug, Clone, Copy)]
pub struct RolloutBatch<'a> {
    /// Observation width
    pub obs_dim: usize,
    /// Observations [len, obs_dim]
    pub observations: &'a [f32],
    /// Actions [len, ACTION_DIM]
    pub actions: &'a [f32],
    /// Rewards [len]
    pub rewards: &'a [f32],
    /// Done flags [len]
    pub dones: &'a [bool],
    /// Behavior log probabilities [len]
    pub log_probs: &'a [f32],
    /// Behavior values [len]
    pub values: &'a [f32],
}

impl RolloutBatch<'_> {
    /// Get batch size
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// True if every float field is finite
    pub fn is_finite(&self) -> bool {
        [self.observations, self.actions, self.rewards, self.log_probs, self.values]
            .iter()
            .all(|field| field.iter().all(|v| v.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(state: Vec<f32>, reward: f32, done: bool) -> Experience {
        Experience { state, action: [0.1, 0.5, 0.0], reward, done, log_prob: -1.0, value: 0.2 }
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut rollout = RolloutData::new(2);
        assert!(rollout.push(&exp(vec![1.0, 2.0], 1.0, false)));
        assert!(!rollout.push(&exp(vec![1.0, 2.0, 3.0], 1.0, false)));
        assert_eq!(rollout.len(), 1);
        assert_eq!(rollout.observations, vec![1.0, 2.0]);
        assert_eq!(rollout.actions, vec![0.1, 0.5, 0.0]);
    }

    #[test]
    fn test_epoch_buffer_concatenates_in_order() {
        let mut a = RolloutData::new(1);
        a.push(&exp(vec![0.0], 1.0, false));
        a.push(&exp(vec![1.0], 2.0, true));
        let mut b = RolloutData::new(1);
        b.push(&exp(vec![2.0], 3.0, true));

        let mut buffer = EpochBuffer::new(1);
        assert!(buffer.extend(&a));
        assert!(buffer.extend(&b));
        assert!(!buffer.extend(&RolloutData::new(4)));

        assert_eq!(buffer.len(), 3);
        let batch = buffer.batch(1..3);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.observations, &[1.0, 2.0]);
        assert_eq!(batch.rewards, &[2.0, 3.0]);
        assert_eq!(batch.dones, &[true, true]);
        assert_eq!(batch.actions.len(), 2 * ACTION_DIM);
    }

    #[test]
    fn test_batch_finite_check() {
        let mut rollout = RolloutData::new(1);
        rollout.push(&exp(vec![f32::NAN], 1.0, false));
        let mut buffer = EpochBuffer::new(1);
        buffer.extend(&rollout);
        assert!(!buffer.as_batch().is_finite());
    }
}
