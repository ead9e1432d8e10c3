//! Generalized Advantage Estimation (GAE) computation
//!
//! Advantages are computed in a single right-to-left fold over the batch.
//! A transition flagged `done` closes its episode: its TD error does not
//! bootstrap from the following state and the accumulator restarts, so
//! episodes concatenated into one batch never leak into each other.
//!
//! ```text
//! done_t:      δ_t = r_t - V_t                    A_t = δ_t
//! otherwise:   δ_t = r_t + γ * V_{t+1} - V_t      A_t = δ_t + γ * λ * A_{t+1}
//! R_t = A_t + V_t
//! ```
//!
//! `V_{t+1}` for the last transition is the bootstrap value supplied by the
//! caller.

use crate::utils::normalize::standardize;

/// Advantages are clamped to `±ADVANTAGE_CLIP` before normalization
pub const ADVANTAGE_CLIP: f32 = 10.0;

/// Returns are clamped to `±RETURN_CLIP`
pub const RETURN_CLIP: f32 = 100.0;

/// Standard deviation below which advantages are only mean-centered
pub const NORMALIZE_EPS: f32 = 1e-8;

/// GAE discounting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaeParams {
    /// Discount factor (gamma)
    pub gamma: f32,
    /// GAE lambda parameter
    pub lambda: f32,
}

impl Default for GaeParams {
    fn default() -> Self {
        Self { gamma: 0.99, lambda: 0.95 }
    }
}

/// Advantages and returns for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct AdvantageEstimate {
    /// Per-step advantages
    pub advantages: Vec<f32>,
    /// Per-step returns (`advantage + value`)
    pub returns: Vec<f32>,
}

/// Raw GAE advantages and returns, without clamping or normalization
///
/// # Arguments
/// * `rewards` - Rewards [n]
/// * `values` - Behavior value estimates [n]
/// * `dones` - Episode boundary flags [n]
/// * `bootstrap_value` - Value of the state following the last transition
/// * `params` - Discount and lambda
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    bootstrap_value: f32,
    params: GaeParams,
) -> AdvantageEstimate {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(dones.len(), n);

    let GaeParams { gamma, lambda } = params;
    let mut advantages = vec![0.0; n];

    (0..n).rev().fold((0.0_f32, bootstrap_value), |(gae, next_value), t| {
        let gae = if dones[t] {
            rewards[t] - values[t]
        } else {
            let delta = rewards[t] + gamma * next_value - values[t];
            delta + gamma * lambda * gae
        };
        advantages[t] = gae;
        (gae, values[t])
    });

    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    AdvantageEstimate { advantages, returns }
}

/// GAE followed by the stabilizing post-processing used for training
///
/// Advantages are clamped to `±ADVANTAGE_CLIP` and standardized; returns are
/// clamped to `±RETURN_CLIP`.
pub fn compute_training_targets(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    bootstrap_value: f32,
    params: GaeParams,
) -> AdvantageEstimate {
    let AdvantageEstimate { mut advantages, mut returns } =
        compute_gae(rewards, values, dones, bootstrap_value, params);

    for a in &mut advantages {
        *a = a.clamp(-ADVANTAGE_CLIP, ADVANTAGE_CLIP);
    }
    for r in &mut returns {
        *r = r.clamp(-RETURN_CLIP, RETURN_CLIP);
    }
    standardize(&mut advantages, NORMALIZE_EPS);

    AdvantageEstimate { advantages, returns }
}
