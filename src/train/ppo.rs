//! Proximal Policy Optimization (PPO) algorithm
//!
//! This module implements the PPO update used to train the racing agent
//! from exported rollouts. PPO is a policy gradient method that uses a
//! clipped surrogate objective to ensure stable, reliable policy updates.
//!
//! # Update Overview
//!
//! ```text
//! For each minibatch (contiguous, in order):
//!   1. Reject non-finite inputs
//!   2. Compute advantages using GAE (bootstrap 0), clamp and normalize
//!   3. Evaluate the current policy on the behavior actions
//!   4. Compute clipped policy loss, dual-clipped value loss, entropy bonus
//!   5. Reject a non-finite total loss
//!   6. Backpropagate, clip the global gradient norm, Adam step
//! ```
//!
//! # Module Organization
//!
//! - [`config`]: hyperparameters with builder and validation
//! - [`loss`]: loss terms and their safety clamps
//! - [`optim`]: Adam with checkpointable moment estimates
//! - [`stats`]: per-step loss history and epoch aggregation
//! - [`trainer`]: the guarded single-step update
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [High-Dimensional Continuous Control Using GAE](https://arxiv.org/abs/1506.02438)

pub mod config;
pub mod loss;
pub mod optim;
pub mod stats;
pub mod trainer;

pub use config::PPOConfig;
pub use loss::{
    compute_entropy_loss, compute_policy_loss, compute_value_loss, explained_variance,
    probability_ratio,
};
pub use optim::Adam;
pub use stats::{EpochStats, LossHistory, StepLosses};
pub use trainer::{PPOTrainer, SkipCause, StepOutcome};
