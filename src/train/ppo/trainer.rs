//! PPO Trainer implementation
//!
//! This module contains the main PPOTrainer struct and its training methods.
//! One call to [`PPOTrainer::train_step`] performs a single guarded
//! gradient update on one minibatch.

use tch::{Kind, Tensor};

use super::{
    config::PPOConfig,
    loss::{compute_entropy_loss, compute_policy_loss, compute_value_loss},
    optim::Adam,
    stats::{LossHistory, StepLosses},
};
use crate::{
    buffer::rollout::{compute_training_targets, RolloutBatch, ACTION_DIM},
    error::{Result, TrainerError},
    policy::gaussian::GaussianPolicy,
};

/// Why an optimization step was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// The minibatch holds no transitions
    EmptyBatch,
    /// A reward, value, log probability, observation or action was NaN/inf
    NonFiniteInput,
    /// The network produced a non-finite log probability or value
    NonFiniteForward,
    /// The combined loss was not finite
    NonFiniteLoss,
    /// Backpropagation produced a non-finite gradient norm
    NonFiniteGradient,
}

/// Result of a single optimization step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Parameters were updated
    Applied(StepLosses),
    /// Parameters are unchanged
    Skipped(SkipCause),
}

impl StepOutcome {
    /// Losses to record for this step; zero for a skipped step
    pub fn losses(&self) -> StepLosses {
        match self {
            StepOutcome::Applied(losses) => *losses,
            StepOutcome::Skipped(_) => StepLosses::default(),
        }
    }

    /// True if parameters were updated
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied(_))
    }
}

/// Loss tensors for one minibatch, still attached to the autograd graph
struct LossTerms {
    policy: Tensor,
    value: Tensor,
    entropy: Tensor,
    total: Tensor,
}

/// PPO Trainer for policy optimization
///
/// Owns the policy, the optimizer and the loss history. It is the only
/// component that mutates network parameters.
#[derive(Debug)]
pub struct PPOTrainer {
    config: PPOConfig,
    policy: GaussianPolicy,
    optimizer: Adam,
    history: LossHistory,
    total_steps: usize,
}

impl PPOTrainer {
    /// Create a new PPO trainer
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration parameters
    /// * `policy` - Policy network
    pub fn new(config: PPOConfig, policy: GaussianPolicy) -> Result<Self> {
        config.validate()?;
        let optimizer = Adam::new(policy.parameters(), config.learning_rate);

        Ok(Self { config, policy, optimizer, history: LossHistory::new(), total_steps: 0 })
    }

    /// Get reference to the policy
    pub fn policy(&self) -> &GaussianPolicy {
        &self.policy
    }

    /// Get the configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Get the optimizer
    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Get mutable access to the optimizer (state restore)
    pub fn optimizer_mut(&mut self) -> &mut Adam {
        &mut self.optimizer
    }

    /// Per-step loss history of applied updates
    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// Replace the loss history (resume from checkpoint)
    pub fn set_history(&mut self, history: LossHistory) {
        self.history = history;
    }

    /// Get total optimization steps attempted, including skipped ones
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Sample exploratory actions for a batch of observations
    ///
    /// Uses the configured `noise_std`. Returns `(actions, log_probs, values)`.
    pub fn sample_actions(&self, observations: &Tensor) -> (Tensor, Tensor, Tensor) {
        tch::no_grad(|| self.policy.sample_action(observations, self.config.noise_std))
    }

    /// Perform one PPO update on a minibatch
    ///
    /// This performs:
    /// 1. Input validation (non-finite values skip the step)
    /// 2. GAE with a zero bootstrap value, clamping and normalization
    /// 3. Policy evaluation and loss computation
    /// 4. Backward pass, global gradient-norm clipping and an Adam update
    ///
    /// Skipped steps leave parameters and optimizer state untouched and do
    /// not enter the loss history.
    ///
    /// # Arguments
    ///
    /// * `batch` - Contiguous minibatch of behavior transitions
    pub fn train_step(&mut self, batch: &RolloutBatch<'_>) -> Result<StepOutcome> {
        self.total_steps += 1;

        if batch.is_empty() {
            return Ok(self.skip(SkipCause::EmptyBatch));
        }
        if batch.obs_dim as i64 != self.policy.obs_dim() {
            return Err(TrainerError::InvalidConfig(format!(
                "batch observation width {} does not match network input {}",
                batch.obs_dim,
                self.policy.obs_dim()
            )));
        }
        if !batch.is_finite() {
            return Ok(self.skip(SkipCause::NonFiniteInput));
        }

        match self.compute_losses(batch)? {
            Ok(terms) => self.apply_update(terms),
            Err(cause) => Ok(self.skip(cause)),
        }
    }

    fn compute_losses(
        &self,
        batch: &RolloutBatch<'_>,
    ) -> Result<std::result::Result<LossTerms, SkipCause>> {
        let targets = compute_training_targets(
            batch.rewards,
            batch.values,
            batch.dones,
            0.0,
            self.config.gae_params(),
        );

        let device = self.policy.device();
        let n = batch.len() as i64;
        let observations =
            Tensor::from_slice(batch.observations).view([n, batch.obs_dim as i64]).to_device(device);
        let actions = Tensor::from_slice(batch.actions).view([n, ACTION_DIM as i64]).to_device(device);
        let old_log_probs = Tensor::from_slice(batch.log_probs).to_device(device);
        let old_values = Tensor::from_slice(batch.values).to_device(device);
        let advantages = Tensor::from_slice(&targets.advantages).to_device(device);
        let returns = Tensor::from_slice(&targets.returns).to_device(device);

        let eval = self.policy.evaluate(&observations, &actions);
        if !all_finite(&eval.log_probs)? || !all_finite(&eval.values)? {
            return Ok(Err(SkipCause::NonFiniteForward));
        }

        let (policy, clip_fraction, approx_kl) =
            compute_policy_loss(&eval.log_probs, &old_log_probs, &advantages, self.config.clip_range);
        let (value, explained_var) = compute_value_loss(
            &eval.values,
            &old_values,
            &returns,
            self.config.clip_range,
            self.config.vf_coef,
        );
        tracing::debug!(
            "clip_fraction={:.3} approx_kl={:.4} explained_var={:.3}",
            clip_fraction,
            approx_kl,
            explained_var
        );
        let entropy = compute_entropy_loss(&eval.entropy, self.config.ent_coef);
        let total = &policy + &value + &entropy;

        Ok(Ok(LossTerms { policy, value, entropy, total }))
    }

    fn apply_update(&mut self, terms: LossTerms) -> Result<StepOutcome> {
        let total_loss = f64::try_from(&terms.total)?;
        if !total_loss.is_finite() {
            return Ok(self.skip(SkipCause::NonFiniteLoss));
        }

        self.optimizer.zero_grad();
        terms.total.backward();

        let (grad_scale, grad_norm) = self.optimizer.clip_coefficient(self.config.max_grad_norm)?;
        if !grad_norm.is_finite() {
            self.optimizer.zero_grad();
            return Ok(self.skip(SkipCause::NonFiniteGradient));
        }
        self.optimizer.step(grad_scale);

        let losses = StepLosses {
            policy_loss: f64::try_from(&terms.policy)?,
            value_loss: f64::try_from(&terms.value)?,
            entropy_loss: f64::try_from(&terms.entropy)?,
            total_loss,
        };
        self.history.push(&losses);
        Ok(StepOutcome::Applied(losses))
    }

    fn skip(&self, cause: SkipCause) -> StepOutcome {
        tracing::debug!("Skipping optimization step {}: {:?}", self.total_steps, cause);
        StepOutcome::Skipped(cause)
    }
}

fn all_finite(tensor: &Tensor) -> Result<bool> {
    let finite = tensor.isfinite().all().to_kind(Kind::Int64);
    Ok(i64::try_from(finite)? == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::rollout::{EpochBuffer, Experience, RolloutData};
    use tch::Device;

    const OBS_DIM: usize = 4;

    fn buffer(steps: usize) -> EpochBuffer {
        let mut rollout = RolloutData::new(OBS_DIM);
        for t in 0..steps {
            let x = t as f32 / steps as f32;
            rollout.push(&Experience {
                state: vec![x, 1.0 - x, 0.5, -x],
                action: [x * 2.0 - 1.0, 0.8, 0.0],
                reward: if t % 3 == 0 { 1.0 } else { -0.5 },
                done: t + 1 == steps,
                log_prob: -2.5,
                value: 0.1,
            });
        }
        let mut buffer = EpochBuffer::new(OBS_DIM);
        buffer.extend(&rollout);
        buffer
    }

    fn trainer() -> PPOTrainer {
        let policy = GaussianPolicy::new(OBS_DIM as i64, Device::Cpu);
        PPOTrainer::new(PPOConfig::default(), policy).unwrap()
    }

    fn snapshot(trainer: &PPOTrainer) -> Vec<Tensor> {
        trainer.policy().parameters().iter().map(|p| p.detach().copy()).collect()
    }

    fn unchanged(before: &[Tensor], trainer: &PPOTrainer) -> bool {
        before.iter().zip(trainer.policy().parameters()).all(|(a, b)| a.equal(&b.detach()))
    }

    #[test]
    fn test_train_step_updates_parameters() {
        let mut trainer = trainer();
        let buffer = buffer(32);
        let before = snapshot(&trainer);

        let outcome = trainer.train_step(&buffer.as_batch()).unwrap();

        let StepOutcome::Applied(losses) = outcome else {
            panic!("expected an applied step, got {:?}", outcome);
        };
        assert!(losses.total_loss.is_finite());
        assert!((losses.total_loss - (losses.policy_loss + losses.value_loss + losses.entropy_loss)).abs() < 1e-4);
        assert!(losses.value_loss >= 0.0 && losses.value_loss <= 100.0);
        assert!(!unchanged(&before, &trainer));
        assert_eq!(trainer.history().len(), 1);
        assert_eq!(trainer.optimizer().step_count(), 1);
    }

    #[test]
    fn test_non_finite_input_is_skipped() {
        let mut trainer = trainer();
        let mut rollout = RolloutData::new(OBS_DIM);
        for t in 0..4 {
            rollout.push(&Experience {
                state: vec![0.0; OBS_DIM],
                action: [0.0, 0.0, 0.0],
                reward: if t == 2 { f32::NAN } else { 1.0 },
                done: false,
                log_prob: -1.0,
                value: 0.0,
            });
        }
        let mut buffer = EpochBuffer::new(OBS_DIM);
        buffer.extend(&rollout);
        let before = snapshot(&trainer);

        let outcome = trainer.train_step(&buffer.as_batch()).unwrap();

        assert_eq!(outcome, StepOutcome::Skipped(SkipCause::NonFiniteInput));
        assert_eq!(outcome.losses(), StepLosses::default());
        assert!(unchanged(&before, &trainer));
        assert!(trainer.history().is_empty());
    }

    #[test]
    fn test_nan_total_loss_leaves_parameters_unchanged() {
        let mut trainer = trainer();
        let buffer = buffer(16);
        let before = snapshot(&trainer);

        let mut terms = trainer.compute_losses(&buffer.as_batch()).unwrap().unwrap();
        terms.total = &terms.total * f64::NAN;
        let outcome = trainer.apply_update(terms).unwrap();

        assert_eq!(outcome, StepOutcome::Skipped(SkipCause::NonFiniteLoss));
        assert!(unchanged(&before, &trainer));
        assert_eq!(trainer.optimizer().step_count(), 0);
        assert!(trainer.history().is_empty());
    }

    #[test]
    fn test_non_finite_gradient_is_skipped() {
        let mut trainer = trainer();
        let buffer = buffer(16);
        let before = snapshot(&trainer);

        // sqrt at zero: the loss stays finite, its gradient does not
        let mut terms = trainer.compute_losses(&buffer.as_batch()).unwrap().unwrap();
        let log_std = trainer.policy().log_std();
        terms.total = &terms.total + (log_std - log_std.detach()).sum(Kind::Float).sqrt();
        let outcome = trainer.apply_update(terms).unwrap();

        assert_eq!(outcome, StepOutcome::Skipped(SkipCause::NonFiniteGradient));
        assert!(unchanged(&before, &trainer));
        assert_eq!(trainer.optimizer().step_count(), 0);
        assert!(trainer.history().is_empty());
        assert_eq!(trainer.optimizer().grad_norm().unwrap(), 0.0);
    }

    #[test]
    fn test_non_finite_forward_is_skipped() {
        let mut trainer = trainer();
        tch::no_grad(|| {
            let mut log_std = trainer.policy().log_std().shallow_clone();
            let _ = log_std.fill_(f64::NAN);
        });
        let buffer = buffer(8);

        let outcome = trainer.train_step(&buffer.as_batch()).unwrap();
        assert_eq!(outcome, StepOutcome::Skipped(SkipCause::NonFiniteForward));
        assert_eq!(trainer.total_steps(), 1);
    }

    #[test]
    fn test_width_mismatch_is_an_error() {
        let policy = GaussianPolicy::new(7, Device::Cpu);
        let mut trainer = PPOTrainer::new(PPOConfig::default(), policy).unwrap();
        let buffer = buffer(4);
        assert!(matches!(
            trainer.train_step(&buffer.as_batch()),
            Err(TrainerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_sample_actions() {
        let trainer = trainer();
        let obs = Tensor::zeros([5, OBS_DIM as i64], (Kind::Float, Device::Cpu));
        let (actions, log_probs, values) = trainer.sample_actions(&obs);
        assert_eq!(actions.size(), vec![5, 3]);
        assert_eq!(log_probs.size(), vec![5]);
        assert_eq!(values.size(), vec![5]);
    }
}
