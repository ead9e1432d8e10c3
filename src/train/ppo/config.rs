//! PPO configuration and hyperparameters
//!
//! This module defines the configuration parameters for PPO training
//! and provides validation and builder pattern methods.

use serde::{Deserialize, Serialize};

use crate::{
    buffer::rollout::GaeParams,
    error::{Result, TrainerError},
};

/// PPO configuration parameters
///
/// Defaults are tuned for the racing agent: a low learning rate and a
/// comparatively strong entropy bonus to keep steering exploratory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PPOConfig {
    /// Learning rate for policy and value function
    pub learning_rate: f64,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon), also used for value clipping
    pub clip_range: f64,

    /// Value function loss coefficient
    pub vf_coef: f64,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Maximum global gradient norm
    pub max_grad_norm: f64,

    /// Extra standard deviation added when sampling exploratory actions
    pub noise_std: f64,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            vf_coef: 0.5,
            ent_coef: 0.05,
            max_grad_norm: 0.5,
            noise_std: 0.5,
        }
    }
}

impl PPOConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(TrainerError::InvalidConfig(msg.to_string()));

        let values = [
            self.learning_rate,
            self.gamma,
            self.gae_lambda,
            self.clip_range,
            self.vf_coef,
            self.ent_coef,
            self.max_grad_norm,
            self.noise_std,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return invalid("hyperparameters must be finite");
        }
        if self.learning_rate <= 0.0 {
            return invalid("learning_rate must be positive");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid("gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return invalid("gae_lambda must be in [0, 1]");
        }
        if self.clip_range <= 0.0 {
            return invalid("clip_range must be positive");
        }
        if self.vf_coef < 0.0 {
            return invalid("vf_coef must be non-negative");
        }
        if self.ent_coef < 0.0 {
            return invalid("ent_coef must be non-negative");
        }
        if self.max_grad_norm <= 0.0 {
            return invalid("max_grad_norm must be positive");
        }
        if self.noise_std < 0.0 {
            return invalid("noise_std must be non-negative");
        }
        Ok(())
    }

    /// Discounting parameters for advantage estimation
    pub fn gae_params(&self) -> GaeParams {
        GaeParams { gamma: self.gamma as f32, lambda: self.gae_lambda as f32 }
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    /// Set value function loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set exploration noise
    pub fn noise_std(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PPOConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.ent_coef, 0.05);
        assert_eq!(config.max_grad_norm, 0.5);
    }

    #[test]
    fn test_config_validation() {
        // Invalid learning rate
        let config = PPOConfig::new().learning_rate(-1.0);
        assert!(matches!(config.validate(), Err(TrainerError::InvalidConfig(_))));

        // NaN is rejected too
        let config = PPOConfig::new().learning_rate(f64::NAN);
        assert!(config.validate().is_err());

        // Invalid gamma
        let config = PPOConfig::new().gamma(1.5);
        assert!(config.validate().is_err());

        // Invalid clip_range
        let config = PPOConfig::new().clip_range(-0.1);
        assert!(config.validate().is_err());

        // Invalid vf_coef (should allow 0.0)
        let config = PPOConfig::new().vf_coef(-0.1);
        assert!(config.validate().is_err());
        let config = PPOConfig::new().vf_coef(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PPOConfig::new().learning_rate(1e-3).gamma(0.95).clip_range(0.1);

        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.gamma, 0.95);
        assert_eq!(config.clip_range, 0.1);

        // Other values should remain default
        assert_eq!(config.gae_lambda, 0.95);
        assert_eq!(config.vf_coef, 0.5);

        let gae = config.gae_params();
        assert!((gae.gamma - 0.95).abs() < 1e-7);
        assert!((gae.lambda - 0.95).abs() < 1e-7);
    }
}
