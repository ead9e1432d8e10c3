//! Gaussian actor-critic MLP for continuous actions
//!
//! The policy outputs a diagonal Gaussian over `[steer, throttle, brake]`
//! together with a state-value estimate, as used by PPO.
//!
//! # Architecture
//!
//! ```text
//! Input (observations)
//!         |
//!   [Linear(128)] -> ReLU     trunk[0]
//!         |
//!   [Linear(128)] -> ReLU     trunk[1]
//!      /      \
//! [Linear(3)] [Linear(1)]
//!    tanh        |
//!     |        Value
//!   Mean
//!
//! std = clamp(exp(log_std), 0.01, 1.0)   (learned, state independent)
//! ```
//!
//! Parameters are held as an explicit ordered list of typed layers; see
//! [`GaussianPolicy::parameters`] for the canonical order.

use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Init, Module},
    Device, Kind, Tensor,
};

use crate::buffer::rollout::ACTION_DIM;

/// Lower clamp for the policy standard deviation
pub const STD_MIN: f64 = 0.01;

/// Upper clamp for the policy standard deviation
pub const STD_MAX: f64 = 1.0;

/// Initial standard deviation of the policy
///
/// `log_std` starts at `ln(INITIAL_STD)`, so the first rollouts explore with
/// std 0.5 rather than the clamp ceiling. Seeding the raw parameter with 0.5
/// instead would start every run saturated at `STD_MAX`.
pub const INITIAL_STD: f64 = 0.5;

/// `ln(2π)`
const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// Configuration for the network architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Width of each trunk layer, input to output
    pub hidden_sizes: Vec<i64>,
    /// Trunk activation
    pub activation: Activation,
}

/// Trunk nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified linear unit
    ReLU,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    fn apply(self, xs: &Tensor) -> Tensor {
        match self {
            Activation::ReLU => xs.relu(),
            Activation::Tanh => xs.tanh(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { hidden_sizes: vec![128, 128], activation: Activation::ReLU }
    }
}

/// Orthogonally initialised linear layer with a zero bias
///
/// `ws` has shape `[out_features, in_features]`.
fn linear(path: nn::Path, in_dim: i64, out_dim: i64, gain: f64) -> nn::Linear {
    let config = nn::LinearConfig {
        ws_init: Init::Orthogonal { gain },
        bs_init: Some(Init::Const(0.0)),
        bias: true,
    };
    nn::linear(path, in_dim, out_dim, config)
}

/// Weight then bias of `layer`, in parameter order
pub fn layer_tensors(layer: &nn::Linear) -> impl Iterator<Item = &Tensor> {
    std::iter::once(&layer.ws).chain(layer.bs.as_ref())
}

/// Log probabilities, values and entropy for a batch of actions
#[derive(Debug)]
pub struct PolicyEvaluation {
    /// Joint log probability of each action [batch]
    pub log_probs: Tensor,
    /// State values [batch]
    pub values: Tensor,
    /// Differential entropy summed over action dimensions [batch]
    pub entropy: Tensor,
}

/// Actor-critic policy with a diagonal Gaussian action distribution
///
/// Implements:
/// - Shared trunk with orthogonal initialization (gain √2)
/// - Policy-mean head squashed by `tanh` (gain 0.01, near-deterministic start)
/// - State-independent learned log standard deviation
/// - Value head (gain 1.0)
pub struct GaussianPolicy {
    vs: nn::VarStore,
    trunk: Vec<nn::Linear>,
    policy_mean: nn::Linear,
    log_std: Tensor,
    value_head: nn::Linear,
    obs_dim: i64,
    config: NetworkConfig,
}

impl std::fmt::Debug for GaussianPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianPolicy")
            .field("obs_dim", &self.obs_dim)
            .field("config", &self.config)
            .field("device", &self.vs.device())
            .finish()
    }
}

impl GaussianPolicy {
    /// Create a policy with the default architecture on `device`
    pub fn new(obs_dim: i64, device: Device) -> Self {
        Self::with_config(obs_dim, NetworkConfig::default(), device)
    }

    /// Create a policy with a custom architecture
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Observation width
    /// * `config` - Trunk widths and activation
    /// * `device` - Device to allocate parameters on
    pub fn with_config(obs_dim: i64, config: NetworkConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let mut trunk = Vec::with_capacity(config.hidden_sizes.len());
        let mut in_dim = obs_dim;
        for (idx, &width) in config.hidden_sizes.iter().enumerate() {
            trunk.push(linear(&root / "trunk" / idx, in_dim, width, 2.0_f64.sqrt()));
            in_dim = width;
        }

        let policy_mean = linear(&root / "policy_mean", in_dim, ACTION_DIM as i64, 0.01);
        let log_std =
            root.var("log_std", &[ACTION_DIM as i64], Init::Const(INITIAL_STD.ln()));
        let value_head = linear(&root / "value", in_dim, 1, 1.0);

        Self { vs, trunk, policy_mean, log_std, value_head, obs_dim, config }
    }

    /// Forward pass: action mean, standard deviation and state value
    ///
    /// Returns `(mean [batch, 3], std [batch, 3], value [batch])`. Pure; no
    /// sampling happens here.
    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor, Tensor) {
        let activation = self.config.activation;
        let features = self
            .trunk
            .iter()
            .fold(obs.shallow_clone(), |xs, layer| activation.apply(&layer.forward(&xs)));

        let mean = self.policy_mean.forward(&features).tanh();
        let std = self.log_std.exp().clamp(STD_MIN, STD_MAX).expand_as(&mean);
        let value = self.value_head.forward(&features).squeeze_dim(-1);
        (mean, std, value)
    }

    /// Sample actions with additional exploration noise
    ///
    /// The Gaussian's standard deviation is widened by `noise_std`. The
    /// returned log probability is that of the raw sample; the returned
    /// action is clamped to `[-1, 1]`.
    ///
    /// Returns `(action [batch, 3], log_prob [batch], value [batch])`.
    pub fn sample_action(&self, obs: &Tensor, noise_std: f64) -> (Tensor, Tensor, Tensor) {
        let (mean, std, value) = self.forward(obs);
        let std = std + noise_std;
        let sample = &mean + &std * Tensor::randn_like(&mean);
        let log_prob = gaussian_log_prob(&sample, &mean, &std);
        (sample.clamp(-1.0, 1.0), log_prob, value)
    }

    /// Log probability of `actions` under the current policy and state values
    ///
    /// Returns `(log_prob [batch], value [batch])`.
    pub fn evaluate_action(&self, obs: &Tensor, actions: &Tensor) -> (Tensor, Tensor) {
        let (mean, std, value) = self.forward(obs);
        (gaussian_log_prob(actions, &mean, &std), value)
    }

    /// Per-sample entropy of the action distribution [batch]
    ///
    /// The standard deviation is clamped to `[1e-6, 10]` for this term.
    pub fn entropy(&self, obs: &Tensor) -> Tensor {
        let (_, std, _) = self.forward(obs);
        gaussian_entropy(&std.clamp(1e-6, 10.0))
    }

    /// Log probabilities, values and entropy in a single forward pass
    pub fn evaluate(&self, obs: &Tensor, actions: &Tensor) -> PolicyEvaluation {
        let (mean, std, values) = self.forward(obs);
        let log_probs = gaussian_log_prob(actions, &mean, &std);
        let entropy = gaussian_entropy(&std.clamp(1e-6, 10.0));
        PolicyEvaluation { log_probs, values, entropy }
    }

    /// Observation width
    pub fn obs_dim(&self) -> i64 {
        self.obs_dim
    }

    /// Architecture configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Get the device this policy is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Trunk layers in forward order
    pub fn trunk(&self) -> &[nn::Linear] {
        &self.trunk
    }

    /// Policy-mean head
    pub fn policy_mean(&self) -> &nn::Linear {
        &self.policy_mean
    }

    /// Log standard deviation vector [ACTION_DIM]
    pub fn log_std(&self) -> &Tensor {
        &self.log_std
    }

    /// Value head
    pub fn value_head(&self) -> &nn::Linear {
        &self.value_head
    }

    /// Handles to every trainable tensor in canonical order
    ///
    /// `trunk[0].ws, trunk[0].bs, .., policy_mean.ws, policy_mean.bs,
    /// log_std, value.ws, value.bs`. The handles
    /// share storage with the network, so in-place updates on them update
    /// the policy. Optimizer state and checkpoints rely on this order.
    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = Vec::with_capacity(2 * self.trunk.len() + 5);
        for layer in self.trunk.iter().chain([&self.policy_mean]) {
            params.extend(layer_tensors(layer).map(Tensor::shallow_clone));
        }
        params.push(self.log_std.shallow_clone());
        params.extend(layer_tensors(&self.value_head).map(Tensor::shallow_clone));
        params
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> i64 {
        self.parameters().iter().map(Tensor::numel).map(|n| n as i64).sum()
    }
}

/// Joint log density of a diagonal Gaussian, summed over the last dimension
pub fn gaussian_log_prob(x: &Tensor, mean: &Tensor, std: &Tensor) -> Tensor {
    let var = std.square();
    let log_density: Tensor = -(x - mean).square() / (2.0 * var) - std.log() - 0.5 * LOG_2PI;
    log_density.sum_dim_intlist(-1, false, Kind::Float)
}

/// Differential entropy of a diagonal Gaussian, summed over the last dimension
pub fn gaussian_entropy(std: &Tensor) -> Tensor {
    (std.log() + 0.5 * (1.0 + LOG_2PI)).sum_dim_intlist(-1, false, Kind::Float)
}
