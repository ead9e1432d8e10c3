//! Serializable snapshots of the network, optimizer and loss history

use serde::{Deserialize, Serialize};
use tch::{nn, Device, Kind, Tensor};

use crate::{
    buffer::rollout::ACTION_DIM,
    error::{Result, TrainerError},
    policy::gaussian::{Activation, GaussianPolicy},
    train::ppo::{optim::Adam, stats::LossHistory, trainer::PPOTrainer},
};

/// Version written into every checkpoint
pub const FORMAT_VERSION: u32 = 1;

/// Row-major f32 tensor contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSnapshot {
    /// Dimensions
    pub shape: Vec<i64>,
    /// Flattened values
    pub data: Vec<f32>,
}

impl TensorSnapshot {
    /// Copy a tensor to host memory
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let shape = tensor.size();
        let flat = tensor.detach().to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
        let data = Vec::<f32>::try_from(&flat)?;
        Ok(Self { shape, data })
    }

    /// Rebuild a CPU tensor
    pub fn to_tensor(&self) -> Result<Tensor> {
        let numel: i64 = self.shape.iter().product();
        if numel < 0 || numel as usize != self.data.len() {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "tensor of shape {:?} holds {} values",
                self.shape,
                self.data.len()
            )));
        }
        Ok(Tensor::from_slice(&self.data).reshape(self.shape.as_slice()))
    }
}

/// Weight matrix and bias vector of one linear layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    /// Weights [out, in]
    pub weight: TensorSnapshot,
    /// Bias [out], absent for bias-free layers
    pub bias: Option<TensorSnapshot>,
}

impl LayerSnapshot {
    fn capture(layer: &nn::Linear) -> Result<Self> {
        Ok(Self {
            weight: TensorSnapshot::from_tensor(&layer.ws)?,
            bias: layer.bs.as_ref().map(TensorSnapshot::from_tensor).transpose()?,
        })
    }

    fn tensors(&self) -> impl Iterator<Item = &TensorSnapshot> {
        std::iter::once(&self.weight).chain(self.bias.as_ref())
    }

    /// Output width
    pub fn out_features(&self) -> i64 {
        self.weight.shape.first().copied().unwrap_or(0)
    }

    /// Input width
    pub fn in_features(&self) -> i64 {
        self.weight.shape.get(1).copied().unwrap_or(0)
    }
}

/// All network parameters, by layer role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    /// Trunk layers in forward order
    pub trunk: Vec<LayerSnapshot>,
    /// Policy-mean head
    pub policy_mean: LayerSnapshot,
    /// Log standard deviation [ACTION_DIM]
    pub log_std: TensorSnapshot,
    /// Value head
    pub value: LayerSnapshot,
}

impl ParameterSnapshot {
    /// Capture the current parameters of `policy`
    pub fn capture(policy: &GaussianPolicy) -> Result<Self> {
        Ok(Self {
            trunk: policy.trunk().iter().map(LayerSnapshot::capture).collect::<Result<_>>()?,
            policy_mean: LayerSnapshot::capture(policy.policy_mean())?,
            log_std: TensorSnapshot::from_tensor(policy.log_std())?,
            value: LayerSnapshot::capture(policy.value_head())?,
        })
    }

    /// Tensors in the canonical parameter order of [`GaussianPolicy::parameters`]
    pub fn tensors(&self) -> Vec<&TensorSnapshot> {
        let mut tensors = Vec::with_capacity(2 * self.trunk.len() + 5);
        for layer in self.trunk.iter().chain([&self.policy_mean]) {
            tensors.extend(layer.tensors());
        }
        tensors.push(&self.log_std);
        tensors.extend(self.value.tensors());
        tensors
    }

    /// Trunk widths, input to output
    pub fn hidden_sizes(&self) -> Vec<i64> {
        self.trunk.iter().map(LayerSnapshot::out_features).collect()
    }

    /// Copy the snapshot into a live network
    ///
    /// Every tensor must match the network's shape; nothing is written
    /// unless all of them do.
    pub fn restore_into(&self, policy: &GaussianPolicy) -> Result<()> {
        let targets = policy.parameters();
        let sources = self.tensors();
        if targets.len() != sources.len() {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "checkpoint has {} parameter tensors, network has {}",
                sources.len(),
                targets.len()
            )));
        }

        let mut restored = Vec::with_capacity(sources.len());
        for (idx, (target, source)) in targets.iter().zip(&sources).enumerate() {
            if target.size() != source.shape {
                return Err(TrainerError::IncompatibleCheckpoint(format!(
                    "parameter {} has shape {:?} in checkpoint, {:?} in network",
                    idx,
                    source.shape,
                    target.size()
                )));
            }
            restored.push(source.to_tensor()?.to_device(target.device()));
        }

        tch::no_grad(|| -> Result<()> {
            for (target, source) in targets.into_iter().zip(&restored) {
                let mut target = target;
                target.f_copy_(source)?;
            }
            Ok(())
        })
    }
}

/// Adam moments and hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSnapshot {
    /// Updates applied so far
    pub step: u64,
    /// Learning rate at save time
    pub lr: f64,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Denominator epsilon
    pub eps: f64,
    /// First moments in parameter order
    pub exp_avg: Vec<TensorSnapshot>,
    /// Second moments in parameter order
    pub exp_avg_sq: Vec<TensorSnapshot>,
}

impl OptimizerSnapshot {
    /// Capture the state of `optimizer`
    pub fn capture(optimizer: &Adam) -> Result<Self> {
        let (beta1, beta2, eps) = optimizer.hyperparameters();
        Ok(Self {
            step: optimizer.step_count(),
            lr: optimizer.learning_rate(),
            beta1,
            beta2,
            eps,
            exp_avg: optimizer.exp_avg().iter().map(TensorSnapshot::from_tensor).collect::<Result<_>>()?,
            exp_avg_sq: optimizer
                .exp_avg_sq()
                .iter()
                .map(TensorSnapshot::from_tensor)
                .collect::<Result<_>>()?,
        })
    }

    /// Load moments and step count into `optimizer`
    ///
    /// The optimizer keeps its own learning rate.
    pub fn restore_into(&self, optimizer: &mut Adam) -> Result<()> {
        let exp_avg = self.exp_avg.iter().map(TensorSnapshot::to_tensor).collect::<Result<_>>()?;
        let exp_avg_sq =
            self.exp_avg_sq.iter().map(TensorSnapshot::to_tensor).collect::<Result<_>>()?;
        optimizer.load_state(self.step, exp_avg, exp_avg_sq)
    }
}

/// A complete, self-describing training snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Layout version, see [`FORMAT_VERSION`]
    pub format_version: u32,
    /// Epoch that produced this checkpoint (1-based)
    pub epoch: usize,
    /// Observation width
    pub obs_dim: i64,
    /// Action width
    pub action_dim: usize,
    /// Trunk activation
    pub activation: Activation,
    /// Network parameters
    pub parameters: ParameterSnapshot,
    /// Optimizer state
    pub optimizer: OptimizerSnapshot,
    /// Per-step loss history
    pub history: LossHistory,
}

/// One trunk layer, flattened row-major for export
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrunkLayerRows<'a> {
    /// Position in the trunk
    pub index: usize,
    /// Input width
    pub in_features: i64,
    /// Output width
    pub out_features: i64,
    /// `out_features` rows of `in_features` weights
    pub weights: &'a [f32],
    /// Bias per output, empty for bias-free layers
    pub biases: &'a [f32],
}

impl Checkpoint {
    /// Snapshot a trainer at the end of `epoch`
    pub fn capture(epoch: usize, trainer: &PPOTrainer) -> Result<Self> {
        let policy = trainer.policy();
        Ok(Self {
            format_version: FORMAT_VERSION,
            epoch,
            obs_dim: policy.obs_dim(),
            action_dim: ACTION_DIM,
            activation: policy.config().activation,
            parameters: ParameterSnapshot::capture(policy)?,
            optimizer: OptimizerSnapshot::capture(trainer.optimizer())?,
            history: trainer.history().clone(),
        })
    }

    /// Check that this checkpoint fits the trainer's network
    pub fn validate_for(&self, policy: &GaussianPolicy) -> Result<()> {
        if self.obs_dim != policy.obs_dim() {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "checkpoint observation width {} does not match {}",
                self.obs_dim,
                policy.obs_dim()
            )));
        }
        if self.action_dim != ACTION_DIM {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "checkpoint action width {} does not match {}",
                self.action_dim, ACTION_DIM
            )));
        }
        let hidden = self.parameters.hidden_sizes();
        if hidden != policy.config().hidden_sizes {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "checkpoint hidden sizes {:?} do not match {:?}",
                hidden,
                policy.config().hidden_sizes
            )));
        }
        if self.activation != policy.config().activation {
            return Err(TrainerError::IncompatibleCheckpoint(format!(
                "checkpoint activation {:?} does not match {:?}",
                self.activation,
                policy.config().activation
            )));
        }
        Ok(())
    }

    /// Restore parameters, optimizer state and history into `trainer`
    pub fn restore_into(&self, trainer: &mut PPOTrainer) -> Result<()> {
        self.validate_for(trainer.policy())?;
        self.parameters.restore_into(trainer.policy())?;
        self.optimizer.restore_into(trainer.optimizer_mut())?;
        trainer.set_history(self.history.clone());
        Ok(())
    }

    /// Trunk layers in index order with row-major weights
    pub fn trunk_rows_flattened(&self) -> Vec<TrunkLayerRows<'_>> {
        self.parameters
            .trunk
            .iter()
            .enumerate()
            .map(|(index, layer)| TrunkLayerRows {
                index,
                in_features: layer.in_features(),
                out_features: layer.out_features(),
                weights: &layer.weight.data,
                biases: layer.bias.as_ref().map_or(&[][..], |bias| bias.data.as_slice()),
            })
            .collect()
    }
}
