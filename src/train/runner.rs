//! Epoch loop over exported rollouts
//!
//! Each epoch reloads every rollout file, concatenates the valid ones into a
//! single buffer, runs one PPO step per contiguous minibatch and writes a
//! checkpoint.
//!
//! ```text
//! Idle -> Loading -> (no valid data: skip epoch)
//!                 -> Training -> Checkpointing -> next epoch | Done
//! ```
//!
//! A shared stop flag is checked between epochs and between minibatches.
//! An epoch interrupted halfway is not checkpointed.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tch::Device;

use super::ppo::{EpochStats, PPOConfig, PPOTrainer, StepLosses, StepOutcome};
use crate::{
    buffer::rollout::{
        adaptive_batch_size, discover_obs_dim, discover_rollout_files, load_epoch, MinibatchPlan,
    },
    checkpoint::{self, Checkpoint},
    error::{Result, TrainerError},
    policy::gaussian::{GaussianPolicy, NetworkConfig},
};

/// Epoch count used when none (or zero) is requested
pub const DEFAULT_EPOCHS: usize = 10;

/// Requested compute device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceChoice {
    /// Run on the CPU
    #[default]
    Cpu,
    /// Run on the first CUDA device, falling back to the CPU
    Cuda,
}

impl DeviceChoice {
    /// Resolve to a concrete device
    ///
    /// A CUDA request without an available GPU logs a warning and uses the CPU.
    pub fn resolve(self) -> Device {
        match self {
            DeviceChoice::Cpu => Device::Cpu,
            DeviceChoice::Cuda if tch::Cuda::is_available() => Device::Cuda(0),
            DeviceChoice::Cuda => {
                tracing::warn!("CUDA requested but not available, falling back to CPU");
                Device::Cpu
            }
        }
    }
}

impl FromStr for DeviceChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda),
            other => Err(format!("unknown device '{}', expected 'cpu' or 'cuda'", other)),
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Everything a training run needs, built once and handed to the runner
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    /// Directory holding `rollout_*.json` files
    pub export_dir: PathBuf,
    /// Directory receiving `model_epoch_{k}.bin` checkpoints
    pub model_dir: PathBuf,
    /// Number of epochs to run
    pub epochs: usize,
    /// Requested compute device
    pub device: DeviceChoice,
    /// Checkpoint to continue from
    pub resume: Option<PathBuf>,
    /// Network architecture
    pub network: NetworkConfig,
    /// PPO hyperparameters
    pub ppo: PPOConfig,
}

impl TrainerConfig {
    /// Create a configuration with default training settings
    pub fn new(export_dir: impl Into<PathBuf>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            model_dir: model_dir.into(),
            epochs: DEFAULT_EPOCHS,
            device: DeviceChoice::Cpu,
            resume: None,
            network: NetworkConfig::default(),
            ppo: PPOConfig::default(),
        }
    }

    /// Set the number of epochs; zero selects [`DEFAULT_EPOCHS`]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = if epochs == 0 { DEFAULT_EPOCHS } else { epochs };
        self
    }

    /// Set the compute device
    pub fn device(mut self, device: DeviceChoice) -> Self {
        self.device = device;
        self
    }

    /// Continue from a checkpoint
    pub fn resume(mut self, checkpoint: impl Into<PathBuf>) -> Self {
        self.resume = Some(checkpoint.into());
        self
    }

    /// Set the network architecture
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set the PPO hyperparameters
    pub fn ppo(mut self, ppo: PPOConfig) -> Self {
        self.ppo = ppo;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainerError::InvalidConfig("epochs must be positive".into()));
        }
        if self.network.hidden_sizes.is_empty() || self.network.hidden_sizes.iter().any(|&h| h <= 0)
        {
            return Err(TrainerError::InvalidConfig(
                "hidden_sizes must be a non-empty list of positive widths".into(),
            ));
        }
        self.ppo.validate()
    }
}

/// Mean/min/max of per-rollout total rewards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardStats {
    /// Mean episode reward
    pub mean: f32,
    /// Lowest episode reward
    pub min: f32,
    /// Highest episode reward
    pub max: f32,
}

impl RewardStats {
    /// Summarize `rewards`; `None` when empty
    pub fn from_rewards(rewards: &[f32]) -> Option<Self> {
        if rewards.is_empty() {
            return None;
        }
        let mean = rewards.iter().sum::<f32>() / rewards.len() as f32;
        let min = rewards.iter().copied().fold(f32::INFINITY, f32::min);
        let max = rewards.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Some(Self { mean, min, max })
    }
}

/// Summary of one trained epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// Epoch number (1-based, continues after a resumed checkpoint)
    pub epoch: usize,
    /// Rollout files that contributed data
    pub rollouts_loaded: usize,
    /// Rollout files rejected as malformed
    pub rollouts_malformed: usize,
    /// Rollout files with the wrong observation width
    pub rollouts_mismatched: usize,
    /// Transitions in the epoch buffer
    pub samples: usize,
    /// Minibatch size used
    pub batch_size: usize,
    /// Minibatches visited
    pub num_batches: usize,
    /// Mean losses over all steps (skipped steps count as zero)
    pub mean_losses: StepLosses,
    /// Losses of the final step
    pub final_losses: StepLosses,
    /// Steps skipped for numerical reasons
    pub skipped_steps: usize,
    /// Episode reward summary of the loaded rollouts
    pub rewards: Option<RewardStats>,
    /// Wall-clock time of the epoch
    pub elapsed: Duration,
    /// Checkpoint written for this epoch
    pub checkpoint: PathBuf,
}

/// Summary of a finished or interrupted run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Epochs that trained and wrote a checkpoint
    pub epochs_completed: usize,
    /// Epochs aborted because no rollout held valid data
    pub epochs_without_data: usize,
    /// True if the stop flag ended the run early
    pub interrupted: bool,
    /// Wall-clock time of the whole run
    pub total_time: Duration,
    /// Directory holding the checkpoints
    pub model_dir: PathBuf,
    /// Per-epoch reports in order
    pub reports: Vec<EpochReport>,
}

impl RunSummary {
    /// Average wall-clock time per completed epoch
    pub fn average_epoch_time(&self) -> Duration {
        match u32::try_from(self.epochs_completed) {
            Ok(n) if n > 0 => self.total_time / n,
            _ => Duration::ZERO,
        }
    }

    /// Checkpoint of the last completed epoch
    pub fn last_checkpoint(&self) -> Option<&Path> {
        self.reports.last().map(|report| report.checkpoint.as_path())
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The export directory contained no rollout files
    NoRollouts,
    /// Rollout files exist but none holds a valid transition, so the
    /// observation width is unknown
    NoValidRollouts {
        /// Rollout files examined
        files: usize,
    },
    /// Training ran (possibly interrupted, see [`RunSummary::interrupted`])
    Completed(RunSummary),
}

enum EpochResult {
    Trained(EpochReport),
    NoData,
    Interrupted,
}

/// Drives epochs of PPO training over exported rollouts
#[derive(Debug)]
pub struct TrainingRunner {
    config: TrainerConfig,
    stop: Arc<AtomicBool>,
}

impl TrainingRunner {
    /// Create a runner
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, stop: Arc::new(AtomicBool::new(false)) })
    }

    /// Share an existing stop flag
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Flag that ends the run at the next minibatch or epoch boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Get the configuration
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run the configured number of epochs
    ///
    /// # Errors
    ///
    /// Fails if the model directory or a checkpoint cannot be written, or
    /// if the resume checkpoint does not fit the network. Missing or unusable
    /// rollouts are reported through [`RunOutcome`] instead.
    pub fn run(&self) -> Result<RunOutcome> {
        let config = &self.config;
        tracing::info!("Export dir: {}", config.export_dir.display());
        tracing::info!("Model dir: {}", config.model_dir.display());
        tracing::info!("Epochs: {}", config.epochs);

        let files = discover_rollout_files(&config.export_dir)?;
        if files.is_empty() {
            tracing::warn!(
                "No rollout files found in {}; export rollouts from the simulator first",
                config.export_dir.display()
            );
            return Ok(RunOutcome::NoRollouts);
        }
        tracing::info!("Found {} rollout files", files.len());

        let Some(obs_dim) = discover_obs_dim(&files) else {
            tracing::error!(
                "Could not determine observation size: none of {} rollout files holds a valid transition",
                files.len()
            );
            return Ok(RunOutcome::NoValidRollouts { files: files.len() });
        };
        tracing::info!("Observation size: {}", obs_dim);

        let device = config.device.resolve();
        tracing::info!("Training on device: {:?}", device);

        std::fs::create_dir_all(&config.model_dir)
            .map_err(|e| TrainerError::io(&config.model_dir, e))?;

        let policy = GaussianPolicy::with_config(obs_dim as i64, config.network.clone(), device);
        let mut trainer = PPOTrainer::new(config.ppo.clone(), policy)?;

        let first_epoch = match &config.resume {
            Some(path) => {
                let checkpoint = checkpoint::load(path)?;
                checkpoint.restore_into(&mut trainer)?;
                tracing::info!(
                    "Resumed from {} (epoch {}, {} recorded steps)",
                    path.display(),
                    checkpoint.epoch,
                    checkpoint.history.len()
                );
                checkpoint.epoch + 1
            }
            None => 1,
        };
        let last_epoch = first_epoch + config.epochs - 1;

        let start = Instant::now();
        let mut reports = Vec::with_capacity(config.epochs);
        let mut epochs_without_data = 0;
        let mut interrupted = false;

        for epoch in first_epoch..=last_epoch {
            if self.should_stop() {
                interrupted = true;
                break;
            }
            tracing::info!("=== Epoch {}/{} ===", epoch, last_epoch);

            match self.run_epoch(epoch, &files, obs_dim, &mut trainer)? {
                EpochResult::Trained(report) => reports.push(report),
                EpochResult::NoData => epochs_without_data += 1,
                EpochResult::Interrupted => {
                    interrupted = true;
                    break;
                }
            }
        }

        let summary = RunSummary {
            epochs_completed: reports.len(),
            epochs_without_data,
            interrupted,
            total_time: start.elapsed(),
            model_dir: config.model_dir.clone(),
            reports,
        };

        if summary.interrupted {
            tracing::warn!("Training interrupted after {} epochs", summary.epochs_completed);
        }
        tracing::info!(
            "Training finished: {} epochs in {:.1}s ({:.1}s per epoch)",
            summary.epochs_completed,
            summary.total_time.as_secs_f64(),
            summary.average_epoch_time().as_secs_f64()
        );
        tracing::info!("Models saved in: {}", summary.model_dir.display());

        Ok(RunOutcome::Completed(summary))
    }

    fn run_epoch(
        &self,
        epoch: usize,
        files: &[PathBuf],
        obs_dim: usize,
        trainer: &mut PPOTrainer,
    ) -> Result<EpochResult> {
        let start = Instant::now();
        let load = load_epoch(files, obs_dim);
        tracing::info!(
            "Rollouts: {} loaded, {} skipped ({} malformed, {} wrong observation size)",
            load.loaded,
            load.skipped(),
            load.malformed,
            load.mismatched
        );

        if load.buffer.is_empty() {
            tracing::warn!("No valid data in epoch {}, skipping", epoch);
            return Ok(EpochResult::NoData);
        }

        let samples = load.buffer.len();
        let batch_size = adaptive_batch_size(trainer.policy().device().is_cuda(), samples);
        let plan = MinibatchPlan::new(samples, batch_size);
        let log_points = plan.log_points();
        tracing::info!(
            "Samples: {} | Batches: {} | Batch size: {}",
            samples,
            plan.num_batches,
            plan.batch_size
        );

        let mut stats = EpochStats::new();
        for (idx, range) in plan.ranges().enumerate() {
            if self.should_stop() {
                tracing::warn!("Stop requested, discarding partial epoch {}", epoch);
                return Ok(EpochResult::Interrupted);
            }

            let outcome = trainer.train_step(&load.buffer.batch(range))?;
            match &outcome {
                StepOutcome::Applied(losses) => stats.record(losses),
                StepOutcome::Skipped(_) => stats.record_skip(),
            }

            if log_points.contains(&idx) {
                let losses = outcome.losses();
                let progress = (idx + 1) as f64 / plan.num_batches as f64 * 100.0;
                tracing::info!(
                    "  [{:.0}%] Policy: {:.4} | Value: {:.4} | Total: {:.4}",
                    progress,
                    losses.policy_loss,
                    losses.value_loss,
                    losses.total_loss
                );
            }
        }

        if stats.skipped > 0 {
            tracing::warn!(
                "{} of {} steps skipped due to non-finite values",
                stats.skipped,
                stats.steps()
            );
        }

        let path = checkpoint::checkpoint_path(&self.config.model_dir, epoch);
        checkpoint::save(&Checkpoint::capture(epoch, trainer)?, &path)?;

        let report = EpochReport {
            epoch,
            rollouts_loaded: load.loaded,
            rollouts_malformed: load.malformed,
            rollouts_mismatched: load.mismatched,
            samples,
            batch_size: plan.batch_size,
            num_batches: plan.num_batches,
            mean_losses: stats.mean(),
            final_losses: stats.last(),
            skipped_steps: stats.skipped,
            rewards: RewardStats::from_rewards(&load.episode_rewards),
            elapsed: start.elapsed(),
            checkpoint: path,
        };
        log_epoch(&report);
        Ok(EpochResult::Trained(report))
    }
}

fn log_epoch(report: &EpochReport) {
    tracing::info!(
        "  [OK] Epoch {} finished ({:.1}s), saved {}",
        report.epoch,
        report.elapsed.as_secs_f64(),
        report.checkpoint.display()
    );
    let mean = &report.mean_losses;
    tracing::info!(
        "    Mean: Policy={:.4} | Value={:.4} | Total={:.4}",
        mean.policy_loss,
        mean.value_loss,
        mean.total_loss
    );
    tracing::info!(
        "    Final: Policy={:.4} | Value={:.4}",
        report.final_losses.policy_loss,
        report.final_losses.value_loss
    );
    if let Some(rewards) = &report.rewards {
        tracing::info!(
            "    Episode reward: mean={:.2} min={:.2} max={:.2}",
            rewards.mean,
            rewards.min,
            rewards.max
        );
    }
}
