//! Training algorithms
//!
//! This module implements the PPO update and the epoch loop that drives it.

pub mod ppo;
pub mod runner;

pub use ppo::{
    Adam, EpochStats, LossHistory, PPOConfig, PPOTrainer, SkipCause, StepLosses, StepOutcome,
};
pub use runner::{
    DeviceChoice, EpochReport, RunOutcome, RunSummary, TrainerConfig, TrainingRunner,
};
