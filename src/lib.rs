//! # carai-trainer
//!
//! Offline PPO trainer for the racing car agent.
//!
//! The simulator exports episodes as `rollout_*.json` files. This crate
//! reads them, trains a Gaussian actor-critic policy with Proximal Policy
//! Optimization and Generalized Advantage Estimation (via tch-rs), and
//! writes a checkpoint after every epoch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use carai_trainer::prelude::*;
//!
//! # fn main() -> carai_trainer::Result<()> {
//! let config = TrainerConfig::new("exports", "models").epochs(5);
//! match TrainingRunner::new(config)?.run()? {
//!     RunOutcome::NoRollouts | RunOutcome::NoValidRollouts { .. } => {
//!         println!("nothing to train on")
//!     }
//!     RunOutcome::Completed(summary) => println!("{} epochs", summary.epochs_completed),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types
pub mod error;

/// Rollout ingestion, storage and advantage estimation
pub mod buffer;

/// Policy and neural network implementations
pub mod policy;

/// Training algorithms (PPO) and the epoch loop
pub mod train;

/// Versioned training checkpoints
pub mod checkpoint;

/// Utility functions and helpers
pub mod utils;

pub use error::{Result, TrainerError};

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        buffer::rollout::{EpochBuffer, LoadOutcome, RolloutBatch, RolloutData},
        checkpoint::Checkpoint,
        error::{Result, TrainerError},
        policy::gaussian::{Activation, GaussianPolicy, NetworkConfig},
        train::{
            DeviceChoice, PPOConfig, PPOTrainer, RunOutcome, RunSummary, StepOutcome,
            TrainerConfig, TrainingRunner,
        },
    };
}

/// Current version of carai-trainer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
