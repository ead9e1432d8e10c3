//! Rollout ingestion, storage and advantage estimation
//!
//! This module turns exported rollout files into training data:
//! - [`ingest`]: file discovery, validation and per-transition sanitization
//! - [`storage`]: struct-of-arrays rollout and epoch buffers
//! - [`sampling`]: adaptive minibatch sizing and ordered partitioning
//! - [`gae`]: Generalized Advantage Estimation with episode-boundary resets
//!
//! # Buffer Layout
//!
//! Every accepted rollout of an epoch is concatenated in file order into a
//! single [`EpochBuffer`]. Minibatches are contiguous ranges of that buffer,
//! so episode boundaries inside a minibatch are marked only by `done` flags.
//!
//! # Example
//!
//! ```rust
//! use carai_trainer::buffer::rollout::{parse_rollout, EpochBuffer, LoadOutcome};
//!
//! let json = r#"{"experiences": [{"state": [0.1, 0.2],
//!     "action": {"steer": 0.0, "throttle": 1.0, "brake": 0.0},
//!     "reward": 1.0, "done": true, "log_prob": -2.0, "value": 0.5}]}"#;
//!
//! let LoadOutcome::Loaded(rollout) = parse_rollout(json) else { panic!() };
//! let mut buffer = EpochBuffer::new(rollout.obs_dim);
//! buffer.extend(&rollout);
//! assert_eq!(buffer.len(), 1);
//! ```

pub mod gae;
pub mod ingest;
pub mod sampling;
pub mod storage;


pub use gae::{compute_gae, compute_training_targets, AdvantageEstimate, GaeParams};
pub use ingest::{
    discover_obs_dim, discover_rollout_files, load_epoch, load_rollout_file, parse_rollout,
    EpochLoad, LoadOutcome, SkipReason,
};
pub use sampling::{adaptive_batch_size, MinibatchPlan};
pub use storage::{EpochBuffer, Experience, RolloutBatch, RolloutData, ACTION_DIM};
