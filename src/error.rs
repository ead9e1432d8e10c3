//! Error types for the trainer
//!
//! Only conditions that end a run live here. Recoverable conditions
//! (malformed rollout files, numerically unstable optimization steps) are
//! reported through tagged outcome enums at their call sites instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that terminate a training run
#[derive(Debug, Error)]
pub enum TrainerError {
    /// Filesystem failure (export directory listing, model directory, checkpoint write)
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// libtorch reported an error
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// Checkpoint could not be encoded or decoded
    #[error("checkpoint codec error: {0}")]
    CheckpointCodec(#[from] bincode::Error),

    /// Checkpoint does not match the running network
    #[error("incompatible checkpoint: {0}")]
    IncompatibleCheckpoint(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrainerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, TrainerError>;
