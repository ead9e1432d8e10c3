//! Rollout file discovery and validation
//!
//! Rollout files are JSON documents written by the simulation, one per
//! collected episode:
//!
//! ```text
//! {
//!   "experiences": [
//!     { "state": [..], "action": {"steer": s, "throttle": t, "brake": b},
//!       "reward": r, "done": false, "log_prob": lp, "value": v },
//!     ...
//!   ],
//!   "total_reward": 12.5          (optional)
//! }
//! ```
//!
//! Loading never fails at file granularity: every file either yields a
//! [`RolloutData`] or a [`SkipReason`]. Individual transitions that are
//! missing fields are dropped; non-finite numbers are replaced by `0.0`.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde_json::Value;

use super::storage::{EpochBuffer, Experience, RolloutData, ACTION_DIM};
use crate::error::{Result, TrainerError};

/// File name prefix of rollout exports
pub const ROLLOUT_PREFIX: &str = "rollout_";

/// File name suffix of rollout exports
pub const ROLLOUT_SUFFIX: &str = ".json";

/// Why a rollout file was not used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// File could not be read as UTF-8 text
    Unreadable,
    /// Content is empty or does not end with a closing `}` or `]`
    Truncated,
    /// Content is not valid JSON
    InvalidJson,
    /// No `experiences` array at the top level
    MissingExperiences,
    /// `experiences` array is empty
    EmptyExperiences,
    /// Every transition was missing a required field
    NoValidTransitions,
}

/// Result of loading one rollout file
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// File produced at least one valid transition
    Loaded(RolloutData),
    /// File was rejected
    Skipped(SkipReason),
}

impl LoadOutcome {
    /// Get the loaded rollout, if any
    pub fn into_loaded(self) -> Option<RolloutData> {
        match self {
            LoadOutcome::Loaded(data) => Some(data),
            LoadOutcome::Skipped(_) => None,
        }
    }
}

/// List rollout files in `dir`, sorted by file name
///
/// A missing directory yields an empty list.
pub fn discover_rollout_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TrainerError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TrainerError::io(dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(ROLLOUT_PREFIX) && name.ends_with(ROLLOUT_SUFFIX));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load and validate one rollout file
pub fn load_rollout_file(path: &Path) -> LoadOutcome {
    match fs::read_to_string(path) {
        Ok(content) => parse_rollout(&content),
        Err(_) => LoadOutcome::Skipped(SkipReason::Unreadable),
    }
}

/// Parse rollout JSON content
pub fn parse_rollout(content: &str) -> LoadOutcome {
    let content = content.trim();
    if content.is_empty() || !(content.ends_with('}') || content.ends_with(']')) {
        return LoadOutcome::Skipped(SkipReason::Truncated);
    }

    let root: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => return LoadOutcome::Skipped(SkipReason::InvalidJson),
    };

    let Some(experiences) = root.get("experiences").and_then(Value::as_array) else {
        return LoadOutcome::Skipped(SkipReason::MissingExperiences);
    };
    if experiences.is_empty() {
        return LoadOutcome::Skipped(SkipReason::EmptyExperiences);
    }

    // The first valid transition fixes this file's width
    let mut rollout: Option<RolloutData> = None;
    for exp in experiences.iter().filter_map(parse_experience) {
        let data = rollout.get_or_insert_with(|| RolloutData::new(exp.state.len()));
        data.push(&exp);
    }

    match rollout {
        Some(mut data) if !data.is_empty() => {
            data.total_reward = match root.get("total_reward") {
                Some(v) if v.is_number() => sanitize(v),
                _ => data.rewards.iter().sum(),
            };
            LoadOutcome::Loaded(data)
        }
        _ => LoadOutcome::Skipped(SkipReason::NoValidTransitions),
    }
}

/// Parse a single transition, or `None` if a required field is missing
fn parse_experience(exp: &Value) -> Option<Experience> {
    let state = exp.get("state")?.as_array()?.iter().map(sanitize).collect();

    let action = exp.get("action")?;
    let action: [f32; ACTION_DIM] = [
        sanitize(action.get("steer")?),
        sanitize(action.get("throttle")?),
        sanitize(action.get("brake")?),
    ];

    Some(Experience {
        state,
        action,
        reward: sanitize(exp.get("reward")?),
        done: exp.get("done").is_some_and(parse_done),
        log_prob: sanitize(exp.get("log_prob")?),
        value: sanitize(exp.get("value")?),
    })
}

/// Episode-end flag: a boolean, or any non-zero number
fn parse_done(value: &Value) -> bool {
    match value {
        Value::Bool(done) => *done,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

/// Numeric value as a finite `f32`, or `0.0`
fn sanitize(value: &Value) -> f32 {
    value.as_f64().map(|v| v as f32).filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Find the observation width of the first file with a valid transition
///
/// Files are examined in the order given; there is no retry once a width
/// has been found.
pub fn discover_obs_dim(files: &[PathBuf]) -> Option<usize> {
    files
        .iter()
        .find_map(|path| load_rollout_file(path).into_loaded())
        .map(|data| data.obs_dim)
}

/// Transitions and bookkeeping for one epoch's load pass
#[derive(Debug, Clone, Default)]
pub struct EpochLoad {
    /// Concatenated transitions of every accepted file
    pub buffer: EpochBuffer,
    /// Files accepted
    pub loaded: usize,
    /// Files rejected as malformed or empty
    pub malformed: usize,
    /// Files rejected because of an observation width mismatch
    pub mismatched: usize,
    /// Cumulative reward of each accepted episode
    pub episode_rewards: Vec<f32>,
}

impl EpochLoad {
    /// Total files rejected for any reason
    pub fn skipped(&self) -> usize {
        self.malformed + self.mismatched
    }
}

/// Load every file for one epoch, keeping only those of width `obs_dim`
pub fn load_epoch(files: &[PathBuf], obs_dim: usize) -> EpochLoad {
    let mut load = EpochLoad { buffer: EpochBuffer::new(obs_dim), ..Default::default() };

    for path in files {
        match load_rollout_file(path) {
            LoadOutcome::Loaded(data) => {
                if load.buffer.extend(&data) {
                    load.loaded += 1;
                    load.episode_rewards.push(data.total_reward);
                } else {
                    load.mismatched += 1;
                }
            }
            LoadOutcome::Skipped(_) => load.malformed += 1,
        }
    }

    load
}
