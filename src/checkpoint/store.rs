//! Checkpoint files on disk
//!
//! Files are bincode-encoded [`Checkpoint`]s named `model_epoch_{k}.bin`.
//! Every write goes to a temporary file in the target directory and is
//! renamed over the destination, so a reader never sees a partial file.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use super::snapshot::{Checkpoint, FORMAT_VERSION};
use crate::error::{Result, TrainerError};

const CHECKPOINT_PREFIX: &str = "model_epoch_";
const CHECKPOINT_SUFFIX: &str = ".bin";

/// Path of the checkpoint for `epoch` inside `model_dir`
pub fn checkpoint_path(model_dir: &Path, epoch: usize) -> PathBuf {
    model_dir.join(format!("{}{}{}", CHECKPOINT_PREFIX, epoch, CHECKPOINT_SUFFIX))
}

/// Atomically write `checkpoint` to `path`
pub fn save(checkpoint: &Checkpoint, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TrainerError::io(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        bincode::serialize_into(&mut writer, checkpoint)?;
        writer.flush().map_err(|e| TrainerError::io(&tmp_path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| TrainerError::io(&tmp_path, e))?;
    tmp.persist(path).map_err(|e| TrainerError::io(path, e.error))?;
    Ok(())
}

/// Read a checkpoint and check its format version
pub fn load(path: &Path) -> Result<Checkpoint> {
    let file = File::open(path).map_err(|e| TrainerError::io(path, e))?;
    let checkpoint: Checkpoint = bincode::deserialize_from(BufReader::new(file))?;
    if checkpoint.format_version != FORMAT_VERSION {
        return Err(TrainerError::IncompatibleCheckpoint(format!(
            "{} has format version {}, expected {}",
            path.display(),
            checkpoint.format_version,
            FORMAT_VERSION
        )));
    }
    Ok(checkpoint)
}

/// Checkpoints in `model_dir` as `(epoch, path)`, ordered by epoch
///
/// A missing directory yields an empty list.
pub fn list_checkpoints(model_dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    if !model_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(model_dir).map_err(|e| TrainerError::io(model_dir, e))?;

    let mut found: Vec<(usize, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let epoch = name
                .to_str()?
                .strip_prefix(CHECKPOINT_PREFIX)?
                .strip_suffix(CHECKPOINT_SUFFIX)?
                .parse()
                .ok()?;
            Some((epoch, entry.path()))
        })
        .collect();
    found.sort_by_key(|(epoch, _)| *epoch);
    Ok(found)
}

/// Most recent checkpoint in `model_dir`, if any
pub fn latest_checkpoint(model_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(list_checkpoints(model_dir)?.pop().map(|(_, path)| path))
}
