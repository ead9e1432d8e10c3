//! Versioned training checkpoints
//!
//! A checkpoint holds everything needed to continue training or export a
//! policy: network parameters by layer role, Adam moments, and the per-step
//! loss history.
//!
//! - [`snapshot`]: serializable snapshot types and live-state capture/restore
//! - [`store`]: atomic file writes and checkpoint discovery

pub mod snapshot;
pub mod store;

pub use snapshot::{
    Checkpoint, LayerSnapshot, OptimizerSnapshot, ParameterSnapshot, TensorSnapshot,
    TrunkLayerRows, FORMAT_VERSION,
};
pub use store::{checkpoint_path, latest_checkpoint, list_checkpoints, load, save};
