//! Resume capability: the run checkpoint and its atomic persistence.
//!
//! A kill between units leaves the checkpoint and the per-unit output files
//! consistent; restarting with `--resume` skips every unit the checkpoint
//! marks processed and re-enters the in-flight unit at its chunk cursor.

pub mod checkpoint;
pub mod state;

pub use checkpoint::CollectionCheckpoint;
pub use state::{CheckpointError, MAX_CHECKPOINT_FILE_SIZE};
