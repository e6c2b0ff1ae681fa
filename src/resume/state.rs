//! Checkpoint persistence: atomic writes, advisory locking, schema checks.
//!
//! The checkpoint file is rewritten after every unit, so the write path has
//! to survive a kill at any instant: serialize to a temp file in the same
//! directory, fsync, atomically rename over the target, fsync the parent.
//! An `fd-lock` advisory lock coordinates the unlikely case of two
//! processes pointed at the same data directory.

use super::checkpoint::{CollectionCheckpoint, SCHEMA_VERSION};
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Maximum allowed checkpoint file size, against unbounded-growth bugs.
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Errors from checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Stored schema version is not the supported one
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Supported schema version
        expected: String,
        /// Version found on disk
        found: String,
    },

    /// Checkpoint file exceeds the size bound
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),
}

impl CollectionCheckpoint {
    /// Atomically persist the checkpoint to `path`.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        debug!(
            path = %path.display(),
            units_processed = self.units_processed(),
            "Saving checkpoint"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Io(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        let lock_file = open_lock_file(path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| CheckpointError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| CheckpointError::Io(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| CheckpointError::Io(format!("Failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| CheckpointError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CheckpointError::Io(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| CheckpointError::Io(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    /// Load a checkpoint from `path`, validating size and schema version.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        debug!(path = %path.display(), "Loading checkpoint");

        let lock_file = open_lock_file(path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| CheckpointError::Lock(format!("Failed to acquire read lock: {e}")))?;

        let metadata =
            std::fs::metadata(path).map_err(|e| CheckpointError::Io(e.to_string()))?;
        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(CheckpointError::FileTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Io(e.to_string()))?;
        let checkpoint: CollectionCheckpoint = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize checkpoint");
            CheckpointError::Serialization(e.to_string())
        })?;

        if checkpoint.schema_version() != SCHEMA_VERSION {
            warn!(
                found_version = %checkpoint.schema_version(),
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(CheckpointError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: checkpoint.schema_version().to_string(),
            });
        }

        info!(
            run_id = %checkpoint.run_id(),
            units_processed = checkpoint.units_processed(),
            units_total = checkpoint.units_total(),
            "Checkpoint loaded"
        );
        Ok(checkpoint)
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File, CheckpointError> {
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| CheckpointError::Lock(format!("Failed to open lock file: {e}")))
}
