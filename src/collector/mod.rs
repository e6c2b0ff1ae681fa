//! Collection orchestration.
//!
//! This module drives a complete run: chunk planning, rate limiting, retry
//! classes, incremental persistence, checkpointing, and the terminal
//! summary.
//!
//! # Overview
//!
//! 1. **Configuration**: Describe the run with [`config::CollectorConfig`]
//! 2. **Execution**: Drive it with [`orchestrator::CollectionOrchestrator`]
//! 3. **Rate Limiting**: Automatic throttling via [`rate_limit::RateLimiter`]
//! 4. **Chunk Planning**: Bounded windows via [`planner::plan`]
//! 5. **Resume Support**: Atomic checkpointing after every unit
//!
//! # Error Handling
//!
//! Operations return `Result<T, CollectError>`. Only authentication
//! failures abort a run; unit- and item-level failures are recorded and
//! the run continues.
//!
//! # Related Modules
//!
//! - [`crate::source`] - Collaborator contracts the orchestrator consumes
//! - [`crate::catalog`] - Change tracking fed during processing
//! - [`crate::resume`] - Checkpoint persistence

pub mod config;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod rate_limit;
pub mod summary;

pub use config::CollectorConfig;
pub use orchestrator::CollectionOrchestrator;
pub use planner::{plan, plan_for_unit, ChunkWindow};
pub use rate_limit::{quota_backoff, RateLimitStats, RateLimiter};
pub use summary::CollectionSummary;

use crate::catalog::CatalogError;
use crate::output::OutputError;
use crate::resume::CheckpointError;

/// Collection run errors
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Credentials are invalid; the whole run is aborted
    #[error("authentication failure: {0}")]
    Authentication(String),

    /// Unit discovery failed before any processing could start
    #[error("unit discovery failed: {0}")]
    Discovery(String),

    /// Cancellation was requested; the checkpoint on disk is resumable
    #[error("collection cancelled - checkpoint flushed and resumable")]
    Cancelled,

    /// Catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Checkpoint error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}
