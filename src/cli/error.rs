//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::collector::CollectError;
use crate::output::OutputError;
use crate::resume::CheckpointError;
use crate::source::FetchError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Collection error
    #[error("collection error: {0}")]
    Collect(#[from] CollectError),

    /// Fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Checkpoint error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
