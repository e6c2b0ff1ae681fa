//! Content catalog and change tracking.
//!
//! The catalog remembers every item ever sighted: its normalized content
//! fingerprint, category, and extraction priority. Diffing a new harvest
//! against it yields the added/modified/removed change stream that
//! downstream processing consumes.
//!
//! # Components
//!
//! - [`classify`] - Category mapping and processing priority
//! - [`hash`] - Normalized content fingerprinting
//! - [`diff`] - Change records and the full-outer-join diff
//! - [`store`] - Append-only persistence compacted on load

pub mod classify;
pub mod diff;
pub mod hash;
pub mod store;

pub use classify::ItemCategory;
pub use diff::{diff, ChangeOp, ChangeRecord};
pub use hash::content_fingerprint;
pub use store::{Catalog, CatalogEntry, Classification};

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal consistency violation
    #[error("catalog corrupt: {0}")]
    Corrupt(String),
}
