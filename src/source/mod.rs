//! Collaborator contracts consumed by the collection engine.
//!
//! The concrete calendar/drive wire formats live behind these traits; the
//! engine only sees opaque paginated list endpoints. Failures carry a
//! closed taxonomy so the orchestrator pattern-matches on failure category
//! instead of string-matching messages.

use crate::catalog::classify::ItemCategory;
use crate::collector::planner::ChunkWindow;
use crate::CollectionUnit;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod fixture;
pub mod units;

/// Fetch failure taxonomy.
///
/// Only [`FetchError::Authentication`] aborts a run; every other kind is
/// isolated to the unit or item that produced it.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Credentials are invalid or expired; no partial processing possible
    #[error("authentication failure: {0}")]
    Authentication(String),

    /// The source's request quota is exhausted; back off and retry
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The caller may not read this unit
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The call exceeded its deadline and was abandoned
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A retryable network-level failure
    #[error("transient error: {0}")]
    Transient(String),

    /// A single record could not be interpreted; skipped, never fatal
    #[error("malformed item: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short stable label used in checkpoints and summaries.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Authentication(_) => "authentication",
            FetchError::QuotaExceeded => "quota_exceeded",
            FetchError::PermissionDenied(_) => "permission_denied",
            FetchError::Timeout(_) => "timeout",
            FetchError::Transient(_) => "transient",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Discovery-time metadata for one harvestable entity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UnitMetadata {
    /// Human-readable label (owner email, query description)
    pub display_name: String,
    /// What kind of unit this is
    pub kind: crate::UnitKind,
}

/// One page of raw items from a fetch call.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    /// Raw records in source order
    pub items: Vec<serde_json::Value>,
    /// Continuation token; `None` means the window is exhausted
    pub next_page_token: Option<String>,
}

impl FetchPage {
    /// Whether another page should be requested for the same window.
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

/// Enumerates the entities available for harvesting.
#[async_trait]
pub trait Roster: Send + Sync {
    /// Map of unit id to metadata for every known entity.
    ///
    /// Returned as an ordered map: unit ordering (and therefore checkpoint
    /// resumption) is lexicographic on unit id.
    async fn list_known_entities(&self) -> FetchResult<BTreeMap<String, UnitMetadata>>;
}

/// One paginated call against the external source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one page of raw items for `unit` within `window`.
    ///
    /// `page_token` is `None` for the first page of a window and the
    /// previous page's continuation token afterwards. Implementations must
    /// surface quota, permission, and transient conditions as their
    /// distinct [`FetchError`] variants.
    async fn fetch(
        &self,
        unit: &CollectionUnit,
        window: &ChunkWindow,
        page_token: Option<&str>,
        page_size: usize,
    ) -> FetchResult<FetchPage>;
}

/// Pluggable per-category text extraction.
///
/// A category with no registered extractor is simply not extractable; the
/// catalog records that rather than failing.
pub trait Extractor: Send + Sync {
    /// Extract text from a raw item, or `None` when the item carries none.
    fn extract(&self, raw_item: &serde_json::Value) -> Option<String>;
}

/// Registry mapping categories to their extractors.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<ItemCategory, std::sync::Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry (nothing extractable).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor for a category, replacing any previous one.
    pub fn register(&mut self, category: ItemCategory, extractor: std::sync::Arc<dyn Extractor>) {
        self.extractors.insert(category, extractor);
    }

    /// Whether `category` has a registered extractor.
    pub fn supports(&self, category: ItemCategory) -> bool {
        self.extractors.contains_key(&category)
    }

    /// Run the registered extractor for `category`, if any.
    pub fn extract(
        &self,
        category: ItemCategory,
        raw_item: &serde_json::Value,
    ) -> Option<String> {
        self.extractors.get(&category)?.extract(raw_item)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("categories", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}
