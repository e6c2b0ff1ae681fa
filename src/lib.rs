//! # Workspace Harvester Library
//!
//! An incremental, rate-limited collection engine for harvesting large,
//! paginated, quota-constrained workspace data sources (calendar events
//! across many calendars, file metadata across an organization) without
//! losing progress on timeout, crash, or quota exhaustion, and without
//! re-downloading unchanged content.
//!
//! ## Features
//!
//! - **Chunked Harvesting**: Time ranges are split into bounded windows so
//!   individual requests stay small and retry-safe
//! - **Adaptive Rate Limiting**: Rolling request budget with exponential
//!   backoff on quota signals
//! - **Resume Capability**: Atomic checkpointing after every unit; an
//!   interrupted run restarts exactly where it left off
//! - **Change Tracking**: Content-addressed catalog that classifies every
//!   item and records added/modified/removed diffs across runs
//! - **Partial-Failure Isolation**: One inaccessible calendar or query never
//!   aborts the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use workspace_harvester::collector::{CollectionOrchestrator, CollectorConfig};
//! use workspace_harvester::source::fixture::{FixtureFetcher, FixtureRoster};
//! use workspace_harvester::TimeRange;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = TimeRange::new(
//!     Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
//! )?;
//! let config = CollectorConfig::new("./data", range);
//!
//! let roster = FixtureRoster::from_file("./fixtures/roster.json")?;
//! let fetcher = FixtureFetcher::new("./fixtures");
//!
//! let orchestrator = CollectionOrchestrator::new(config);
//! let summary = orchestrator.run(&roster, &fetcher).await?;
//! println!("processed {} units", summary.units_processed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`source`] - Collaborator contracts (roster, fetcher, extractor) and
//!   the closed fetch-error taxonomy
//! - [`collector`] - Orchestration: chunk planning, rate limiting, retry,
//!   progress, and the run summary
//! - [`catalog`] - Content fingerprinting, classification, and change
//!   detection across runs
//! - [`resume`] - Checkpoint model with atomic persistence
//! - [`output`] - Per-unit append-only JSONL writers
//! - [`shutdown`] - Graceful cancellation shared across tasks

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content catalog and change tracking
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Collection orchestration
pub mod collector;

/// Observability metrics
pub mod metrics;

/// Per-unit output writers
pub mod output;

/// Resume capability for interrupted runs
pub mod resume;

/// Collaborator contracts for rosters, fetchers, and extractors
pub mod source;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

// Re-export commonly used types
pub use collector::{CollectionOrchestrator, CollectorConfig};
pub use source::{FetchError, Fetcher, Roster};

/// A half-open UTC time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the range
    pub start: DateTime<Utc>,
    /// Exclusive end of the range
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `end < start`.
    ///
    /// A zero-length range (`start == end`) is valid; the chunk planner
    /// turns it into a single empty window so the unit is still marked
    /// processed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end < start {
            return Err(format!("end ({end}) must not be before start ({start})"));
        }
        Ok(Self { start, end })
    }

    /// Whether the range contains no time at all.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Span of the range.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Whether `instant` falls inside the half-open interval.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Kind of harvestable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// A single calendar, harvested over time windows
    #[serde(rename = "calendar")]
    Calendar,
    /// A file-listing query, harvested over result pages
    #[serde(rename = "drive_query")]
    DriveQuery,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitKind::Calendar => "calendar",
            UnitKind::DriveQuery => "drive_query",
        };
        write!(f, "{s}")
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(UnitKind::Calendar),
            "drive_query" => Ok(UnitKind::DriveQuery),
            _ => Err(format!("Invalid unit kind: {s}")),
        }
    }
}

/// Whether a unit turned out to be reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccessState {
    /// Not attempted yet
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    /// At least one fetch succeeded
    #[serde(rename = "accessible")]
    Accessible,
    /// The source rejected our access
    #[serde(rename = "denied")]
    Denied,
}

/// One discrete harvestable entity: a calendar or a file-listing query.
///
/// Identity (`unit_id`, `kind`) is immutable after discovery; only
/// `access_state` is updated once the first fetch attempt resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionUnit {
    /// Stable identifier, unique within a roster (e.g. a calendar id)
    pub unit_id: String,
    /// Human-readable label (e.g. owner email or query description)
    pub display_name: String,
    /// What kind of entity this is
    pub kind: UnitKind,
    /// Reachability, resolved after the first fetch attempt
    #[serde(default)]
    pub access_state: AccessState,
}

impl CollectionUnit {
    /// Create a unit in the `Unknown` access state.
    pub fn new(
        unit_id: impl Into<String>,
        display_name: impl Into<String>,
        kind: UnitKind,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            display_name: display_name.into(),
            kind,
            access_state: AccessState::Unknown,
        }
    }

    /// Validate unit identity.
    pub fn validate(&self) -> Result<(), String> {
        if self.unit_id.is_empty() {
            return Err("Unit id cannot be empty".to_string());
        }
        if self.unit_id.contains(['/', '\\']) {
            return Err(format!(
                "Unit id must not contain path separators: {}",
                self.unit_id
            ));
        }
        Ok(())
    }
}

/// A single retrieved record (an event or a file's metadata).
///
/// Owned by the run that fetched it until appended to the unit's output
/// file, after which storage owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestedItem {
    /// The source's identifier for this record
    pub source_id: String,
    /// The unit this record was harvested from
    pub unit_id: String,
    /// The raw payload as returned by the source
    pub raw_payload: serde_json::Value,
    /// When this record was retrieved
    pub retrieved_at: DateTime<Utc>,
}

impl HarvestedItem {
    /// Wrap a raw payload, extracting the source id from its `id` field.
    ///
    /// Returns an error string for payloads with no usable id; callers
    /// treat that as a malformed item (skipped with a warning, never a
    /// unit failure).
    pub fn from_payload(
        unit_id: &str,
        raw_payload: serde_json::Value,
        retrieved_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let source_id = raw_payload
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "payload has no string `id` field".to_string())?;
        if source_id.is_empty() {
            return Err("payload `id` field is empty".to_string());
        }
        Ok(Self {
            source_id: source_id.to_string(),
            unit_id: unit_id.to_string(),
            raw_payload,
            retrieved_at,
        })
    }

    /// Size in bytes of the serialized payload, used for priority ranking.
    pub fn payload_size(&self) -> usize {
        serde_json::to_vec(&self.raw_payload)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}
