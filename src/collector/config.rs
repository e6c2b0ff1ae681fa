//! Collection configuration: documented defaults and the typed run config.

use crate::TimeRange;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum retry attempts for a chunk that failed with a retryable error.
/// 5 attempts with exponential backoff rides out transient network trouble
/// without looping forever on a persistently broken unit.
pub const MAX_CHUNK_RETRIES: u32 = 5;

/// Initial backoff for transient errors in milliseconds.
pub const INITIAL_RETRY_BACKOFF_MS: u64 = 1_000;

/// Cap for transient-error backoff in milliseconds.
/// 30 seconds keeps the worst-case chunk retry sequence near one minute.
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// Base delay after a quota signal, in seconds.
/// Provider quota windows typically clear within a few seconds; 3 s is the
/// observed safe floor before re-probing.
pub const QUOTA_BACKOFF_BASE_SECS: u64 = 3;

/// Cap for quota backoff, in seconds. Doubling stops here.
pub const QUOTA_BACKOFF_CAP_SECS: u64 = 120;

/// Jitter applied to quota backoff, as a fraction of the delay (±20 %).
/// Spreads re-probes so parallel runs don't stampede the quota window.
pub const QUOTA_BACKOFF_JITTER: f64 = 0.2;

/// Rolling rate-limit window length.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Requests allowed per rolling window. Sized for the most restrictive of
/// the harvested sources' per-minute user quotas.
pub const RATE_WINDOW_CAPACITY: u32 = 60;

/// Hard deadline for a single outbound call. Calls past this are abandoned
/// and recorded as a timeout failure, never left hanging.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum span of one calendar chunk window, in days.
pub const DEFAULT_MAX_CHUNK_SPAN_DAYS: i64 = 7;

/// Maximum items requested per page for page-chunked (drive-style) units.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Safety bound on pages per chunk, against a source that never stops
/// returning continuation tokens.
pub const MAX_PAGES_PER_CHUNK: u32 = 10_000;

/// Calculate exponential backoff for transient-error retries.
pub fn calculate_retry_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_RETRY_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    Duration::from_millis(delay_ms.min(MAX_RETRY_BACKOFF_MS))
}

/// Typed configuration for a collection run.
///
/// Replaces loose key-value configuration with named fields; every default
/// is a documented constant in this module.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root directory for all persisted artifacts of this data stream
    pub data_dir: PathBuf,
    /// Total time range to harvest for time-chunked units
    pub time_range: TimeRange,
    /// Maximum span of one chunk window
    pub max_chunk_span: chrono::Duration,
    /// Page size for page-chunked units
    pub page_size: usize,
    /// Retry budget per chunk
    pub max_chunk_retries: u32,
    /// Hard per-call deadline
    pub call_timeout: Duration,
    /// Requests allowed per rolling rate window
    pub window_capacity: u32,
    /// Rolling rate window length
    pub rate_window: Duration,
    /// Bound on units processed in one invocation (`None` = all)
    pub max_units: Option<usize>,
    /// Whether to sweep for removed items after processing a unit.
    /// Full collections set this; incremental windows leave it off since
    /// absence from a narrow window proves nothing.
    pub detect_removals: bool,
    /// Resume from the existing checkpoint instead of starting fresh
    pub resume: bool,
}

impl CollectorConfig {
    /// Create a config with documented defaults for everything but the
    /// data directory and time range.
    pub fn new(data_dir: impl Into<PathBuf>, time_range: TimeRange) -> Self {
        Self {
            data_dir: data_dir.into(),
            time_range,
            max_chunk_span: chrono::Duration::days(DEFAULT_MAX_CHUNK_SPAN_DAYS),
            page_size: DEFAULT_PAGE_SIZE,
            max_chunk_retries: MAX_CHUNK_RETRIES,
            call_timeout: CALL_TIMEOUT,
            window_capacity: RATE_WINDOW_CAPACITY,
            rate_window: RATE_WINDOW,
            max_units: None,
            detect_removals: false,
            resume: false,
        }
    }

    /// Override the maximum chunk span.
    pub fn with_max_chunk_span(mut self, span: chrono::Duration) -> Self {
        self.max_chunk_span = span;
        self
    }

    /// Override the page size for page-chunked units.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Override the per-chunk retry budget.
    pub fn with_max_chunk_retries(mut self, retries: u32) -> Self {
        self.max_chunk_retries = retries;
        self
    }

    /// Override the hard per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Override the rate window capacity.
    pub fn with_window_capacity(mut self, capacity: u32) -> Self {
        self.window_capacity = capacity;
        self
    }

    /// Bound the number of units processed by this invocation.
    pub fn with_max_units(mut self, max_units: usize) -> Self {
        self.max_units = Some(max_units);
        self
    }

    /// Enable the removed-item sweep (full collection mode).
    pub fn with_removal_detection(mut self, detect: bool) -> Self {
        self.detect_removals = detect;
        self
    }

    /// Resume from the existing checkpoint.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}
