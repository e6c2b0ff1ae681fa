//! Collection orchestration: the run state machine.
//!
//! `INIT -> DISCOVERING_UNITS -> PROCESSING_UNITS -> FINALIZING -> DONE`,
//! with `FAILED` reachable only on an authentication failure. Every other
//! error is isolated to the unit or item that produced it: the run keeps
//! going and reports the failures in its summary.

use crate::catalog::{Catalog, CatalogError, ChangeOp, ItemCategory};
use crate::collector::config::{calculate_retry_backoff, CollectorConfig, MAX_PAGES_PER_CHUNK};
use crate::collector::planner::{plan_for_unit, ChunkWindow};
use crate::collector::progress::ProgressTracker;
use crate::collector::rate_limit::RateLimiter;
use crate::collector::summary::CollectionSummary;
use crate::collector::CollectError;
use crate::metrics::RunMetrics;
use crate::output::{ItemWriter, JsonlUnitWriter};
use crate::resume::CollectionCheckpoint;
use crate::shutdown::{self, SharedShutdown};
use crate::source::{units::discover_units, ExtractorRegistry, FetchError, Fetcher, Roster};
use crate::{AccessState, CollectionUnit, HarvestedItem};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// File name of the run checkpoint under the data directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Subdirectory holding per-unit output files.
pub const UNITS_DIR: &str = "units";

/// Subdirectory holding the catalog logs.
pub const CATALOG_DIR: &str = "catalog";

/// Why one unit's processing stopped.
#[derive(Debug)]
enum UnitError {
    /// Unit-level failure with its stable category; the run continues
    Failed(&'static str),
    /// Unrecoverable for the whole run (authentication, broken storage)
    Fatal(CollectError),
    /// Cancellation was requested at a suspension point
    Cancelled,
}

impl From<CatalogError> for UnitError {
    fn from(e: CatalogError) -> Self {
        UnitError::Fatal(e.into())
    }
}

impl From<crate::output::OutputError> for UnitError {
    fn from(e: crate::output::OutputError) -> Self {
        UnitError::Fatal(e.into())
    }
}

impl From<crate::resume::CheckpointError> for UnitError {
    fn from(e: crate::resume::CheckpointError) -> Self {
        UnitError::Fatal(e.into())
    }
}

/// What one successfully processed unit produced.
#[derive(Debug)]
struct UnitOutcome {
    /// Item ids sighted while processing the unit
    sighted: BTreeSet<String>,
    /// Items appended to the unit's output file
    items_appended: u64,
    /// Whether this invocation covered the unit from its first chunk.
    /// A unit resumed mid-chunking did not, so a removal sweep over it
    /// would wrongly report the earlier chunks' items as removed.
    fully_covered: bool,
}

#[derive(Debug, Default)]
struct RunCounters {
    api_calls: u64,
    items_collected: u64,
    items_malformed: u64,
    changes_added: u64,
    changes_modified: u64,
    changes_removed: u64,
    categories: BTreeMap<ItemCategory, u64>,
}

/// Drives a collection run end to end.
pub struct CollectionOrchestrator {
    config: CollectorConfig,
    rate_limiter: Arc<RateLimiter>,
    extractors: ExtractorRegistry,
    progress_tracker: ProgressTracker,
    shutdown: Option<SharedShutdown>,
}

impl CollectionOrchestrator {
    /// Create an orchestrator for `config`, picking up the globally
    /// installed shutdown handle if one exists.
    pub fn new(config: CollectorConfig) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.window_capacity, config.rate_window));
        Self {
            config,
            rate_limiter,
            extractors: ExtractorRegistry::new(),
            progress_tracker: ProgressTracker::default(),
            shutdown: shutdown::global(),
        }
    }

    /// Attach a shutdown handle for cooperative cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Supply the extractor registry used for classification.
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// Override progress reporting cadence.
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// The limiter shared by everything this run sends.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_triggered())
            .unwrap_or(false)
    }

    /// Await `fut`, abandoning it if cancellation is requested first.
    async fn checked<F, T>(&self, fut: F) -> Result<T, UnitError>
    where
        F: Future<Output = T>,
    {
        match &self.shutdown {
            Some(shutdown) => {
                tokio::select! {
                    _ = shutdown.triggered() => Err(UnitError::Cancelled),
                    value = fut => Ok(value),
                }
            }
            None => Ok(fut.await),
        }
    }

    /// Execute a collection run.
    ///
    /// Always leaves the checkpoint and per-unit files consistent: a kill
    /// or cancellation between suspension points loses at most the chunk
    /// in flight, and `--resume` picks up from the persisted cursor.
    pub async fn run(
        &self,
        roster: &dyn Roster,
        fetcher: &dyn Fetcher,
    ) -> Result<CollectionSummary, CollectError> {
        let span = tracing::info_span!(
            "collection_run",
            data_dir = %self.config.data_dir.display(),
            range = %self.config.time_range,
        );
        let _enter = span.enter();
        let run_started = Instant::now();
        let metrics = RunMetrics::start();

        info!(phase = "discovering_units", "Discovering collection units");
        let mut units = discover_units(roster).await.map_err(|e| match e {
            FetchError::Authentication(message) => CollectError::Authentication(message),
            other => CollectError::Discovery(other.to_string()),
        })?;

        let checkpoint_path = self.config.data_dir.join(CHECKPOINT_FILE);
        let mut checkpoint = if self.config.resume && checkpoint_path.exists() {
            let mut loaded = CollectionCheckpoint::load(&checkpoint_path)?;
            loaded.set_units_total(units.len() as u64);
            loaded
        } else {
            CollectionCheckpoint::new(units.len() as u64)
        };

        let mut catalog = Catalog::open(self.config.data_dir.join(CATALOG_DIR))?;
        let units_dir = self.config.data_dir.join(UNITS_DIR);
        checkpoint.save(&checkpoint_path)?;

        info!(
            phase = "processing_units",
            run_id = %checkpoint.run_id(),
            units_total = units.len(),
            resumed = self.config.resume,
            "Processing units"
        );
        let mut counters = RunCounters::default();
        let mut progress = self.progress_tracker.create_state(units.len() as u64);
        let mut attempted_this_invocation = 0usize;

        for unit in &mut units {
            if checkpoint.is_processed(&unit.unit_id) {
                debug!(unit_id = %unit.unit_id, "Unit already processed - skipping");
                progress.unit_done();
                continue;
            }
            if let Some(max_units) = self.config.max_units {
                if attempted_this_invocation >= max_units {
                    info!(max_units, "Unit limit for this invocation reached");
                    break;
                }
            }
            if self.shutdown_requested() {
                info!("Cancellation requested - flushing checkpoint before exit");
                catalog.flush()?;
                checkpoint.save(&checkpoint_path)?;
                return Err(CollectError::Cancelled);
            }

            let unit_result = self
                .process_unit(
                    unit,
                    fetcher,
                    &mut catalog,
                    &mut checkpoint,
                    &checkpoint_path,
                    &units_dir,
                    &mut counters,
                    &metrics,
                )
                .await;
            attempted_this_invocation += 1;

            match unit_result {
                Ok(outcome) => {
                    progress.add_items(outcome.items_appended);
                    if self.config.detect_removals && outcome.fully_covered {
                        let removed =
                            catalog.sweep_removed(&unit.unit_id, &outcome.sighted, Utc::now())?;
                        counters.changes_removed += removed.len() as u64;
                        metrics.record_changes(0, 0, removed.len() as u64);
                    }
                    checkpoint.mark_processed(&unit.unit_id);
                    metrics.record_unit(true);
                    info!(
                        unit_id = %unit.unit_id,
                        items_sighted = outcome.sighted.len(),
                        "Unit processed"
                    );
                }
                Err(UnitError::Failed(category)) => {
                    checkpoint.mark_failed(&unit.unit_id, category);
                    metrics.record_unit(false);
                    warn!(
                        unit_id = %unit.unit_id,
                        category,
                        "Unit failed - continuing with next unit"
                    );
                }
                Err(UnitError::Cancelled) => {
                    info!("Cancellation requested - flushing checkpoint before exit");
                    catalog.flush()?;
                    checkpoint.save(&checkpoint_path)?;
                    return Err(CollectError::Cancelled);
                }
                Err(UnitError::Fatal(fatal)) => {
                    error!(phase = "failed", error = %fatal, "Unrecoverable error - aborting run");
                    let _ = catalog.flush();
                    let _ = checkpoint.save(&checkpoint_path);
                    return Err(fatal);
                }
            }

            checkpoint.save(&checkpoint_path)?;
            catalog.flush()?;
            progress.unit_done();
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }
        }

        info!(phase = "finalizing", "Writing run summary");
        let limiter_stats = self.rate_limiter.stats();
        let summary = CollectionSummary {
            run_id: checkpoint.run_id(),
            started_at: checkpoint.started_at(),
            finished_at: Utc::now(),
            duration_ms: run_started.elapsed().as_millis() as u64,
            units_total: checkpoint.units_total(),
            units_processed: checkpoint.units_processed(),
            units_failed: checkpoint.units_failed().clone(),
            api_calls: counters.api_calls,
            rate_limit_hits: limiter_stats.total_quota_hits,
            rate_limit_wait_ms: limiter_stats.total_wait.as_millis() as u64,
            items_collected: counters.items_collected,
            items_malformed: counters.items_malformed,
            changes_added: counters.changes_added,
            changes_modified: counters.changes_modified,
            changes_removed: counters.changes_removed,
            categories: counters
                .categories
                .iter()
                .map(|(category, count)| (category.to_string(), *count))
                .collect(),
            estimated_processing_cost: CollectionSummary::estimate_cost(&counters.categories),
        };
        summary
            .write(&self.config.data_dir)
            .map_err(|e| CollectError::Io(e.to_string()))?;
        catalog.close()?;

        info!(
            phase = "done",
            units_processed = summary.units_processed,
            units_failed = summary.units_failed.len(),
            items_collected = summary.items_collected,
            "Collection run complete"
        );
        Ok(summary)
    }

    /// Process one unit: plan its chunks, fetch each from the persisted
    /// cursor onwards, append output, classify, and advance the cursor.
    #[allow(clippy::too_many_arguments)]
    async fn process_unit(
        &self,
        unit: &mut CollectionUnit,
        fetcher: &dyn Fetcher,
        catalog: &mut Catalog,
        checkpoint: &mut CollectionCheckpoint,
        checkpoint_path: &Path,
        units_dir: &Path,
        counters: &mut RunCounters,
        metrics: &RunMetrics,
    ) -> Result<UnitOutcome, UnitError> {
        let windows = plan_for_unit(unit, self.config.time_range, self.config.max_chunk_span);
        let start_index = checkpoint.chunk_cursor(&unit.unit_id);
        if start_index > 0 {
            info!(
                unit_id = %unit.unit_id,
                chunk_cursor = start_index,
                "Resuming unit from persisted chunk cursor"
            );
        }

        // Starting from chunk 0 replaces any stale partial file; resuming
        // mid-unit appends after the chunks the cursor already covers.
        let mut writer = if start_index == 0 {
            JsonlUnitWriter::create(units_dir, &unit.unit_id)?
        } else {
            JsonlUnitWriter::open(units_dir, &unit.unit_id)?
        };
        let mut sighted = BTreeSet::new();

        for window in windows.iter().filter(|w| w.sequence_index >= start_index) {
            if window.range.is_empty() {
                debug!(
                    unit_id = %unit.unit_id,
                    "Empty window - nothing to fetch"
                );
            } else {
                self.fetch_window(
                    unit,
                    window,
                    fetcher,
                    catalog,
                    &mut writer,
                    &mut sighted,
                    counters,
                    metrics,
                )
                .await?;
            }
            // Chunks below the cursor are durably on disk before the
            // cursor says so.
            writer.flush()?;
            checkpoint.set_chunk_cursor(&unit.unit_id, window.sequence_index + 1);
            checkpoint.save(checkpoint_path)?;
        }

        let items_appended = writer.items_written();
        writer.close()?;
        Ok(UnitOutcome {
            sighted,
            items_appended,
            fully_covered: start_index == 0,
        })
    }

    /// Fetch every page of one chunk window, with bounded retries for
    /// quota, timeout, and transient failures.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_window(
        &self,
        unit: &mut CollectionUnit,
        window: &ChunkWindow,
        fetcher: &dyn Fetcher,
        catalog: &mut Catalog,
        writer: &mut JsonlUnitWriter,
        sighted: &mut BTreeSet<String>,
        counters: &mut RunCounters,
        metrics: &RunMetrics,
    ) -> Result<(), UnitError> {
        let mut page_token: Option<String> = None;
        let mut pages_fetched: u32 = 0;
        let mut retries: u32 = 0;

        loop {
            if pages_fetched >= MAX_PAGES_PER_CHUNK {
                error!(
                    unit_id = %unit.unit_id,
                    sequence_index = window.sequence_index,
                    pages = pages_fetched,
                    "Page limit exceeded for one chunk - source keeps returning continuation tokens"
                );
                return Err(UnitError::Failed("transient"));
            }

            let waited = self.checked(self.rate_limiter.acquire()).await?;
            if waited > Duration::ZERO {
                debug!(waited_ms = waited.as_millis() as u64, "Rate limiter delay");
            }

            let call = self
                .checked(timeout(
                    self.config.call_timeout,
                    fetcher.fetch(unit, window, page_token.as_deref(), self.config.page_size),
                ))
                .await?;
            let outcome = match call {
                Ok(result) => result,
                // The future was dropped at the deadline; the call is
                // abandoned, not left hanging.
                Err(_elapsed) => Err(FetchError::Timeout(self.config.call_timeout)),
            };
            counters.api_calls += 1;
            metrics.record_api_call();

            match outcome {
                Ok(page) => {
                    self.rate_limiter.report_success();
                    unit.access_state = AccessState::Accessible;
                    retries = 0;
                    pages_fetched += 1;

                    let retrieved_at = Utc::now();
                    for payload in page.items {
                        match HarvestedItem::from_payload(&unit.unit_id, payload, retrieved_at) {
                            Ok(item) => {
                                writer.write_item(&item)?;
                                let classified = catalog.classify(&item, &self.extractors)?;
                                sighted.insert(item.source_id.clone());
                                counters.items_collected += 1;
                                *counters
                                    .categories
                                    .entry(classified.entry.category)
                                    .or_insert(0) += 1;
                                metrics.record_item();
                                if let Some(change) = classified.change {
                                    match change.operation {
                                        ChangeOp::Added => {
                                            counters.changes_added += 1;
                                            metrics.record_changes(1, 0, 0);
                                        }
                                        ChangeOp::Modified => {
                                            counters.changes_modified += 1;
                                            metrics.record_changes(0, 1, 0);
                                        }
                                        ChangeOp::Removed => {
                                            counters.changes_removed += 1;
                                            metrics.record_changes(0, 0, 1);
                                        }
                                    }
                                }
                            }
                            Err(reason) => {
                                warn!(
                                    unit_id = %unit.unit_id,
                                    reason = %reason,
                                    "Skipping malformed item"
                                );
                                counters.items_malformed += 1;
                            }
                        }
                    }

                    match page.next_page_token {
                        Some(token) => page_token = Some(token),
                        None => return Ok(()),
                    }
                }
                Err(FetchError::Authentication(message)) => {
                    return Err(UnitError::Fatal(CollectError::Authentication(message)));
                }
                Err(FetchError::PermissionDenied(message)) => {
                    unit.access_state = AccessState::Denied;
                    warn!(unit_id = %unit.unit_id, message = %message, "Permission denied");
                    return Err(UnitError::Failed("permission_denied"));
                }
                Err(FetchError::QuotaExceeded) => {
                    let backoff = self.rate_limiter.report_quota_exceeded();
                    metrics.record_quota_hit();
                    retries += 1;
                    if retries > self.config.max_chunk_retries {
                        error!(
                            unit_id = %unit.unit_id,
                            retries,
                            "Quota retry budget exhausted"
                        );
                        return Err(UnitError::Failed("quota_exceeded"));
                    }
                    warn!(
                        unit_id = %unit.unit_id,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Quota exceeded - backing off and retrying chunk"
                    );
                    // The next acquire() waits out the backoff window.
                }
                Err(err @ (FetchError::Timeout(_) | FetchError::Transient(_))) => {
                    let category = err.category();
                    retries += 1;
                    if retries > self.config.max_chunk_retries {
                        error!(
                            unit_id = %unit.unit_id,
                            category,
                            retries,
                            "Retry budget exhausted"
                        );
                        return Err(UnitError::Failed(category));
                    }
                    let backoff = calculate_retry_backoff(retries);
                    warn!(
                        unit_id = %unit.unit_id,
                        category,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retryable fetch error - backing off"
                    );
                    self.checked(sleep(backoff)).await?;
                }
                Err(FetchError::Malformed(reason)) => {
                    warn!(
                        unit_id = %unit.unit_id,
                        reason = %reason,
                        "Uninterpretable page - skipping window remainder"
                    );
                    counters.items_malformed += 1;
                    return Ok(());
                }
            }
        }
    }
}
