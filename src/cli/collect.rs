//! Collect command implementation.

use crate::collector::{CollectionOrchestrator, CollectionSummary, CollectorConfig};
use crate::shutdown::SharedShutdown;
use crate::source::fixture::{FixtureFetcher, FixtureRoster};
use crate::TimeRange;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::{CliError, StatusArgs};

/// Default harvest window when `--since` is omitted, in days back from the
/// end of the range. Matches the incremental collection cadence.
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Try to parse a datetime from RFC3339, with or without an explicit
/// timezone designator (no designator means UTC).
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// Parse a range start from YYYY-MM-DD or RFC3339.
///
/// Date-only input means start-of-day UTC.
fn parse_start_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid start time: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid start time".to_string()))?;
    Ok(datetime.and_utc())
}

/// Parse a range end from YYYY-MM-DD or RFC3339.
///
/// Date-only input means end-of-day UTC so the named date is fully
/// included.
fn parse_end_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid end time: {e}")))?;
    let datetime = date
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| CliError::InvalidArgument("Invalid end time".to_string()))?;
    Ok(datetime.and_utc())
}

/// Workspace data harvester
#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Incremental workspace data collection")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a collection over the configured sources
    Collect(CollectArgs),
    /// Show checkpoint and last-summary state for a data directory
    Status(StatusArgs),
}

/// Arguments for the collect command
#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Directory holding all persisted run artifacts
    #[arg(long, default_value = "./harvest_data")]
    pub data_dir: PathBuf,

    /// Directory holding the roster and per-unit source files
    #[arg(long, default_value = "./fixtures")]
    pub fixtures: PathBuf,

    /// Roster file; defaults to roster.json inside the fixtures directory
    #[arg(long)]
    pub roster: Option<PathBuf>,

    /// Range start (YYYY-MM-DD or RFC3339); defaults to the lookback
    /// window before the range end
    #[arg(long)]
    pub since: Option<String>,

    /// Range end (YYYY-MM-DD or RFC3339); defaults to now
    #[arg(long)]
    pub until: Option<String>,

    /// Process at most this many units in this invocation
    #[arg(long)]
    pub max_units: Option<usize>,

    /// Resume from the existing checkpoint instead of starting fresh
    #[arg(long)]
    pub resume: bool,

    /// Full collection: also sweep the catalog for removed items
    #[arg(long)]
    pub full: bool,

    /// Maximum chunk window span in days
    #[arg(long, default_value_t = crate::collector::config::DEFAULT_MAX_CHUNK_SPAN_DAYS)]
    pub max_chunk_span_days: i64,

    /// Page size for page-chunked units
    #[arg(long, default_value_t = crate::collector::config::DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl CollectArgs {
    fn time_range(&self) -> Result<TimeRange, CliError> {
        let until = match &self.until {
            Some(raw) => parse_end_time_flexible(raw)?,
            None => Utc::now(),
        };
        let since = match &self.since {
            Some(raw) => parse_start_time_flexible(raw)?,
            None => until - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
        };
        TimeRange::new(since, until).map_err(CliError::InvalidArgument)
    }

    /// Execute the collect command.
    pub async fn execute(
        &self,
        shutdown: SharedShutdown,
    ) -> Result<CollectionSummary, CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        }

        let range = self.time_range()?;
        if self.max_chunk_span_days <= 0 {
            return Err(CliError::InvalidArgument(
                "max-chunk-span-days must be at least 1".to_string(),
            ));
        }

        let roster_path = self
            .roster
            .clone()
            .unwrap_or_else(|| self.fixtures.join("roster.json"));
        let roster = FixtureRoster::from_file(&roster_path)?;
        let fetcher = FixtureFetcher::new(&self.fixtures);

        let mut config = CollectorConfig::new(&self.data_dir, range)
            .with_max_chunk_span(chrono::Duration::days(self.max_chunk_span_days))
            .with_page_size(self.page_size)
            .with_removal_detection(self.full)
            .with_resume(self.resume);
        if let Some(max_units) = self.max_units {
            config = config.with_max_units(max_units);
        }

        info!(
            data_dir = %self.data_dir.display(),
            range = %range,
            resume = self.resume,
            full = self.full,
            "Starting collection"
        );

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("collecting");
        spinner.enable_steady_tick(Duration::from_millis(120));

        let orchestrator = CollectionOrchestrator::new(config).with_shutdown(shutdown);
        let result = orchestrator.run(&roster, &fetcher).await;
        spinner.finish_and_clear();

        let summary = result?;
        print_summary(&summary);
        Ok(summary)
    }
}

fn print_summary(summary: &CollectionSummary) {
    println!("Collection run {} finished", summary.run_id);
    println!(
        "  units:   {}/{} processed, {} failed",
        summary.units_processed,
        summary.units_total,
        summary.units_failed.len()
    );
    println!(
        "  items:   {} collected, {} malformed",
        summary.items_collected, summary.items_malformed
    );
    println!(
        "  changes: {} added, {} modified, {} removed",
        summary.changes_added, summary.changes_modified, summary.changes_removed
    );
    println!(
        "  api:     {} calls, {} rate-limit hits, {:.1}s waiting",
        summary.api_calls,
        summary.rate_limit_hits,
        summary.rate_limit_wait_ms as f64 / 1000.0
    );
    if !summary.categories.is_empty() {
        println!("  categories:");
        for (category, count) in &summary.categories {
            println!("    {category}: {count}");
        }
    }
    println!(
        "  estimated processing cost: {}",
        summary.estimated_processing_cost
    );
    for (unit_id, reason) in &summary.units_failed {
        println!("  failed unit {unit_id}: {reason}");
    }
}
