//! Observability metrics for collection runs.
//!
//! Uses the `metrics` facade with an optional Prometheus scrape endpoint.
//! When no exporter is installed the macros are no-ops, so the engine
//! records unconditionally and headless runs cost nothing.

use metrics::{counter, describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Install the Prometheus exporter and register metric descriptions.
///
/// Call once at startup, only when a scrape endpoint was requested.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    info!(%addr, "Initializing metrics exporter");
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "harvest_api_calls_total",
        Unit::Count,
        "Outbound API calls made by the collection engine"
    );
    describe_counter!(
        "harvest_quota_hits_total",
        Unit::Count,
        "Quota-exceeded signals received from the source"
    );
    describe_counter!(
        "harvest_items_collected_total",
        Unit::Count,
        "Items appended to per-unit output files"
    );
    describe_counter!(
        "harvest_units_processed_total",
        Unit::Count,
        "Units fully processed"
    );
    describe_counter!(
        "harvest_units_failed_total",
        Unit::Count,
        "Units that failed and were isolated"
    );
    describe_counter!(
        "harvest_changes_total",
        Unit::Count,
        "Change records emitted, labeled by operation"
    );
    describe_histogram!(
        "harvest_run_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of completed runs"
    );

    Ok(())
}

/// Per-run metrics recorder.
///
/// Thin guard over the `metrics` macros so orchestrator call sites stay
/// one-liners; also times the run for the duration histogram.
#[derive(Debug)]
pub struct RunMetrics {
    started: Instant,
}

impl RunMetrics {
    /// Start recording a run.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// One outbound API call.
    pub fn record_api_call(&self) {
        counter!("harvest_api_calls_total").increment(1);
    }

    /// One quota signal.
    pub fn record_quota_hit(&self) {
        counter!("harvest_quota_hits_total").increment(1);
    }

    /// One item appended to output.
    pub fn record_item(&self) {
        counter!("harvest_items_collected_total").increment(1);
    }

    /// One unit completed, successfully or not.
    pub fn record_unit(&self, success: bool) {
        if success {
            counter!("harvest_units_processed_total").increment(1);
        } else {
            counter!("harvest_units_failed_total").increment(1);
        }
    }

    /// Emitted change records by operation.
    pub fn record_changes(&self, added: u64, modified: u64, removed: u64) {
        if added > 0 {
            counter!("harvest_changes_total", "operation" => "added").increment(added);
        }
        if modified > 0 {
            counter!("harvest_changes_total", "operation" => "modified").increment(modified);
        }
        if removed > 0 {
            counter!("harvest_changes_total", "operation" => "removed").increment(removed);
        }
    }

    /// Elapsed run time so far.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl Drop for RunMetrics {
    fn drop(&mut self) {
        metrics::histogram!("harvest_run_duration_seconds")
            .record(self.started.elapsed().as_secs_f64());
    }
}
