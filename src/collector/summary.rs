//! Terminal run report.
//!
//! A run always ends with a summary, even when units failed: processed and
//! failed counts, API traffic, rate-limit pressure, the per-category
//! breakdown, and the estimated downstream processing cost.

use crate::catalog::classify::extraction_cost_weight;
use crate::catalog::ItemCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// File name of the persisted summary under the data directory.
pub const SUMMARY_FILE: &str = "summary.json";

/// Aggregate report for one collection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// The run this summary describes
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Units the run set out to process
    pub units_total: u64,
    /// Units completed (successes and recorded failures)
    pub units_processed: u64,
    /// Failure category per failed unit
    pub units_failed: BTreeMap<String, String>,
    /// Outbound API calls made
    pub api_calls: u64,
    /// Quota signals received
    pub rate_limit_hits: u64,
    /// Cumulative time spent waiting on the rate limiter, in milliseconds
    pub rate_limit_wait_ms: u64,
    /// Items appended to unit outputs
    pub items_collected: u64,
    /// Items skipped as malformed
    pub items_malformed: u64,
    /// `added` change records emitted
    pub changes_added: u64,
    /// `modified` change records emitted
    pub changes_modified: u64,
    /// `removed` change records emitted
    pub changes_removed: u64,
    /// Items classified per category this run
    pub categories: BTreeMap<String, u64>,
    /// Estimated downstream processing cost (category-weighted item count)
    pub estimated_processing_cost: u64,
}

impl CollectionSummary {
    /// Whether any unit failed.
    pub fn any_failures(&self) -> bool {
        !self.units_failed.is_empty()
    }

    /// Estimate downstream processing cost from per-category counts.
    pub fn estimate_cost(categories: &BTreeMap<ItemCategory, u64>) -> u64 {
        categories
            .iter()
            .map(|(category, count)| extraction_cost_weight(*category) * count)
            .sum()
    }

    /// Persist the summary as pretty JSON, atomically.
    pub fn write(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file
            .persist(dir.join(SUMMARY_FILE))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// Load the persisted summary, if one exists.
    pub fn load(dir: &Path) -> std::io::Result<Option<Self>> {
        let path = dir.join(SUMMARY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let summary =
            serde_json::from_str(&contents).map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(Some(summary))
    }
}
