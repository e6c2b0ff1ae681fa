//! Run checkpoint model.
//!
//! The checkpoint is the single source of truth for "where were we": which
//! units are done, which failed and why, and how far chunking got inside
//! the unit that was in flight when the process stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Current checkpoint schema version.
pub(crate) const SCHEMA_VERSION: &str = "1.0.0";

/// Resumable progress of one collection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionCheckpoint {
    schema_version: String,
    run_id: Uuid,
    units_total: u64,
    processed_units: BTreeSet<String>,
    units_failed: BTreeMap<String, String>,
    /// Next chunk `sequence_index` per unit that was interrupted
    /// mid-chunking. Cleared when the unit completes.
    chunk_cursor: BTreeMap<String, u32>,
    last_completed_unit_id: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CollectionCheckpoint {
    /// Start a fresh checkpoint for a run over `units_total` units.
    pub fn new(units_total: u64) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            units_total,
            processed_units: BTreeSet::new(),
            units_failed: BTreeMap::new(),
            chunk_cursor: BTreeMap::new(),
            last_completed_unit_id: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// This run's id.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stored schema version.
    pub(crate) fn schema_version(&self) -> &str {
        &self.schema_version
    }

    #[cfg(test)]
    pub(crate) fn set_schema_version(&mut self, version: &str) {
        self.schema_version = version.to_string();
    }

    /// Total units the run set out to process.
    pub fn units_total(&self) -> u64 {
        self.units_total
    }

    /// Refresh the unit total; discovery on a resumed run may see a
    /// roster that grew or shrank.
    pub fn set_units_total(&mut self, units_total: u64) {
        self.units_total = units_total;
        self.touch();
    }

    /// Units completed so far (successfully or not counted separately).
    pub fn units_processed(&self) -> u64 {
        self.processed_units.len() as u64
    }

    /// Whether `unit_id` already completed in this run.
    pub fn is_processed(&self, unit_id: &str) -> bool {
        self.processed_units.contains(unit_id)
    }

    /// Failure category per failed unit.
    pub fn units_failed(&self) -> &BTreeMap<String, String> {
        &self.units_failed
    }

    /// The unit that most recently completed.
    pub fn last_completed_unit_id(&self) -> Option<&str> {
        self.last_completed_unit_id.as_deref()
    }

    /// When the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the checkpoint last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Next chunk index to fetch for `unit_id` (0 if the unit never
    /// started).
    pub fn chunk_cursor(&self, unit_id: &str) -> u32 {
        self.chunk_cursor.get(unit_id).copied().unwrap_or(0)
    }

    /// Record that chunks below `next_index` are fully written for
    /// `unit_id`.
    pub fn set_chunk_cursor(&mut self, unit_id: &str, next_index: u32) {
        self.chunk_cursor.insert(unit_id.to_string(), next_index);
        self.touch();
    }

    /// Mark a unit fully processed. Clears its chunk cursor and any stale
    /// failure record from an earlier attempt.
    pub fn mark_processed(&mut self, unit_id: &str) {
        self.processed_units.insert(unit_id.to_string());
        self.chunk_cursor.remove(unit_id);
        self.units_failed.remove(unit_id);
        self.last_completed_unit_id = Some(unit_id.to_string());
        self.touch();
    }

    /// Mark a unit failed with a stable failure category. Failed units
    /// also count as processed so the run loop moves past them; the
    /// failure map keeps them visible.
    pub fn mark_failed(&mut self, unit_id: &str, category: &str) {
        self.units_failed
            .insert(unit_id.to_string(), category.to_string());
        self.processed_units.insert(unit_id.to_string());
        self.chunk_cursor.remove(unit_id);
        self.last_completed_unit_id = Some(unit_id.to_string());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
