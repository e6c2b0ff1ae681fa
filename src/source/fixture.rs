//! Fixture-backed roster and fetcher.
//!
//! Serves a roster and per-unit items from local files, with the same
//! windowing and pagination behavior a live connector exhibits. Used for
//! dry runs, offline development, and the integration tests; live
//! connectors implement the same traits out of tree.
//!
//! Layout: `<dir>/roster.json` maps unit ids to metadata, and each unit's
//! items live in `<dir>/<unit_id>.jsonl`, one raw payload per line.

use crate::collector::planner::ChunkWindow;
use crate::output::jsonl::unit_file_name;
use crate::source::{FetchError, FetchPage, FetchResult, Fetcher, Roster, UnitMetadata};
use crate::{CollectionUnit, UnitKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Roster loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct FixtureRoster {
    entities: BTreeMap<String, UnitMetadata>,
}

impl FixtureRoster {
    /// Load `roster.json`-style content from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> FetchResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Transient(format!("{}: {e}", path.display())))?;
        let entities: BTreeMap<String, UnitMetadata> = serde_json::from_str(&contents)
            .map_err(|e| FetchError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(Self { entities })
    }

    /// Build a roster directly from entries (test convenience).
    pub fn from_entities(entities: BTreeMap<String, UnitMetadata>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl Roster for FixtureRoster {
    async fn list_known_entities(&self) -> FetchResult<BTreeMap<String, UnitMetadata>> {
        Ok(self.entities.clone())
    }
}

/// Fetcher serving per-unit JSONL fixture files.
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    dir: PathBuf,
}

impl FixtureFetcher {
    /// Create a fetcher rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_unit_items(&self, unit: &CollectionUnit) -> FetchResult<Vec<serde_json::Value>> {
        let path = self.dir.join(unit_file_name(&unit.unit_id));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .map_err(|e| FetchError::Transient(format!("{}: {e}", path.display())))?;
        let mut items = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| FetchError::Transient(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&line) {
                Ok(value) => items.push(value),
                Err(e) => {
                    warn!(
                        unit_id = %unit.unit_id,
                        error = %e,
                        "Skipping unparseable fixture line"
                    );
                }
            }
        }
        Ok(items)
    }
}

/// Best-effort event/file timestamp used for window filtering.
fn item_timestamp(payload: &serde_json::Value) -> Option<DateTime<Utc>> {
    let candidates = [
        payload.pointer("/start/dateTime"),
        payload.pointer("/start/date"),
        payload.get("modifiedTime"),
        payload.get("createdTime"),
    ];
    for candidate in candidates.into_iter().flatten() {
        let Some(text) = candidate.as_str() else {
            continue;
        };
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.with_timezone(&Utc));
        }
        // Date-only values (all-day events) anchor at midnight UTC.
        if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Some(midnight.and_utc());
            }
        }
    }
    None
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(
        &self,
        unit: &CollectionUnit,
        window: &ChunkWindow,
        page_token: Option<&str>,
        page_size: usize,
    ) -> FetchResult<FetchPage> {
        let all = self.load_unit_items(unit)?;

        let in_window: Vec<serde_json::Value> = match unit.kind {
            // Calendar items are filtered into their time window; items
            // with no timestamp belong to the first window only, so they
            // appear exactly once across a plan.
            UnitKind::Calendar => all
                .into_iter()
                .filter(|payload| match item_timestamp(payload) {
                    Some(at) => window.range.contains(at),
                    None => window.sequence_index == 0,
                })
                .collect(),
            // Drive queries get one whole-range window; pagination below
            // is the chunking mechanism.
            UnitKind::DriveQuery => all,
        };

        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| FetchError::Malformed(format!("bad page token: {token}")))?,
            None => 0,
        };
        let page_size = page_size.max(1);
        let end = (offset + page_size).min(in_window.len());
        let items = in_window
            .get(offset..end)
            .map(|slice| slice.to_vec())
            .unwrap_or_default();
        let next_page_token = if end < in_window.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(FetchPage {
            items,
            next_page_token,
        })
    }
}
