//! Catalog persistence: append-only logs compacted on load.
//!
//! Two sibling files live under the catalog directory: `entries.jsonl`
//! carries the latest-known state of every item (one JSON object per line,
//! later lines superseding earlier ones), `changes.jsonl` carries every
//! change record ever emitted. Neither file is rewritten in place; history
//! for removed items is kept forever.

use crate::catalog::classify::{categorize, payload_size_hint, processing_priority, ItemCategory};
use crate::catalog::diff::ChangeRecord;
use crate::catalog::hash::content_fingerprint;
use crate::catalog::CatalogError;
use crate::source::ExtractorRegistry;
use crate::HarvestedItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ENTRIES_LOG: &str = "entries.jsonl";
const CHANGES_LOG: &str = "changes.jsonl";

/// Persisted per-item state carried across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The item's stable id
    pub item_id: String,
    /// The unit the item belongs to; scopes removal sweeps
    pub unit_id: String,
    /// Normalized content fingerprint at last sighting
    pub content_hash: String,
    /// Assigned category
    pub category: ItemCategory,
    /// Whether a registered extractor covers the category
    pub extractable: bool,
    /// Downstream processing rank (lower = sooner)
    pub processing_priority: u32,
    /// When the item was last sighted
    pub last_seen_at: DateTime<Utc>,
    /// False once a covering harvest failed to re-sight the item.
    /// Keeps the removal sweep idempotent: a `removed` record is emitted
    /// only on the transition.
    #[serde(default = "default_present")]
    pub present: bool,
}

fn default_present() -> bool {
    true
}

/// The outcome of classifying one harvested item.
#[derive(Debug)]
pub struct Classification {
    /// The entry now stored for the item
    pub entry: CatalogEntry,
    /// The change this sighting produced, if any
    pub change: Option<ChangeRecord>,
}

/// Content catalog: in-memory map plus append-only logs.
///
/// Open at run start, close at run end; the handle owns its log writers,
/// so dropping it on any exit path releases them.
#[derive(Debug)]
pub struct Catalog {
    dir: PathBuf,
    entries: BTreeMap<String, CatalogEntry>,
    entries_log: BufWriter<File>,
    changes_log: BufWriter<File>,
}

impl Catalog {
    /// Open (or create) the catalog under `dir`, compacting the entries
    /// log into memory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CatalogError::Io(format!("Failed to create catalog dir: {e}")))?;

        let entries = Self::compact(&dir.join(ENTRIES_LOG))?;
        let entries_log = Self::open_append(&dir.join(ENTRIES_LOG))?;
        let changes_log = Self::open_append(&dir.join(CHANGES_LOG))?;

        info!(
            dir = %dir.display(),
            known_items = entries.len(),
            "Catalog opened"
        );

        Ok(Self {
            dir,
            entries,
            entries_log,
            changes_log,
        })
    }

    fn open_append(path: &Path) -> Result<BufWriter<File>, CatalogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CatalogError::Io(format!("Failed to open {}: {e}", path.display())))?;
        Ok(BufWriter::new(file))
    }

    /// Replay the entries log; the last line per item id wins. Unreadable
    /// lines are skipped with a warning so one torn write cannot poison
    /// the whole catalog.
    fn compact(path: &Path) -> Result<BTreeMap<String, CatalogEntry>, CatalogError> {
        let mut entries = BTreeMap::new();
        if !path.exists() {
            return Ok(entries);
        }
        let file = File::open(path)
            .map_err(|e| CatalogError::Io(format!("Failed to open {}: {e}", path.display())))?;
        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| CatalogError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CatalogEntry>(&line) {
                Ok(entry) => {
                    entries.insert(entry.item_id.clone(), entry);
                }
                Err(e) => {
                    warn!(
                        line = line_number + 1,
                        error = %e,
                        "Skipping unreadable catalog entry line"
                    );
                }
            }
        }
        debug!(items = entries.len(), "Compacted catalog entries log");
        Ok(entries)
    }

    /// Directory this catalog persists under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of known items (including ones no longer present).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog knows no items at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an item's current entry.
    pub fn get(&self, item_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(item_id)
    }

    /// Current `item_id -> content_hash` snapshot of present items.
    pub fn present_hashes(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.present)
            .map(|(id, e)| (id.clone(), e.content_hash.clone()))
            .collect()
    }

    /// Classify a harvested item and record it, emitting at most one
    /// change record.
    ///
    /// Re-sighting an unchanged item only refreshes `last_seen_at`
    /// (classify-or-skip keyed by content hash), so re-running over
    /// already-harvested data emits no duplicate changes.
    pub fn classify(
        &mut self,
        item: &HarvestedItem,
        extractors: &ExtractorRegistry,
    ) -> Result<Classification, CatalogError> {
        let category = categorize(&item.raw_payload);
        let content_hash = content_fingerprint(&item.raw_payload);
        let extractable = extractors.supports(category);
        let priority =
            processing_priority(category, extractable, payload_size_hint(&item.raw_payload));

        let change = match self.entries.get(&item.source_id) {
            Some(previous) if previous.present && previous.content_hash == content_hash => None,
            Some(previous) if previous.present => Some(ChangeRecord::modified(
                &item.source_id,
                previous.content_hash.clone(),
                content_hash.clone(),
                item.retrieved_at,
            )),
            // Unknown, or known but previously swept as removed: both are
            // first sightings from the change stream's point of view.
            _ => Some(ChangeRecord::added(
                &item.source_id,
                content_hash.clone(),
                item.retrieved_at,
            )),
        };

        let entry = CatalogEntry {
            item_id: item.source_id.clone(),
            unit_id: item.unit_id.clone(),
            content_hash,
            category,
            extractable,
            processing_priority: priority,
            last_seen_at: item.retrieved_at,
            present: true,
        };

        self.append_entry(&entry)?;
        if let Some(record) = &change {
            self.append_change(record)?;
        }
        self.entries.insert(entry.item_id.clone(), entry.clone());

        Ok(Classification { entry, change })
    }

    /// Sweep a processed unit for removals: every present entry of the
    /// unit that was not sighted this run gets exactly one `removed`
    /// record and is marked absent.
    ///
    /// Only call this for units the run fully covered; absence from a
    /// narrow incremental window proves nothing.
    pub fn sweep_removed(
        &mut self,
        unit_id: &str,
        sighted: &BTreeSet<String>,
        detected_at: DateTime<Utc>,
    ) -> Result<Vec<ChangeRecord>, CatalogError> {
        let missing: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.unit_id == unit_id && e.present && !sighted.contains(&e.item_id))
            .map(|e| e.item_id.clone())
            .collect();

        let mut records = Vec::with_capacity(missing.len());
        for item_id in missing {
            let entry = self
                .entries
                .get_mut(&item_id)
                .ok_or_else(|| CatalogError::Corrupt(format!("entry vanished: {item_id}")))?;
            entry.present = false;
            let record = ChangeRecord::removed(&item_id, entry.content_hash.clone(), detected_at);
            let snapshot = entry.clone();
            self.append_entry(&snapshot)?;
            self.append_change(&record)?;
            records.push(record);
        }
        if !records.is_empty() {
            debug!(unit_id, removed = records.len(), "Removal sweep");
        }
        Ok(records)
    }

    fn append_entry(&mut self, entry: &CatalogEntry) -> Result<(), CatalogError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;
        writeln!(self.entries_log, "{line}").map_err(|e| CatalogError::Io(e.to_string()))
    }

    fn append_change(&mut self, record: &ChangeRecord) -> Result<(), CatalogError> {
        let line = serde_json::to_string(record)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;
        writeln!(self.changes_log, "{line}").map_err(|e| CatalogError::Io(e.to_string()))
    }

    /// Flush buffered log lines to disk. Called after every unit so a kill
    /// between units loses nothing.
    pub fn flush(&mut self) -> Result<(), CatalogError> {
        self.entries_log
            .flush()
            .map_err(|e| CatalogError::Io(e.to_string()))?;
        self.changes_log
            .flush()
            .map_err(|e| CatalogError::Io(e.to_string()))
    }

    /// Flush and close the catalog.
    pub fn close(mut self) -> Result<(), CatalogError> {
        self.flush()
    }
}
