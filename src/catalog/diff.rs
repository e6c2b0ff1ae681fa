//! Change records and the catalog diff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What happened to an item since the last catalog snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// First sighting of this item id
    #[serde(rename = "added")]
    Added,
    /// Re-sighted with a different content hash
    #[serde(rename = "modified")]
    Modified,
    /// Known item not re-sighted by a covering harvest
    #[serde(rename = "removed")]
    Removed,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeOp::Added => "added",
            ChangeOp::Modified => "modified",
            ChangeOp::Removed => "removed",
        };
        write!(f, "{s}")
    }
}

/// One diff entry describing an item added, modified, or removed.
///
/// Invariants: `Modified` implies `old_hash != new_hash`; `Added` implies
/// `old_hash` is absent. Constructors below are the only way records are
/// produced, which keeps the invariants by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Unique id of this record
    pub change_id: Uuid,
    /// The item the change applies to
    pub item_id: String,
    /// What happened
    pub operation: ChangeOp,
    /// Fingerprint before the change, if the item was known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_hash: Option<String>,
    /// Fingerprint after the change, if the item still exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    /// Whether the content fingerprint differs across the change
    pub content_hash_changed: bool,
    /// When the change was detected
    pub detected_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Record a first sighting.
    pub fn added(item_id: impl Into<String>, new_hash: String, detected_at: DateTime<Utc>) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            item_id: item_id.into(),
            operation: ChangeOp::Added,
            old_hash: None,
            new_hash: Some(new_hash),
            content_hash_changed: true,
            detected_at,
        }
    }

    /// Record a content change. `old_hash` and `new_hash` must differ.
    pub fn modified(
        item_id: impl Into<String>,
        old_hash: String,
        new_hash: String,
        detected_at: DateTime<Utc>,
    ) -> Self {
        debug_assert_ne!(old_hash, new_hash, "modified requires differing hashes");
        Self {
            change_id: Uuid::new_v4(),
            item_id: item_id.into(),
            operation: ChangeOp::Modified,
            old_hash: Some(old_hash),
            new_hash: Some(new_hash),
            content_hash_changed: true,
            detected_at,
        }
    }

    /// Record a disappearance.
    pub fn removed(
        item_id: impl Into<String>,
        old_hash: String,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            item_id: item_id.into(),
            operation: ChangeOp::Removed,
            old_hash: Some(old_hash),
            new_hash: None,
            content_hash_changed: false,
            detected_at,
        }
    }
}

/// Full outer join of two `item_id -> content_hash` snapshots.
///
/// Total: every id present in exactly one side yields exactly one `Added`
/// or `Removed` record; ids in both with differing hashes yield `Modified`;
/// equal hashes yield nothing, so `diff(c, c)` is empty. Output is ordered
/// by item id.
pub fn diff(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
    detected_at: DateTime<Utc>,
) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    let mut ids: Vec<&String> = old.keys().chain(new.keys()).collect();
    ids.sort();
    ids.dedup();

    for id in ids {
        match (old.get(id), new.get(id)) {
            (None, Some(new_hash)) => {
                records.push(ChangeRecord::added(id, new_hash.clone(), detected_at));
            }
            (Some(old_hash), None) => {
                records.push(ChangeRecord::removed(id, old_hash.clone(), detected_at));
            }
            (Some(old_hash), Some(new_hash)) if old_hash != new_hash => {
                records.push(ChangeRecord::modified(
                    id,
                    old_hash.clone(),
                    new_hash.clone(),
                    detected_at,
                ));
            }
            _ => {}
        }
    }
    records
}
