//! Unit discovery: turning a roster into a stable, ordered work list.

use crate::source::{FetchResult, Roster};
use crate::CollectionUnit;
use tracing::{debug, warn};

/// Discover the units to harvest from a roster.
///
/// Ordering is lexicographic on unit id (the roster map is ordered), so
/// repeated runs over an unchanged roster process units identically;
/// checkpoint resumption depends on this. Entries with unusable ids are
/// dropped with a warning rather than failing discovery.
pub async fn discover_units(roster: &dyn Roster) -> FetchResult<Vec<CollectionUnit>> {
    let entities = roster.list_known_entities().await?;
    let mut units = Vec::with_capacity(entities.len());
    for (unit_id, metadata) in entities {
        let unit = CollectionUnit::new(unit_id, metadata.display_name, metadata.kind);
        if let Err(reason) = unit.validate() {
            warn!(unit_id = %unit.unit_id, reason = %reason, "Skipping invalid roster entry");
            continue;
        }
        units.push(unit);
    }
    debug!(count = units.len(), "Discovered collection units");
    Ok(units)
}
