//! Chunk planning: deterministic decomposition of a time range into
//! bounded, retry-safe fetch windows.

use crate::{CollectionUnit, TimeRange, UnitKind};
use serde::{Deserialize, Serialize};

/// One bounded fetch window of a unit's total range.
///
/// Windows are half-open `[start, end)`, contiguous, non-overlapping, and
/// ordered by `sequence_index`; together they cover the requested range
/// exactly. The checkpoint's chunk cursor is keyed by `sequence_index`, so
/// planning must be deterministic: identical inputs always yield the
/// identical sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWindow {
    /// The window's time slice
    pub range: TimeRange,
    /// Position of this window in the unit's plan, starting at 0
    pub sequence_index: u32,
}

/// Split `range` into ordered windows no longer than `max_span`.
///
/// The final window may be shorter. A zero-length range yields one empty
/// window with `sequence_index = 0` rather than an empty plan, so the unit
/// is still driven through the pipeline and marked processed.
pub fn plan(range: TimeRange, max_span: chrono::Duration) -> Vec<ChunkWindow> {
    if range.is_empty() {
        return vec![ChunkWindow {
            range,
            sequence_index: 0,
        }];
    }

    let max_span = if max_span <= chrono::Duration::zero() {
        range.duration()
    } else {
        max_span
    };

    let mut windows = Vec::new();
    let mut cursor = range.start;
    let mut sequence_index = 0u32;
    while cursor < range.end {
        let end = (cursor + max_span).min(range.end);
        windows.push(ChunkWindow {
            // Bounds come from the covering range, so start <= end holds.
            range: TimeRange { start: cursor, end },
            sequence_index,
        });
        cursor = end;
        sequence_index += 1;
    }
    windows
}

/// Plan the windows for one unit.
///
/// Calendar units are chunked over time. A drive-style query degenerates to
/// a single whole-range window; there the bounded page size does the
/// chunking, and the checkpoint cursor tracks page ordinals instead.
pub fn plan_for_unit(
    unit: &CollectionUnit,
    range: TimeRange,
    max_span: chrono::Duration,
) -> Vec<ChunkWindow> {
    match unit.kind {
        UnitKind::Calendar => plan(range, max_span),
        UnitKind::DriveQuery => vec![ChunkWindow {
            range,
            sequence_index: 0,
        }],
    }
}
