//! Item classification: category mapping and processing priority.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content category assigned to every harvested item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ItemCategory {
    /// Word-processor documents
    #[serde(rename = "document")]
    Document,
    /// Slide decks
    #[serde(rename = "presentation")]
    Presentation,
    /// Spreadsheets
    #[serde(rename = "spreadsheet")]
    Spreadsheet,
    /// Plain text files
    #[serde(rename = "plain_text")]
    PlainText,
    /// PDF files
    #[serde(rename = "pdf")]
    Pdf,
    /// Calendar events
    #[serde(rename = "calendar_event")]
    CalendarEvent,
    /// Everything else
    #[serde(rename = "other")]
    Other,
}

impl std::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemCategory::Document => "document",
            ItemCategory::Presentation => "presentation",
            ItemCategory::Spreadsheet => "spreadsheet",
            ItemCategory::PlainText => "plain_text",
            ItemCategory::Pdf => "pdf",
            ItemCategory::CalendarEvent => "calendar_event",
            ItemCategory::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ItemCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(ItemCategory::Document),
            "presentation" => Ok(ItemCategory::Presentation),
            "spreadsheet" => Ok(ItemCategory::Spreadsheet),
            "plain_text" => Ok(ItemCategory::PlainText),
            "pdf" => Ok(ItemCategory::Pdf),
            "calendar_event" => Ok(ItemCategory::CalendarEvent),
            "other" => Ok(ItemCategory::Other),
            _ => Err(format!("Invalid item category: {s}")),
        }
    }
}

/// Fixed mapping of content type to category.
///
/// Looks at the payload's `mimeType` first; payloads without one that carry
/// event-shaped fields (`start` plus `end`, or a `calendar#event` kind) are
/// calendar events. Anything unrecognized is `Other`.
pub fn categorize(payload: &serde_json::Value) -> ItemCategory {
    if let Some(mime) = payload.get("mimeType").and_then(|v| v.as_str()) {
        return match mime {
            "application/vnd.google-apps.document"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => ItemCategory::Document,
            "application/vnd.google-apps.presentation"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                ItemCategory::Presentation
            }
            "application/vnd.google-apps.spreadsheet"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "text/csv" => ItemCategory::Spreadsheet,
            "text/plain" | "text/markdown" => ItemCategory::PlainText,
            "application/pdf" => ItemCategory::Pdf,
            _ => ItemCategory::Other,
        };
    }

    let kind = payload.get("kind").and_then(|v| v.as_str());
    if kind == Some("calendar#event")
        || (payload.get("start").is_some() && payload.get("end").is_some())
    {
        return ItemCategory::CalendarEvent;
    }

    ItemCategory::Other
}

/// Priority rank for items without a registered extractor.
const UNSUPPORTED_PRIORITY: u32 = 90;

/// Size penalty granularity: one rank per this many payload bytes.
const SIZE_PENALTY_STEP: u64 = 1024 * 1024;

/// Maximum size penalty added to a category's base rank.
const SIZE_PENALTY_CAP: u64 = 9;

/// Derive the downstream processing priority (lower rank = sooner).
///
/// Small, high-value categories (documents, spreadsheets, events) rank
/// above large opaque types (pdf); categories with no extractor rank last
/// regardless of size.
pub fn processing_priority(category: ItemCategory, extractable: bool, size_bytes: u64) -> u32 {
    if !extractable {
        return UNSUPPORTED_PRIORITY;
    }
    let base = match category {
        ItemCategory::Document | ItemCategory::Spreadsheet | ItemCategory::CalendarEvent => 10,
        ItemCategory::PlainText | ItemCategory::Presentation => 20,
        ItemCategory::Pdf => 30,
        ItemCategory::Other => 40,
    };
    base + (size_bytes / SIZE_PENALTY_STEP).min(SIZE_PENALTY_CAP) as u32
}

/// Relative downstream extraction cost of one item of this category.
///
/// Feeds the summary's estimated processing cost; the weights reflect how
/// expensive each format is to extract, with pdf the standout.
pub fn extraction_cost_weight(category: ItemCategory) -> u64 {
    match category {
        ItemCategory::Document => 5,
        ItemCategory::Spreadsheet => 4,
        ItemCategory::Presentation => 3,
        ItemCategory::PlainText => 1,
        ItemCategory::Pdf => 8,
        ItemCategory::CalendarEvent => 1,
        ItemCategory::Other => 0,
    }
}

/// Best-effort payload size: the source-reported `size` field when present
/// (Drive reports it as a decimal string), the serialized payload length
/// otherwise.
pub fn payload_size_hint(payload: &serde_json::Value) -> u64 {
    if let Some(size) = payload.get("size") {
        if let Some(n) = size.as_u64() {
            return n;
        }
        if let Some(s) = size.as_str() {
            if let Ok(n) = s.parse::<u64>() {
                return n;
            }
        }
    }
    serde_json::to_vec(payload).map(|v| v.len() as u64).unwrap_or(0)
}
