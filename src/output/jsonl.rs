//! Append-only JSONL writer, one file per unit.
//!
//! Each line is the raw payload plus collection metadata (`_collected_at`,
//! `_unit_id`). Files are opened in append mode and written strictly in
//! chunk order, so a resumed run continues a partially written file without
//! touching earlier lines.

use crate::output::{ItemWriter, OutputError, OutputResult};
use crate::HarvestedItem;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Characters replaced when a unit id becomes a file name.
const UNSAFE_FILENAME_CHARS: &[char] = &[':', '/', '\\', ' '];

/// File name for a unit's output under the units directory.
pub fn unit_file_name(unit_id: &str) -> String {
    let safe: String = unit_id
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    format!("{safe}.jsonl")
}

/// Append-only JSONL writer for one unit's harvested items.
#[derive(Debug)]
pub struct JsonlUnitWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    items_written: u64,
}

impl JsonlUnitWriter {
    /// Open the writer for `unit_id` under `dir`, appending to any
    /// existing file. Used when resuming a unit at its chunk cursor.
    pub fn open(dir: &Path, unit_id: &str) -> OutputResult<Self> {
        Self::open_with(dir, unit_id, false)
    }

    /// Create the writer for `unit_id` under `dir`, truncating any stale
    /// partial file. Used when a unit starts from its first chunk.
    pub fn create(dir: &Path, unit_id: &str) -> OutputResult<Self> {
        Self::open_with(dir, unit_id, true)
    }

    fn open_with(dir: &Path, unit_id: &str, truncate: bool) -> OutputResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| OutputError::Io(format!("Failed to create output dir: {e}")))?;
        let path = dir.join(unit_file_name(unit_id));
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(&path)
            .map_err(|e| OutputError::Io(format!("Failed to open {}: {e}", path.display())))?;
        debug!(path = %path.display(), truncate, "Opened unit output");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            items_written: 0,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Items appended through this writer instance.
    pub fn items_written(&self) -> u64 {
        self.items_written
    }
}

impl ItemWriter for JsonlUnitWriter {
    fn write_item(&mut self, item: &HarvestedItem) -> OutputResult<()> {
        let mut line = match &item.raw_payload {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                let mut wrapped = serde_json::Map::new();
                wrapped.insert("payload".to_string(), other.clone());
                wrapped
            }
        };
        line.insert(
            "_collected_at".to_string(),
            serde_json::Value::String(item.retrieved_at.to_rfc3339()),
        );
        line.insert(
            "_unit_id".to_string(),
            serde_json::Value::String(item.unit_id.clone()),
        );

        let serialized = serde_json::to_string(&serde_json::Value::Object(line))
            .map_err(|e| OutputError::Serialization(e.to_string()))?;
        writeln!(self.writer, "{serialized}").map_err(|e| OutputError::Io(e.to_string()))?;
        self.items_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush().map_err(|e| OutputError::Io(e.to_string()))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()
    }
}

/// Count the lines already present in a unit's output file, if any.
///
/// Convenience for tests and for inspecting a data directory; resume
/// correctness itself rests on the checkpoint's chunk cursor, not on
/// rereading output.
pub fn count_lines(dir: &Path, unit_id: &str) -> OutputResult<u64> {
    let path = dir.join(unit_file_name(unit_id));
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(&path).map_err(|e| OutputError::Io(e.to_string()))?;
    let mut count = 0u64;
    for line in BufReader::new(file).lines() {
        line.map_err(|e| OutputError::Io(e.to_string()))?;
        count += 1;
    }
    Ok(count)
}
