//! Per-unit output writers.

use crate::HarvestedItem;

pub mod jsonl;

pub use jsonl::JsonlUnitWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Sink for harvested items of one unit.
pub trait ItemWriter {
    /// Append a single item.
    fn write_item(&mut self, item: &HarvestedItem) -> OutputResult<()>;

    /// Append a batch of items in order.
    fn write_items(&mut self, items: &[HarvestedItem]) -> OutputResult<()> {
        for item in items {
            self.write_item(item)?;
        }
        Ok(())
    }

    /// Flush buffered data to disk.
    fn flush(&mut self) -> OutputResult<()>;

    /// Flush and finalize the output.
    fn close(self) -> OutputResult<()>;
}
