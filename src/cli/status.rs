//! Status command: inspect checkpoint and last-summary state.

use crate::collector::orchestrator::CHECKPOINT_FILE;
use crate::collector::CollectionSummary;
use crate::resume::CollectionCheckpoint;
use clap::Args;
use std::path::PathBuf;

use super::CliError;

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory holding the run artifacts to inspect
    #[arg(long, default_value = "./harvest_data")]
    pub data_dir: PathBuf,
}

impl StatusArgs {
    /// Execute the status command.
    pub fn execute(&self) -> Result<(), CliError> {
        let checkpoint_path = self.data_dir.join(CHECKPOINT_FILE);
        if checkpoint_path.exists() {
            let checkpoint = CollectionCheckpoint::load(&checkpoint_path)?;
            println!("Checkpoint (run {}):", checkpoint.run_id());
            println!(
                "  progress: {}/{} units",
                checkpoint.units_processed(),
                checkpoint.units_total()
            );
            if let Some(last) = checkpoint.last_completed_unit_id() {
                println!("  last completed unit: {last}");
            }
            println!("  updated: {}", checkpoint.updated_at().to_rfc3339());
            if !checkpoint.units_failed().is_empty() {
                println!("  failed units:");
                for (unit_id, reason) in checkpoint.units_failed() {
                    println!("    {unit_id}: {reason}");
                }
            }
        } else {
            println!("No checkpoint at {}", checkpoint_path.display());
        }

        match CollectionSummary::load(&self.data_dir)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?
        {
            Some(summary) => {
                println!("Last summary (run {}):", summary.run_id);
                println!(
                    "  {} items, {} added / {} modified / {} removed",
                    summary.items_collected,
                    summary.changes_added,
                    summary.changes_modified,
                    summary.changes_removed
                );
                println!(
                    "  {} api calls, {} rate-limit hits",
                    summary.api_calls, summary.rate_limit_hits
                );
            }
            None => println!("No summary written yet"),
        }

        Ok(())
    }
}
