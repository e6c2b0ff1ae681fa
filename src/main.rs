//! Main entry point for the harvester CLI.

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use workspace_harvester::cli::{Cli, Commands};
use workspace_harvester::collector::CollectError;
use workspace_harvester::shutdown::{self, ShutdownCoordinator};

/// Initialize tracing with optional JSON formatting via `LOG_FORMAT=json`.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("workspace_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install the global shutdown coordinator and Ctrl+C handler so an
    // interrupt flushes the checkpoint instead of corrupting it.
    let shutdown = ShutdownCoordinator::shared();
    shutdown::install_global(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - saving progress...");
                shutdown.trigger();
            }
        }
    });

    let exit_code = match cli.command {
        Commands::Collect(ref args) => match args.execute(shutdown.clone()).await {
            Ok(summary) if summary.any_failures() => {
                warn!(
                    failed = summary.units_failed.len(),
                    "Run finished with failed units"
                );
                1
            }
            Ok(_) => 0,
            Err(e) => {
                if matches!(
                    e,
                    workspace_harvester::cli::CliError::Collect(CollectError::Cancelled)
                ) {
                    warn!("Run cancelled - restart with --resume to continue");
                    130
                } else {
                    error!("Command failed: {}", e);
                    1
                }
            }
        },
        Commands::Status(ref args) => match args.execute() {
            Ok(()) => 0,
            Err(e) => {
                error!("Command failed: {}", e);
                1
            }
        },
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
