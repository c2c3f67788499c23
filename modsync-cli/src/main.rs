//! modsync - keep game mod packages in sync with a remote catalog.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use modsync::logging::init_logging;

use commands::cache::CacheCommands;
use commands::common::load_config;
use commands::config::ConfigCommands;
use commands::sync::SyncCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "modsync", version, about = "Verified, incremental mod downloads")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG and config)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Refresh the catalog or mod packages
    #[command(subcommand)]
    Sync(SyncCommands),

    /// Inspect and edit the download cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// View or change settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let config = load_config();
    let _guard = match init_logging(&config.logging.directory, &config.logging.level, cli.verbose)
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {}", e);
            None
        }
    };

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "modsync starting");

    if let Err(e) = run(cli.command) {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sync(cmd) => commands::sync::run(cmd),
        Commands::Cache(cmd) => commands::cache::run(cmd),
        Commands::Config(cmd) => commands::config::run(cmd),
    }
}
