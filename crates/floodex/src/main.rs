//! Floodex command-line launcher
//!
//! Finds flood-extent rasters for catalogued flood events, measures flooded
//! area inside each event's AOI, and retrieves the matching layer files.
//! Batch commands are resumable: re-running skips pairs that already
//! produced an outcome.

use anyhow::Result;
use clap::{Parser, Subcommand};
use floodex_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "floodex", version, about = "Flood extent discovery and statistics")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (defaults to ~/.floodex/config.toml)
    #[arg(short = 'c', long, global = true, env = "FLOODEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute flood extent statistics for catalog events
    Extent(cli::extent::ExtentArgs),

    /// Copy AOI-selected layer files for catalog events
    Layers(cli::layers::LayersArgs),

    /// List the archive files found for one event
    Index(cli::index::IndexArgs),

    /// Summarize a processing ledger
    Status(cli::status::StatusArgs),

    /// Show the resolved configuration or write a default one
    Config(cli::config::ConfigArgs),
}

fn run_command(command: Commands, loaded: &cli::context::Loaded) -> Result<()> {
    match command {
        Commands::Extent(args) => cli::extent::run(args, loaded),
        Commands::Layers(args) => cli::layers::run(args, loaded),
        Commands::Index(args) => cli::index::run(args, loaded),
        Commands::Status(args) => cli::status::run(args, loaded),
        Commands::Config(args) => cli::config::run(args, loaded),
    }
}

fn main() -> ExitCode {
    let Cli {
        verbose,
        log_json,
        config,
        command,
    } = Cli::parse();

    let result = cli::context::load_config(config.as_deref()).and_then(|loaded| {
        match init_logging(LogConfig {
            app_name: "floodex",
            log_dir: loaded.config.paths.log_dir.clone(),
            verbose,
            json: log_json,
        }) {
            Ok(dir) => debug!(log_dir = %dir.display(), config = %loaded.path.display(), "Logging initialized"),
            Err(err) => eprintln!("Warning: failed to initialize logging: {:#}", err),
        }
        run_command(command, &loaded)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
