//! QuadLayer CLI - Command-line interface
//!
//! Converts tile addresses and fetches tiles of a layer through the
//! QuadLayer library.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quadlayer::logging::{default_log_file, init_logging};
use tracing::info;

use commands::fetch::FetchArgs;
use commands::quadkey::QuadkeyArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "quadlayer")]
#[command(version, about = "Resolve and download quad-tree tiles", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/quadlayer/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a tile as row/column/level, Morton code and quadkey string
    Quadkey(QuadkeyArgs),
    /// Resolve a tile through the layer index and download its data
    Fetch(FetchArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Quadkey(args) => commands::quadkey::run(args),
        Command::Fetch(args) => {
            let log_dir = quadlayer_dir(dirs::data_local_dir()).join("logs");
            let _logging_guard = init_logging(&log_dir, default_log_file())
                .map_err(|e| CliError::LoggingInit(e.to_string()))?;
            info!(version = env!("CARGO_PKG_VERSION"), "QuadLayer CLI starting");

            let config_path = cli
                .config
                .unwrap_or_else(|| quadlayer_dir(dirs::config_dir()).join("config.ini"));
            commands::fetch::run(args, &config_path)
        }
    }
}

/// `<base>/quadlayer`, or `.quadlayer` in the working directory when the
/// platform has no such base directory.
fn quadlayer_dir(base: Option<PathBuf>) -> PathBuf {
    match base {
        Some(dir) => dir.join("quadlayer"),
        None => PathBuf::from(".quadlayer"),
    }
}
