//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and a non-zero exit code.

use std::fmt;
use std::path::PathBuf;
use std::process;

use quadlayer::client::ClientError;
use quadlayer::config::ConfigError;
use quadlayer::quadkey::QuadKey;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be loaded
    Config { path: PathBuf, error: ConfigError },
    /// The tile given on the command line is malformed
    InvalidTile(String),
    /// Async runtime or signal handler setup failed
    Runtime(String),
    /// Resolution or download failed
    Client(ClientError),
    /// Neither the tile nor, when aggregating, any ancestor has data
    NoData(QuadKey),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config { .. } => {
                eprintln!();
                eprintln!("The config file needs at least:");
                eprintln!("  [layer]      catalog, id");
                eprintln!("  [endpoints]  query, blob");
            }
            CliError::NoData(_) => {
                eprintln!();
                eprintln!("Try --aggregated to fall back to the nearest populated ancestor.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config { path, error } => {
                write!(f, "Configuration error in '{}': {}", path.display(), error)
            }
            CliError::InvalidTile(msg) => write!(f, "Invalid tile: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Client(e) => write!(f, "Failed to fetch tile: {}", e),
            CliError::NoData(key) => write!(
                f,
                "No data for tile {} (row={}, column={}, level={})",
                key, key.row, key.column, key.level
            ),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config { error, .. } => Some(error),
            CliError::Client(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        CliError::Client(e)
    }
}
