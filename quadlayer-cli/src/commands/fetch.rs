//! Fetch command - resolve a tile to its data handle and download it.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use quadlayer::client::HttpLayerClient;
use quadlayer::config::ClientConfig;
use quadlayer::quadkey::QuadKey;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::TileArgs;
use crate::error::CliError;

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    /// Fall back to the nearest populated ancestor
    #[arg(long)]
    pub aggregated: bool,

    /// Write the tile data to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// What was downloaded.
struct Fetched {
    quad_key: QuadKey,
    data: Vec<u8>,
}

/// Run the fetch command.
pub fn run(args: FetchArgs, config_path: &Path) -> Result<(), CliError> {
    let key = args.tile.to_quad_key()?;
    let config = ClientConfig::from_ini_file(config_path).map_err(|error| CliError::Config {
        path: config_path.to_path_buf(),
        error,
    })?;

    println!("Fetching tile:");
    println!("  Layer:   {} ({})", config.layer_id, config.catalog);
    println!("  Tile:    row={}, column={}, level={}", key.row, key.column, key.level);
    println!("  Quadkey: {}", key);
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(format!("Failed to start async runtime: {}", e)))?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, cancelling...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    let client = HttpLayerClient::from_config(&config)?;
    let fetched = runtime.block_on(fetch(&client, &key, args.aggregated, &token))?;

    if fetched.quad_key != key {
        println!(
            "Tile has no data; using ancestor {} at level {}",
            fetched.quad_key, fetched.quad_key.level
        );
    }
    println!("Downloaded {} bytes", fetched.data.len());

    if let Some(path) = &args.output {
        write_output(path, &fetched.data)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

async fn fetch(
    client: &HttpLayerClient,
    key: &QuadKey,
    aggregated: bool,
    token: &CancellationToken,
) -> Result<Fetched, CliError> {
    if aggregated {
        let tile = client
            .get_aggregated_tile_with_cancel(key, token)
            .await?
            .ok_or(CliError::NoData(*key))?;
        info!(resolved = %tile.quad_key, handle = %tile.data_handle, "Aggregated tile fetched");
        return Ok(Fetched {
            quad_key: tile.quad_key,
            data: tile.data,
        });
    }

    let data = client
        .get_tile_with_cancel(key, token)
        .await?
        .ok_or(CliError::NoData(*key))?;
    Ok(Fetched {
        quad_key: *key,
        data,
    })
}

fn write_output(path: &Path, data: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| CliError::FileWrite {
            path: path.to_path_buf(),
            error,
        })?;
    }
    fs::write(path, data).map_err(|error| CliError::FileWrite {
        path: path.to_path_buf(),
        error,
    })
}
