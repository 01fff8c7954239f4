//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`quadkey`] - Convert between tile address forms
//! - [`fetch`] - Resolve and download a tile

pub mod fetch;
pub mod quadkey;

use clap::{ArgGroup, Args};
use quadlayer::quadkey::{from_morton, QuadKey, QuadKeyError};

use crate::error::CliError;

/// Tile selection shared by the subcommands. Exactly one form is required.
#[derive(Debug, Clone, Args)]
#[command(group(
    ArgGroup::new("tile_input")
        .required(true)
        .args(["tile", "morton", "quadkey"])
))]
pub struct TileArgs {
    /// Tile as ROW,COLUMN,LEVEL
    #[arg(long, value_name = "ROW,COLUMN,LEVEL")]
    pub tile: Option<String>,

    /// Tile as a Morton code
    #[arg(long)]
    pub morton: Option<u64>,

    /// Tile as a base-4 quadkey string ("-" for the root)
    #[arg(long, allow_hyphen_values = true)]
    pub quadkey: Option<String>,
}

impl TileArgs {
    /// Resolves the given form to a validated key.
    pub fn to_quad_key(&self) -> Result<QuadKey, CliError> {
        let key = if let Some(tile) = &self.tile {
            parse_tile(tile)?
        } else if let Some(code) = self.morton {
            from_morton(code).map_err(|e| CliError::InvalidTile(e.to_string()))?
        } else if let Some(quadkey) = &self.quadkey {
            quadkey
                .parse()
                .map_err(|e: QuadKeyError| CliError::InvalidTile(e.to_string()))?
        } else {
            return Err(CliError::InvalidTile("no tile given".to_string()));
        };

        QuadKey::try_new(key.row, key.column, key.level)
            .map_err(|e| CliError::InvalidTile(e.to_string()))
    }
}

/// Parses `ROW,COLUMN,LEVEL`.
fn parse_tile(value: &str) -> Result<QuadKey, CliError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let &[row, column, level] = parts.as_slice() else {
        return Err(CliError::InvalidTile(format!(
            "'{}' is not ROW,COLUMN,LEVEL",
            value
        )));
    };

    let number = |part: &str| {
        part.parse::<u32>()
            .map_err(|_| CliError::InvalidTile(format!("'{}' is not a number", part)))
    };
    let level = u8::try_from(number(level)?)
        .map_err(|_| CliError::InvalidTile(format!("level '{}' is too large", level)))?;

    Ok(QuadKey::new(number(row)?, number(column)?, level))
}
