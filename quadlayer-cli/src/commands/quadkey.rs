//! Quadkey command - show every form of a tile address.

use clap::Args;
use quadlayer::quadkey::{to_morton, QuadKey};

use super::TileArgs;
use crate::error::CliError;

/// Arguments for the quadkey command.
#[derive(Debug, Args)]
pub struct QuadkeyArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    /// Also list every ancestor up to the root
    #[arg(long)]
    pub parents: bool,
}

/// Run the quadkey command.
pub fn run(args: QuadkeyArgs) -> Result<(), CliError> {
    let key = args.tile.to_quad_key()?;
    for line in describe(&key, args.parents) {
        println!("{}", line);
    }
    Ok(())
}

fn describe(key: &QuadKey, parents: bool) -> Vec<String> {
    let mut lines = vec![
        format!("Tile:    row={}, column={}, level={}", key.row, key.column, key.level),
        format!("Morton:  {}", to_morton(key)),
        format!("Quadkey: {}", key),
    ];

    if parents {
        lines.push(String::new());
        lines.push("Parents:".to_string());
        let mut current = *key;
        while !current.is_root() {
            current = current.parent();
            lines.push(format!(
                "  level {:>2}  morton {:<12} row={}, column={}",
                current.level,
                to_morton(&current),
                current.row,
                current.column
            ));
        }
    }

    lines
}
