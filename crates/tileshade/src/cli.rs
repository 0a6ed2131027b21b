use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shading::{TILE_SIZE, V2i};

#[derive(Parser, Debug)]
#[command(
    name = "tileshade",
    author,
    version,
    about = "Evaluate channel-binding shading programs against image tiles"
)]
pub struct Cli {
    /// Configuration file; defaults to `tileshade.toml` in the config directory.
    #[arg(long, global = true, value_name = "FILE", env = "TILESHADE_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Shade tiles and print a JSON summary of every channel.
    Render(RenderArgs),
    /// Print the program generated from the configured channel bindings.
    Program,
    /// Print the resolved configuration as TOML.
    Config,
    /// Print resolved directories.
    Where,
}

#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Tile origin to shade (`X,Y`, multiples of the tile size). Repeatable;
    /// every tile of the data window is shaded when omitted.
    #[arg(long = "tile", value_name = "X,Y", value_parser = parse_tile)]
    pub tiles: Vec<V2i>,

    /// Frame to evaluate; overrides `defaults.frame`.
    #[arg(long, value_name = "FRAME")]
    pub frame: Option<f64>,

    /// Only report these channels. Repeatable.
    #[arg(long = "channel", value_name = "NAME")]
    pub channels: Vec<String>,

    /// Include the raw channel values in the report.
    #[arg(long)]
    pub values: bool,

    /// Shade every tile a second time to exercise the result cache.
    #[arg(long)]
    pub repeat: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_tile(value: &str) -> Result<V2i, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("invalid tile '{value}'; expected X,Y"))?;
    let x = x
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid tile x coordinate in '{value}'"))?;
    let y = y
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid tile y coordinate in '{value}'"))?;
    if x % TILE_SIZE != 0 || y % TILE_SIZE != 0 {
        return Err(format!(
            "tile origin {x},{y} is not a multiple of the {TILE_SIZE}px tile size"
        ));
    }
    Ok(V2i::new(x, y))
}
