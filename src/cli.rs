use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "vt-inspect", version, about = "Vector tile inspection and stats CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Tile(TileArgs),
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct TileArgs {
    /// Tile file (.pbf or .mvt, gzip accepted)
    pub input: PathBuf,

    /// Tile address z/x/y, inferred from the input path when omitted
    #[arg(long)]
    pub tile: Option<String>,

    /// Restrict GeoJSON export to one layer
    #[arg(long)]
    pub layer: Option<String>,

    /// Emit GeoJSON feature collections instead of the stats report
    #[arg(long, default_value_t = false)]
    pub geojson: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Tile files (.pbf or .mvt, gzip accepted)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Worker thread count (defaults to the available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Per-tile wait timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,

    /// Disable the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Ndjson,
}
