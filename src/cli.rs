use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "tilepress", version, about = "Raster tile pyramid exporter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a tile pyramid into a directory, zip archive or MBTiles file
    Render(RenderArgs),
    /// Enumerate the tiles and metatiles a job would render, without rendering
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Destination: a directory, a .zip path or an .mbtiles path
    pub output: PathBuf,

    /// Geographic extent as min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    pub extent: String,

    #[arg(long)]
    pub min_zoom: u8,

    #[arg(long)]
    pub max_zoom: u8,

    /// Tile edge length in pixels
    #[arg(long, default_value_t = 256)]
    pub tile_size: u32,

    #[arg(long, value_enum, default_value_t = ImageFormatArg::Png)]
    pub format: ImageFormatArg,

    /// JPEG quality (ignored for PNG)
    #[arg(long, default_value_t = 85)]
    pub quality: u8,

    /// Tileset root name inside the destination; defaults to tileset_<ts>
    #[arg(long)]
    pub root_dir: Option<String>,

    /// Number rows bottom-up (TMS) in directory/zip outputs
    #[arg(long, default_value_t = false)]
    pub tms: bool,

    /// Batch tiles into ROWSxCOLS metatiles, e.g. 4x4
    #[arg(long)]
    pub metatile: Option<String>,

    /// Render a one-tile buffer ring around each metatile
    #[arg(long, default_value_t = false)]
    pub metatile_buffer: bool,

    /// Fill colour for the built-in flat renderer, #rrggbb or #rrggbbaa
    #[arg(long, default_value = "#ffffff")]
    pub fill: String,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Geographic extent as min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    pub extent: String,

    #[arg(long)]
    pub min_zoom: u8,

    #[arg(long)]
    pub max_zoom: u8,

    /// Batch tiles into ROWSxCOLS metatiles, e.g. 4x4
    #[arg(long)]
    pub metatile: Option<String>,

    #[arg(long, default_value_t = false)]
    pub metatile_buffer: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageFormatArg {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}
