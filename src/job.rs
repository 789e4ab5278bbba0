use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use geo_types::Rect;
use serde::Serialize;
use tracing::{info, warn};

use crate::enumerate::enumerate_tiles;
use crate::metatile::{Metatile, MetatilePolicy, TileIndexBounds, group_metatiles};
use crate::progress::ProgressSink;
use crate::render::{RenderBackend, TileImageFormat, encode_tile};
use crate::tile::{Tile, ZoomRange, clamp_extent};
use crate::writer::open_writer;

/// Immutable description of one export job. Built once, never mutated
/// while the job runs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Geographic extent to cover, lon/lat. Clamped to the Mercator-valid
    /// latitude band before enumeration.
    pub extent: Rect<f64>,
    pub zooms: ZoomRange,
    pub tile_width: u32,
    pub tile_height: u32,
    pub format: TileImageFormat,
    pub quality: u8,
    /// Destination: a directory, a `.zip` path or an `.mbtiles` path. The
    /// trailing form selects the backend.
    pub output: PathBuf,
    /// Name of the tileset root inside the destination. Defaults to
    /// `tileset_<unix-ts>` when empty.
    pub root_dir: Option<String>,
    /// Number rows bottom-up (TMS) instead of top-down in directory and
    /// zip outputs. MBTiles output is always TMS regardless.
    pub tms: bool,
    pub metatile: Option<MetatilePolicy>,
}

impl JobConfig {
    fn resolved_root_dir(&self) -> String {
        match self.root_dir.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let ts = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                format!("tileset_{ts}")
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            anyhow::bail!("tile size must be at least 1x1 pixels");
        }
        if let Some(policy) = &self.metatile {
            // A size-1 dimension cannot cover a span's final strip.
            if policy.rows < 2 || policy.cols < 2 {
                anyhow::bail!("metatile size must be at least 2x2 tiles");
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation flag, settable from any thread while the
/// worker polls it once per tile or metatile.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    /// Tiles handed to the writer.
    pub tiles_written: u64,
    /// Tiles or metatiles rendered, out of `items_total`.
    pub items_processed: u64,
    pub items_total: u64,
    pub tiles_by_zoom: BTreeMap<u8, u64>,
}

/// Terminal outcome of a job that did not fail outright. Failure is the
/// `Err` arm of [`run_tiling_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobSummary),
    Interrupted(JobSummary),
}

impl JobOutcome {
    pub fn summary(&self) -> &JobSummary {
        match self {
            JobOutcome::Completed(summary) | JobOutcome::Interrupted(summary) => summary,
        }
    }
}

pub const STAGE_SEARCHING: &str = "searching tiles";
pub const STAGE_RENDERING_TILES: &str = "rendering tiles";
pub const STAGE_RENDERING_METATILES: &str = "rendering metatiles";

/// Runs one export end to end: enumerate, optionally group into metatiles,
/// render sequentially, persist, finalize.
///
/// The render backend and the writer are exclusively owned for the job's
/// lifetime; nothing here renders concurrently. The cancel token is
/// checked once per item, and the writer is finalized on every exit path,
/// including failure, so no archive or database is left open.
pub fn run_tiling_job(
    config: &JobConfig,
    backend: &mut dyn RenderBackend,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<JobOutcome> {
    config.validate()?;
    let extent = clamp_extent(&config.extent);
    let root_dir = config.resolved_root_dir();
    let mut writer = open_writer(&config.output, &root_dir, config.format, config.tms)
        .context("open output backend")?;

    progress.begin_stage(STAGE_SEARCHING, 1);
    let tiles = enumerate_tiles(&extent, &config.zooms);
    progress.advance();
    info!(tiles = tiles.len(), "enumerated tile set");

    let plan = match &config.metatile {
        Some(policy) => Plan::metatiled(&tiles, &config.zooms, policy),
        None => Plan::plain(tiles),
    };

    let result = run_render_loop(config, &plan, backend, progress, cancel, writer.as_mut());

    // Finalize regardless of how the loop ended so handles are never
    // leaked; a failed loop still reports its own error first.
    let finalized = writer.finalize();
    match result {
        Ok((interrupted, summary)) => {
            finalized?;
            if interrupted {
                info!(processed = summary.items_processed, "job interrupted");
                Ok(JobOutcome::Interrupted(summary))
            } else {
                info!(tiles = summary.tiles_written, "job completed");
                Ok(JobOutcome::Completed(summary))
            }
        }
        Err(err) => {
            if let Err(fin_err) = finalized {
                warn!(error = %fin_err, "finalize failed after job error");
            }
            Err(err)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanZoomReport {
    pub zoom: u8,
    pub tiles: u64,
    pub metatiles: Option<u64>,
}

/// What a job would render, without rendering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub tiles: u64,
    pub metatiles: Option<u64>,
    pub by_zoom: Vec<PlanZoomReport>,
}

/// Dry-run enumeration: counts the tiles (and metatiles, when a policy is
/// given) a job over this extent and zoom range would process.
pub fn plan_tiling_job(
    extent: &Rect<f64>,
    zooms: &ZoomRange,
    metatile: Option<&MetatilePolicy>,
) -> PlanReport {
    let extent = clamp_extent(extent);
    let tiles = enumerate_tiles(&extent, zooms);
    let mut by_zoom = Vec::new();
    let mut total_metatiles = metatile.map(|_| 0u64);
    for z in zooms.iter() {
        let level: Vec<&Tile> = tiles.iter().filter(|t| t.z == z).collect();
        let metatiles = metatile.and_then(|policy| {
            TileIndexBounds::from_tiles(level.iter().copied())
                .map(|bounds| group_metatiles(&bounds, z, policy).len() as u64)
        });
        if let (Some(total), Some(count)) = (total_metatiles.as_mut(), metatiles) {
            *total += count;
        }
        by_zoom.push(PlanZoomReport {
            zoom: z,
            tiles: level.len() as u64,
            metatiles,
        });
    }
    PlanReport {
        tiles: tiles.len() as u64,
        metatiles: total_metatiles,
        by_zoom,
    }
}

/// Precomputed work list; built before rendering starts so the progress
/// total is known up front.
enum Plan {
    Tiles(Vec<Tile>),
    Metatiles {
        metatiles: Vec<Metatile>,
        /// Enumerated `(x, y)` sets per zoom, consulted by slicing to skip
        /// padding and buffer extras.
        levels: HashMap<u8, HashSet<(u32, u32)>>,
    },
}

impl Plan {
    fn plain(tiles: Vec<Tile>) -> Self {
        Plan::Tiles(tiles)
    }

    fn metatiled(tiles: &[Tile], zooms: &ZoomRange, policy: &MetatilePolicy) -> Self {
        let mut metatiles = Vec::new();
        let mut levels: HashMap<u8, HashSet<(u32, u32)>> = HashMap::new();
        for z in zooms.iter() {
            let level: Vec<&Tile> = tiles.iter().filter(|t| t.z == z).collect();
            levels.insert(z, level.iter().map(|t| (t.x, t.y)).collect());
            if let Some(bounds) = TileIndexBounds::from_tiles(level.into_iter()) {
                metatiles.extend(group_metatiles(&bounds, z, policy));
            }
        }
        Plan::Metatiles { metatiles, levels }
    }
}

fn run_render_loop(
    config: &JobConfig,
    plan: &Plan,
    backend: &mut dyn RenderBackend,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
    writer: &mut dyn crate::writer::TileWriter,
) -> Result<(bool, JobSummary)> {
    let mut summary = JobSummary::default();
    let mut interrupted = false;

    match plan {
        Plan::Tiles(tiles) => {
            summary.items_total = tiles.len() as u64;
            progress.begin_stage(STAGE_RENDERING_TILES, summary.items_total);
            for tile in tiles {
                let image = backend
                    .render(&tile.bounds(), config.tile_width, config.tile_height)
                    .with_context(|| {
                        format!("render tile {}/{}/{}", tile.z, tile.x, tile.y)
                    })?;
                check_dimensions(&image, config.tile_width, config.tile_height)?;
                let data = encode_tile(&image, config.format, config.quality)?;
                writer.write_tile(tile, &data)?;
                summary.tiles_written += 1;
                *summary.tiles_by_zoom.entry(tile.z).or_insert(0) += 1;
                summary.items_processed += 1;
                progress.advance();
                if cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }
            }
        }
        Plan::Metatiles { metatiles, levels } => {
            summary.items_total = metatiles.len() as u64;
            progress.begin_stage(STAGE_RENDERING_METATILES, summary.items_total);
            for metatile in metatiles {
                let (width, height) =
                    metatile.pixel_size(config.tile_width, config.tile_height);
                let image = backend
                    .render(&metatile.rectangle(), width, height)
                    .with_context(|| format!("render metatile at zoom {}", metatile.zoom))?;
                check_dimensions(&image, width, height)?;
                let level = levels
                    .get(&metatile.zoom)
                    .context("metatile refers to an unplanned zoom level")?;
                let written = metatile.slice(
                    &image,
                    config.format,
                    config.quality,
                    config.tile_width,
                    config.tile_height,
                    level,
                    writer,
                )?;
                summary.tiles_written += written;
                *summary.tiles_by_zoom.entry(metatile.zoom).or_insert(0) += written;
                summary.items_processed += 1;
                progress.advance();
                if cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }
            }
        }
    }

    Ok((interrupted, summary))
}

fn check_dimensions(image: &image::RgbaImage, width: u32, height: u32) -> Result<()> {
    if image.dimensions() != (width, height) {
        anyhow::bail!(
            "render backend returned a {}x{} image, expected {width}x{height}",
            image.width(),
            image.height()
        );
    }
    Ok(())
}
