use std::collections::HashSet;

use anyhow::Result;
use geo_types::Rect;
use image::RgbaImage;
use image::imageops::crop_imm;
use tracing::debug;

use crate::render::{TileImageFormat, encode_tile};
use crate::tile::{Tile, tile_origin};
use crate::writer::TileWriter;

/// How tiles are batched into metatiles. Both dimensions must be at
/// least 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetatilePolicy {
    pub rows: u32,
    pub cols: u32,
    /// Render one extra ring of tiles around each metatile so labels and
    /// edge symbology drawn near tile seams match their neighbours. The
    /// ring is rendered but never written.
    pub buffer: bool,
}

/// Parses a metatile size given as `ROWSxCOLS`, e.g. `4x4`.
pub fn parse_metatile_spec(value: &str) -> Result<(u32, u32)> {
    use anyhow::Context;
    let trimmed = value.trim();
    let (rows_str, cols_str) = trimmed
        .split_once(['x', 'X'])
        .context("metatile size must be ROWSxCOLS")?;
    let rows: u32 = rows_str.trim().parse().context("invalid metatile rows")?;
    let cols: u32 = cols_str.trim().parse().context("invalid metatile cols")?;
    // The partition walk steps in whole metatiles and needs at least two
    // tiles per dimension to cover a span's final strip.
    if rows < 2 || cols < 2 {
        anyhow::bail!("metatile size must be at least 2x2");
    }
    Ok((rows, cols))
}

/// Inclusive tile-index bounding box for one zoom level.
///
/// Indices are `i64`: buffering a metatile that touches the world edge
/// steps to `-1`, and remainder padding can step past `2^z - 1`. Geometry
/// stays well defined for both; slicing skips anything that was never
/// enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileIndexBounds {
    pub row_min: i64,
    pub row_max: i64,
    pub col_min: i64,
    pub col_max: i64,
}

impl TileIndexBounds {
    /// Reduces a zoom level's enumerated tiles to their index bounding box.
    /// Returns `None` when the level holds no tiles.
    pub fn from_tiles<'a>(tiles: impl Iterator<Item = &'a Tile>) -> Option<Self> {
        let mut bounds: Option<TileIndexBounds> = None;
        for tile in tiles {
            let (x, y) = (i64::from(tile.x), i64::from(tile.y));
            bounds = Some(match bounds {
                None => TileIndexBounds {
                    row_min: y,
                    row_max: y,
                    col_min: x,
                    col_max: x,
                },
                Some(b) => TileIndexBounds {
                    row_min: b.row_min.min(y),
                    row_max: b.row_max.max(y),
                    col_min: b.col_min.min(x),
                    col_max: b.col_max.max(x),
                },
            });
        }
        bounds
    }

    pub fn rows(&self) -> i64 {
        self.row_max - self.row_min + 1
    }

    pub fn cols(&self) -> i64 {
        self.col_max - self.col_min + 1
    }

    fn expanded(&self) -> Self {
        TileIndexBounds {
            row_min: self.row_min - 1,
            row_max: self.row_max + 1,
            col_min: self.col_min - 1,
            col_max: self.col_max + 1,
        }
    }
}

/// One render batch: a rectangular group of tiles at a single zoom level,
/// rendered as one image and sliced back into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metatile {
    /// Tile-index bounds, including the buffer ring when `buffered`.
    pub bounds: TileIndexBounds,
    pub zoom: u8,
    pub buffered: bool,
}

impl Metatile {
    /// Geographic rectangle spanning the (possibly buffered) tile range.
    pub fn rectangle(&self) -> Rect<f64> {
        let near = tile_origin(self.bounds.col_min, self.bounds.row_min, self.zoom);
        let far = tile_origin(self.bounds.col_max + 1, self.bounds.row_max + 1, self.zoom);
        Rect::new(near, far)
    }

    /// Raster size to render at. The bounds already include the buffer
    /// ring, so a buffered metatile comes out at
    /// `(logical_cols + 2) * tile_width` by `(logical_rows + 2) * tile_height`.
    pub fn pixel_size(&self, tile_width: u32, tile_height: u32) -> (u32, u32) {
        (
            self.bounds.cols() as u32 * tile_width,
            self.bounds.rows() as u32 * tile_height,
        )
    }

    /// Crops the rendered metatile into its constituent tiles and hands
    /// each one to `writer`.
    ///
    /// Only tiles present in `level` — the enumerated `(x, y)` set for this
    /// zoom — are written: indices introduced by remainder padding or by
    /// the buffer ring fall outside it and are discarded. Returns the
    /// number of tiles written.
    pub fn slice(
        &self,
        image: &RgbaImage,
        format: TileImageFormat,
        quality: u8,
        tile_width: u32,
        tile_height: u32,
        level: &HashSet<(u32, u32)>,
        writer: &mut dyn TileWriter,
    ) -> Result<u64> {
        // Grid offsets within the rendered image; a buffered metatile's
        // outermost ring is never sliced.
        let (min_offset, row_end, col_end) = if self.buffered {
            (1, self.bounds.rows() - 1, self.bounds.cols() - 1)
        } else {
            (0, self.bounds.rows(), self.bounds.cols())
        };

        let mut written = 0u64;
        for gx in min_offset..col_end {
            for gy in min_offset..row_end {
                let tile_x = self.bounds.col_min + gx;
                let tile_y = self.bounds.row_min + gy;
                let (Ok(x), Ok(y)) = (u32::try_from(tile_x), u32::try_from(tile_y)) else {
                    continue;
                };
                if !level.contains(&(x, y)) {
                    continue;
                }
                let crop = crop_imm(
                    image,
                    gx as u32 * tile_width,
                    gy as u32 * tile_height,
                    tile_width,
                    tile_height,
                )
                .to_image();
                let tile = Tile::new(x, y, self.zoom);
                let data = encode_tile(&crop, format, quality)?;
                writer.write_tile(&tile, &data)?;
                written += 1;
            }
        }
        debug!(zoom = self.zoom, written, "sliced metatile");
        Ok(written)
    }
}

/// Partitions one zoom level's tile-index bounding box into metatiles.
///
/// When the configured metatile size covers the whole span in both
/// dimensions a single unbuffered metatile is emitted. Otherwise the span
/// is padded upward by its remainder against the metatile size so the walk
/// never leaves a partial strip uncovered, and the padded box is walked
/// column-major in metatile-sized steps. This raster order is fixed so
/// progress reporting stays deterministic. Buffering applies to each
/// emitted metatile's bounds, after padding.
pub fn group_metatiles(bounds: &TileIndexBounds, zoom: u8, policy: &MetatilePolicy) -> Vec<Metatile> {
    debug_assert!(policy.rows >= 2 && policy.cols >= 2);
    let meta_rows = i64::from(policy.rows);
    let meta_cols = i64::from(policy.cols);
    let mut metatiles = Vec::new();

    if meta_cols >= bounds.cols() && meta_rows >= bounds.rows() {
        metatiles.push(Metatile {
            bounds: *bounds,
            zoom,
            buffered: false,
        });
        return metatiles;
    }

    let mut padded = *bounds;
    padded.row_max += bounds.rows() % meta_rows;
    padded.col_max += bounds.cols() % meta_cols;

    let mut col_start = padded.col_min;
    while col_start < padded.col_max {
        let mut row_start = padded.row_min;
        while row_start < padded.row_max {
            let cell = TileIndexBounds {
                row_min: row_start,
                row_max: row_start + meta_rows - 1,
                col_min: col_start,
                col_max: col_start + meta_cols - 1,
            };
            metatiles.push(Metatile {
                bounds: if policy.buffer { cell.expanded() } else { cell },
                zoom,
                buffered: policy.buffer,
            });
            row_start += meta_rows;
        }
        col_start += meta_cols;
    }
    metatiles
}
