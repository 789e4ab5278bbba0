use geo_types::Rect;

use crate::tile::{Tile, ZoomRange, intersects};

/// Collects every tile intersecting `extent` at each zoom in `zooms`.
///
/// The walk is a quadtree descent from the root tile `(0, 0, 0)` driven by
/// an explicit work stack: a node whose rectangle misses the extent is
/// dropped along with its entire subtree, which keeps the visit count
/// proportional to the output rather than to `4^max_zoom`. Each `(x, y, z)`
/// is reachable through exactly one parent chain, so the result carries no
/// duplicates by construction.
///
/// The result is sorted by `(z, y, x)` so downstream rendering, progress
/// counting and cancellation points land in a fixed raster order per zoom
/// level.
pub fn enumerate_tiles(extent: &Rect<f64>, zooms: &ZoomRange) -> Vec<Tile> {
    let mut stack = vec![Tile::new(0, 0, 0)];
    let mut tiles = Vec::new();

    while let Some(tile) = stack.pop() {
        if !intersects(&tile.bounds(), extent) {
            continue;
        }
        if zooms.contains(tile.z) {
            tiles.push(tile);
        }
        if tile.z < zooms.max() {
            stack.extend(tile.children());
        }
    }

    tiles.sort_unstable();
    tiles
}
