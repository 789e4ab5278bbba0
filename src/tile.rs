use anyhow::Result;
use geo_types::{Coord, Rect, coord};

/// Latitude where the square Web-Mercator tile grid ends, i.e.
/// `atan(sinh(pi))` in degrees.
pub const MAX_LATITUDE: f64 = 85.0511287798066;

/// Deepest zoom level accepted in a job. Keeps tile indices well inside
/// `u32` so grid arithmetic cannot overflow.
pub const MAX_ZOOM: u8 = 30;

/// A tile address in the slippy-map scheme: top-left origin, `y` growing
/// southward. `y_tms` derives the bottom-left-origin row when a backend
/// needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub z: u8,
    pub y: u32,
    pub x: u32,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        debug_assert!(u64::from(x) < 1u64 << z && u64::from(y) < 1u64 << z);
        Tile { x, y, z }
    }

    /// Row index under the TMS (bottom-left origin) convention.
    pub fn y_tms(&self) -> u32 {
        ((1u64 << self.z) - u64::from(self.y) - 1) as u32
    }

    /// Geographic coordinates of the tile's top-left corner.
    pub fn origin(&self) -> Coord<f64> {
        tile_origin(i64::from(self.x), i64::from(self.y), self.z)
    }

    /// Geographic rectangle covered by this tile: its own top-left corner
    /// through the top-left corner of tile `(x+1, y+1)`.
    pub fn bounds(&self) -> Rect<f64> {
        let far = tile_origin(i64::from(self.x) + 1, i64::from(self.y) + 1, self.z);
        Rect::new(self.origin(), far)
    }

    pub fn children(&self) -> [Tile; 4] {
        let (x, y, z) = (self.x, self.y, self.z + 1);
        [
            Tile::new(2 * x, 2 * y, z),
            Tile::new(2 * x + 1, 2 * y, z),
            Tile::new(2 * x, 2 * y + 1, z),
            Tile::new(2 * x + 1, 2 * y + 1, z),
        ]
    }
}

/// Top-left corner of the tile at `(x, y, z)` via the inverse Web-Mercator
/// formula. Total over `i64` indices so rectangles of padded or buffered
/// metatile bounds (which may step outside `[0, 2^z)`) stay well defined.
pub fn tile_origin(x: i64, y: i64, z: u8) -> Coord<f64> {
    let n = (1u64 << z) as f64;
    let lon = x as f64 / n * 360.0 - 180.0;
    let lat = (std::f64::consts::PI * (1.0 - 2.0 * y as f64 / n))
        .sinh()
        .atan()
        .to_degrees();
    coord! { x: lon, y: lat }
}

/// Clamps a user-supplied lon/lat extent to the band the tile scheme can
/// represent.
pub fn clamp_extent(extent: &Rect<f64>) -> Rect<f64> {
    let min = extent.min();
    let max = extent.max();
    Rect::new(
        coord! { x: min.x.max(-180.0), y: min.y.max(-MAX_LATITUDE) },
        coord! { x: max.x.min(180.0), y: max.y.min(MAX_LATITUDE) },
    )
}

/// Closed-interval intersection test, matching how the extent drawn by the
/// user is compared against tile rectangles: tiles that merely touch the
/// extent edge are still exported.
pub fn intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// Parses an extent given as `min_lon,min_lat,max_lon,max_lat`.
pub fn parse_extent_spec(value: &str) -> Result<Rect<f64>> {
    use anyhow::Context;
    let parts: Vec<&str> = value.trim().split(',').collect();
    if parts.len() != 4 {
        anyhow::bail!("extent must be min_lon,min_lat,max_lon,max_lat");
    }
    let mut nums = [0f64; 4];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        *slot = part.trim().parse().context("invalid extent coordinate")?;
    }
    let [min_lon, min_lat, max_lon, max_lat] = nums;
    if min_lon >= max_lon || min_lat >= max_lat {
        anyhow::bail!("extent minimums must be strictly below maximums");
    }
    Ok(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}

/// Inclusive zoom interval. `min > max` or a max beyond [`MAX_ZOOM`] is a
/// rejected configuration, not a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min > max {
            anyhow::bail!("min zoom {min} is greater than max zoom {max}");
        }
        if max > MAX_ZOOM {
            anyhow::bail!("max zoom {max} exceeds the supported maximum {MAX_ZOOM}");
        }
        Ok(ZoomRange { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn contains(&self, z: u8) -> bool {
        self.min <= z && z <= self.max
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u8> {
        self.min..=self.max
    }
}
