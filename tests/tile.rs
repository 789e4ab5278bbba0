use tilepress::tile::{MAX_LATITUDE, MAX_ZOOM, Tile, ZoomRange, clamp_extent, parse_extent_spec};

use geo_types::{Rect, coord};

#[test]
fn y_tms_is_an_involution() {
    for z in 0u8..=4 {
        let side = 1u32 << z;
        for y in 0..side {
            let tile = Tile::new(0, y, z);
            assert_eq!(tile.y_tms(), side - y - 1);
            let flipped = Tile::new(0, tile.y_tms(), z);
            assert_eq!(flipped.y_tms(), y);
        }
    }
}

#[test]
fn root_tile_spans_the_world() {
    let bounds = Tile::new(0, 0, 0).bounds();
    assert!((bounds.min().x - -180.0).abs() < 1e-9);
    assert!((bounds.max().x - 180.0).abs() < 1e-9);
    assert!((bounds.max().y - MAX_LATITUDE).abs() < 1e-9);
    assert!((bounds.min().y - -MAX_LATITUDE).abs() < 1e-9);
}

#[test]
fn children_partition_the_parent() {
    for (x, y, z) in [(0, 0, 0), (1, 0, 1), (2, 3, 2), (5, 5, 3)] {
        let parent = Tile::new(x, y, z).bounds();
        for child in Tile::new(x, y, z).children() {
            let bounds = child.bounds();
            assert!(bounds.min().x >= parent.min().x - 1e-9);
            assert!(bounds.max().x <= parent.max().x + 1e-9);
            assert!(bounds.min().y >= parent.min().y - 1e-9);
            assert!(bounds.max().y <= parent.max().y + 1e-9);
        }
    }
}

#[test]
fn clamp_extent_limits_latitude() {
    let extent = Rect::new(coord! { x: -200.0, y: -89.0 }, coord! { x: 200.0, y: 89.0 });
    let clamped = clamp_extent(&extent);
    assert_eq!(clamped.min().x, -180.0);
    assert_eq!(clamped.max().x, 180.0);
    assert_eq!(clamped.max().y, MAX_LATITUDE);
    assert_eq!(clamped.min().y, -MAX_LATITUDE);
}

#[test]
fn zoom_range_rejects_inverted_interval() {
    let err = ZoomRange::new(10, 5).expect_err("should reject");
    assert!(err.to_string().contains("min zoom"));

    let range = ZoomRange::new(3, 7).expect("valid");
    assert!(range.contains(3));
    assert!(range.contains(7));
    assert!(!range.contains(8));
}

#[test]
fn zoom_range_rejects_depths_past_the_grid_limit() {
    // Deep enough that tile index arithmetic would overflow.
    let err = ZoomRange::new(0, 64).expect_err("should reject");
    assert!(err.to_string().contains("supported maximum"));
    assert!(ZoomRange::new(31, 40).is_err());

    assert!(ZoomRange::new(0, MAX_ZOOM).is_ok());
}

#[test]
fn parse_extent_spec_accepts_lon_lat_quad() {
    let extent = parse_extent_spec("-10.5, -20.0, 30.25, 40").expect("parse");
    assert_eq!(extent.min().x, -10.5);
    assert_eq!(extent.min().y, -20.0);
    assert_eq!(extent.max().x, 30.25);
    assert_eq!(extent.max().y, 40.0);
}

#[test]
fn parse_extent_spec_rejects_bad_input() {
    assert!(parse_extent_spec("1,2,3").is_err());
    assert!(parse_extent_spec("a,b,c,d").is_err());
    assert!(parse_extent_spec("10,0,5,20").is_err());
}
