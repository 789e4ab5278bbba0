use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use geo_types::{Rect, coord};
use image::RgbaImage;
use tilepress::enumerate::enumerate_tiles;
use tilepress::job::{
    CancelToken, JobConfig, JobOutcome, plan_tiling_job, run_tiling_job,
};
use tilepress::metatile::MetatilePolicy;
use tilepress::progress::{ChannelSink, NullSink, ProgressEvent};
use tilepress::render::{FlatFillBackend, TileImageFormat};
use tilepress::tile::ZoomRange;

fn small_extent() -> Rect<f64> {
    Rect::new(coord! { x: -1.0, y: -1.0 }, coord! { x: 1.0, y: 1.0 })
}

fn config(output: &Path, zooms: ZoomRange) -> JobConfig {
    JobConfig {
        extent: small_extent(),
        zooms,
        tile_width: 8,
        tile_height: 8,
        format: TileImageFormat::Png,
        quality: 85,
        output: output.to_path_buf(),
        root_dir: Some("tileset".to_string()),
        tms: false,
        metatile: None,
    }
}

fn listed_tiles(root: &Path) -> BTreeSet<String> {
    let mut tiles = BTreeSet::new();
    for z_entry in std::fs::read_dir(root).expect("read root") {
        let z_dir = z_entry.expect("entry").path();
        for x_entry in std::fs::read_dir(&z_dir).expect("read zoom dir") {
            let x_dir = x_entry.expect("entry").path();
            for y_entry in std::fs::read_dir(&x_dir).expect("read col dir") {
                let y_file = y_entry.expect("entry").path();
                tiles.insert(
                    y_file
                        .strip_prefix(root)
                        .expect("prefix")
                        .to_string_lossy()
                        .to_string(),
                );
            }
        }
    }
    tiles
}

#[test]
fn inverted_zoom_range_is_rejected_before_any_work() {
    assert!(ZoomRange::new(10, 5).is_err());
}

#[test]
fn size_one_metatile_policy_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), ZoomRange::new(0, 2).expect("range"));
    config.metatile = Some(MetatilePolicy {
        rows: 1,
        cols: 2,
        buffer: false,
    });

    let mut backend = FlatFillBackend::new([0, 0, 0, 255]);
    let err = run_tiling_job(&config, &mut backend, &NullSink, &CancelToken::new())
        .expect_err("should reject");
    assert!(err.to_string().contains("at least 2x2"));
}

#[test]
fn plain_job_writes_every_enumerated_tile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zooms = ZoomRange::new(0, 2).expect("range");
    let config = config(dir.path(), zooms);

    let expected = enumerate_tiles(&small_extent(), &zooms).len() as u64;
    let mut backend = FlatFillBackend::new([0, 128, 255, 255]);
    let outcome = run_tiling_job(&config, &mut backend, &NullSink, &CancelToken::new())
        .expect("run");

    let JobOutcome::Completed(summary) = outcome else {
        panic!("expected completed outcome");
    };
    assert_eq!(summary.tiles_written, expected);
    assert_eq!(summary.items_processed, expected);
    assert_eq!(summary.items_total, expected);
    assert_eq!(
        summary.tiles_by_zoom.values().sum::<u64>(),
        summary.tiles_written
    );

    let listed = listed_tiles(&dir.path().join("tileset"));
    assert_eq!(listed.len(), expected as usize);
}

#[test]
fn metatiled_job_writes_the_same_tile_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zooms = ZoomRange::new(0, 3).expect("range");

    // Wide enough that z=3 spans a 4x4 tile box and splits into several
    // buffered metatiles.
    let wide = Rect::new(coord! { x: -60.0, y: -60.0 }, coord! { x: 60.0, y: 60.0 });

    let plain_dir = dir.path().join("plain");
    std::fs::create_dir_all(&plain_dir).expect("mkdir");
    let mut plain = config(&plain_dir, zooms);
    plain.extent = wide;
    let mut backend = FlatFillBackend::new([10, 20, 30, 255]);
    run_tiling_job(&plain, &mut backend, &NullSink, &CancelToken::new()).expect("plain run");

    let meta_dir = dir.path().join("meta");
    std::fs::create_dir_all(&meta_dir).expect("mkdir");
    let mut meta = config(&meta_dir, zooms);
    meta.extent = wide;
    meta.metatile = Some(MetatilePolicy {
        rows: 2,
        cols: 2,
        buffer: true,
    });
    let outcome = run_tiling_job(&meta, &mut backend, &NullSink, &CancelToken::new())
        .expect("metatiled run");
    assert!(matches!(outcome, JobOutcome::Completed(_)));

    assert_eq!(
        listed_tiles(&plain_dir.join("tileset")),
        listed_tiles(&meta_dir.join("tileset"))
    );
}

#[test]
fn cancellation_stops_after_the_current_item_and_finalizes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("tiles.mbtiles");
    let zooms = ZoomRange::new(0, 2).expect("range");
    let config = config(&db_path, zooms);

    let total = enumerate_tiles(&small_extent(), &zooms).len() as u64;
    assert!(total > 1);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut renders = 0u64;
    let mut backend = move |_extent: &Rect<f64>, width: u32, height: u32| -> Result<RgbaImage> {
        renders += 1;
        if renders == 1 {
            trigger.cancel();
        }
        Ok(RgbaImage::new(width, height))
    };

    let outcome = run_tiling_job(&config, &mut backend, &NullSink, &cancel).expect("run");
    let JobOutcome::Interrupted(summary) = outcome else {
        panic!("expected interrupted outcome");
    };
    assert_eq!(summary.items_processed, 1);
    assert_eq!(summary.tiles_written, 1);

    // Finalize ran: the database is closed and readable, with exactly the
    // tiles written before the cancellation point.
    let conn = rusqlite::Connection::open(&db_path).expect("open db");
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 1);
}

#[test]
fn render_failure_fails_the_job_but_still_finalizes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_path = dir.path().join("tiles.zip");
    let config = config(&archive_path, ZoomRange::new(0, 1).expect("range"));

    let mut backend = |_extent: &Rect<f64>, _w: u32, _h: u32| -> Result<RgbaImage> {
        anyhow::bail!("renderer exploded")
    };
    let err = run_tiling_job(&config, &mut backend, &NullSink, &CancelToken::new())
        .expect_err("should fail");
    assert!(format!("{err:#}").contains("renderer exploded"));

    // The archive was still closed into a valid (empty) zip.
    let file = std::fs::File::open(&archive_path).expect("open archive");
    let archive = zip::ZipArchive::new(file).expect("valid archive");
    assert_eq!(archive.len(), 0);
}

#[test]
fn wrong_render_dimensions_are_a_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), ZoomRange::new(0, 0).expect("range"));

    let mut backend =
        |_extent: &Rect<f64>, _w: u32, _h: u32| -> Result<RgbaImage> { Ok(RgbaImage::new(1, 1)) };
    let err = run_tiling_job(&config, &mut backend, &NullSink, &CancelToken::new())
        .expect_err("should fail");
    assert!(err.to_string().contains("expected 8x8"));
}

#[test]
fn progress_events_announce_stages_then_advance_per_item() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zooms = ZoomRange::new(0, 1).expect("range");
    let config = config(dir.path(), zooms);
    let total = enumerate_tiles(&small_extent(), &zooms).len() as u64;

    let (sender, receiver) = crossbeam_channel::unbounded();
    let sink = ChannelSink::new(sender);
    let mut backend = FlatFillBackend::new([0, 0, 0, 255]);
    run_tiling_job(&config, &mut backend, &sink, &CancelToken::new()).expect("run");
    drop(sink);

    let events: Vec<ProgressEvent> = receiver.iter().collect();
    assert_eq!(
        events[0],
        ProgressEvent::StageStarted {
            label: "searching tiles".to_string(),
            total: 1,
        }
    );
    assert_eq!(events[1], ProgressEvent::Advanced);
    assert_eq!(
        events[2],
        ProgressEvent::StageStarted {
            label: "rendering tiles".to_string(),
            total,
        }
    );
    let advances = events[3..]
        .iter()
        .filter(|e| **e == ProgressEvent::Advanced)
        .count() as u64;
    assert_eq!(advances, total);
    assert_eq!(events.len() as u64, 3 + total);
}

#[test]
fn plan_counts_match_a_real_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zooms = ZoomRange::new(0, 2).expect("range");
    let policy = MetatilePolicy {
        rows: 2,
        cols: 2,
        buffer: false,
    };
    let report = plan_tiling_job(&small_extent(), &zooms, Some(&policy));

    let mut config = config(dir.path(), zooms);
    config.metatile = Some(policy);
    let mut backend = FlatFillBackend::new([255, 255, 255, 255]);
    let outcome = run_tiling_job(&config, &mut backend, &NullSink, &CancelToken::new())
        .expect("run");

    let summary = outcome.summary();
    assert_eq!(report.tiles, summary.tiles_written);
    assert_eq!(report.metatiles, Some(summary.items_total));
}
