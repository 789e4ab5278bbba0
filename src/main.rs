use anyhow::Result;
use clap::Parser;

use tilepress::cli::{Cli, Command, ImageFormatArg, ReportFormat};
use tilepress::job::{
    CancelToken, JobConfig, JobOutcome, plan_tiling_job, run_tiling_job,
};
use tilepress::metatile::{MetatilePolicy, parse_metatile_spec};
use tilepress::progress::BarSink;
use tilepress::render::{FlatFillBackend, TileImageFormat, parse_fill_spec};
use tilepress::tile::{ZoomRange, parse_extent_spec};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::Render(args) => {
            let extent = parse_extent_spec(&args.extent)?;
            let zooms = ZoomRange::new(args.min_zoom, args.max_zoom)?;
            let metatile = parse_metatile_policy(args.metatile.as_deref(), args.metatile_buffer)?;
            let fill = parse_fill_spec(&args.fill)?;
            let config = JobConfig {
                extent,
                zooms,
                tile_width: args.tile_size,
                tile_height: args.tile_size,
                format: match args.format {
                    ImageFormatArg::Png => TileImageFormat::Png,
                    ImageFormatArg::Jpeg => TileImageFormat::Jpeg,
                },
                quality: args.quality,
                output: args.output,
                root_dir: args.root_dir,
                tms: args.tms,
                metatile,
            };

            let mut backend = FlatFillBackend::new(fill);
            let progress = BarSink::new(args.no_progress);
            let cancel = CancelToken::new();
            let outcome = run_tiling_job(&config, &mut backend, &progress, &cancel)?;
            progress.finish();

            let status = match &outcome {
                JobOutcome::Completed(_) => "completed",
                JobOutcome::Interrupted(_) => "interrupted",
            };
            let summary = outcome.summary();
            match args.report {
                ReportFormat::Json => {
                    let json = serde_json::to_string_pretty(&serde_json::json!({
                        "status": status,
                        "summary": summary,
                    }))?;
                    println!("{}", json);
                }
                ReportFormat::Text => {
                    println!("status: {status}");
                    println!(
                        "tiles_written: {} items: {}/{}",
                        summary.tiles_written, summary.items_processed, summary.items_total
                    );
                    for (zoom, tiles) in summary.tiles_by_zoom.iter() {
                        println!("z={zoom}: tiles={tiles}");
                    }
                }
            }
        }
        Command::Plan(args) => {
            let extent = parse_extent_spec(&args.extent)?;
            let zooms = ZoomRange::new(args.min_zoom, args.max_zoom)?;
            let metatile = parse_metatile_policy(args.metatile.as_deref(), args.metatile_buffer)?;
            let report = plan_tiling_job(&extent, &zooms, metatile.as_ref());
            match args.report {
                ReportFormat::Json => {
                    let json = serde_json::to_string_pretty(&report)?;
                    println!("{}", json);
                }
                ReportFormat::Text => {
                    match report.metatiles {
                        Some(metatiles) => {
                            println!("tiles: {} metatiles: {}", report.tiles, metatiles)
                        }
                        None => println!("tiles: {}", report.tiles),
                    }
                    for zoom in report.by_zoom.iter() {
                        match zoom.metatiles {
                            Some(metatiles) => println!(
                                "z={}: tiles={} metatiles={}",
                                zoom.zoom, zoom.tiles, metatiles
                            ),
                            None => println!("z={}: tiles={}", zoom.zoom, zoom.tiles),
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn parse_metatile_policy(spec: Option<&str>, buffer: bool) -> Result<Option<MetatilePolicy>> {
    match spec {
        Some(value) => {
            let (rows, cols) = parse_metatile_spec(value)?;
            Ok(Some(MetatilePolicy { rows, cols, buffer }))
        }
        None => Ok(None),
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
