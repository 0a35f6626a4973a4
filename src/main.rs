use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use vt_inspect::cli::{Cli, Command, ReportFormat};
use vt_inspect::decode::{DecodedTile, read_tile_payload};
use vt_inspect::fetch::{FetchCoordinator, FetchOptions};
use vt_inspect::geometry::{parse_tile_spec, tile_coord_from_path};
use vt_inspect::output;
use vt_inspect::stats::collect_tile_stats;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Command::Tile(args) => {
            ensure_tile_path(&args.input)?;
            if args.layer.is_some() && !args.geojson {
                anyhow::bail!("--layer requires --geojson");
            }
            let coord = match args.tile.as_deref() {
                Some(value) => Some(parse_tile_spec(value)?),
                None => tile_coord_from_path(&args.input),
            };
            let payload = read_tile_payload(&args.input)?;
            let tile = DecodedTile::decode(payload)?;

            if args.geojson {
                let coord = match coord {
                    Some(coord) => coord,
                    None => anyhow::bail!("--geojson requires --tile z/x/y or a z/x/y input path"),
                };
                let mut collections: Vec<(String, serde_json::Value)> = Vec::new();
                match args.layer.as_deref() {
                    Some(name) => {
                        let layer = tile
                            .layer(name)
                            .with_context(|| format!("layer {name} not found in tile"))?;
                        collections.push((
                            name.to_string(),
                            output::layer_feature_collection(&tile, layer, coord)?,
                        ));
                    }
                    None => {
                        for layer in tile.layers() {
                            collections.push((
                                layer.name.clone(),
                                output::layer_feature_collection(&tile, layer, coord)?,
                            ));
                        }
                    }
                }
                match args.output {
                    ReportFormat::Json => {
                        let map: serde_json::Map<String, serde_json::Value> =
                            collections.into_iter().collect();
                        let json = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
                        println!("{}", json);
                    }
                    ReportFormat::Ndjson => {
                        for line in output::geojson_ndjson_lines(&collections)? {
                            println!("{}", line);
                        }
                    }
                    ReportFormat::Text => {
                        for (name, collection) in collections.iter() {
                            println!("## {}", name);
                            println!("{}", serde_json::to_string_pretty(collection)?);
                        }
                    }
                }
                return Ok(());
            }

            let stats = collect_tile_stats(&tile)?;
            match args.output {
                ReportFormat::Json => {
                    let json = serde_json::to_string_pretty(&stats)?;
                    println!("{}", json);
                }
                ReportFormat::Ndjson => {
                    let input = args.input.display().to_string();
                    for line in output::tile_ndjson_lines(&input, &stats)? {
                        println!("{}", line);
                    }
                }
                ReportFormat::Text => {
                    for line in output::format_tile_report(coord, &stats) {
                        println!("{}", line);
                    }
                }
            }
        }
        Command::Stats(args) => {
            for input in args.inputs.iter() {
                ensure_tile_path(input)?;
            }
            let options = FetchOptions {
                workers: args.threads.unwrap_or(0),
                timeout: args.timeout_ms.map(Duration::from_millis),
            };
            let mut coordinator = FetchCoordinator::new(options);
            let progress = if args.no_progress || args.inputs.len() < 2 {
                ProgressBar::hidden()
            } else {
                make_progress_bar(args.inputs.len() as u64)
            };

            let mut pending = Vec::with_capacity(args.inputs.len());
            for input in args.inputs.iter() {
                pending.push(coordinator.request(&input.display().to_string())?);
            }
            let mut failed = 0usize;
            for fetch in pending {
                let key = fetch.key().to_string();
                if let Err(err) = fetch.wait() {
                    tracing::warn!(tile = %key, error = %err, "tile skipped");
                    failed += 1;
                }
                progress.inc(1);
            }
            progress.finish_and_clear();
            coordinator.shutdown();

            let report = coordinator.summary();
            match args.output {
                ReportFormat::Json => {
                    let json = serde_json::to_string_pretty(&report)?;
                    println!("{}", json);
                }
                ReportFormat::Ndjson => {
                    for line in output::stats_ndjson_lines(&report)? {
                        println!("{}", line);
                    }
                }
                ReportFormat::Text => {
                    for line in output::format_dashboard(&report) {
                        println!("{}", line);
                    }
                    if failed > 0 {
                        println!("failed_tiles: {}", failed);
                    }
                }
            }
        }
    }

    Ok(())
}

fn ensure_tile_path(path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pbf") | Some("mvt") => Ok(()),
        _ => anyhow::bail!("expected a .pbf or .mvt tile, got {}", path.display()),
    }
}

fn make_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    bar
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
