use clap::{CommandFactory, Parser};

use vt_inspect::cli::{Cli, Command, ReportFormat};

#[test]
fn parse_tile_minimal() {
    let cli = Cli::parse_from(["vt-inspect", "tile", "14/8714/5414.pbf"]);
    assert_eq!(cli.log, "info");
    match cli.command {
        Command::Tile(args) => {
            assert_eq!(args.input.as_os_str(), "14/8714/5414.pbf");
            assert_eq!(args.tile, None);
            assert_eq!(args.layer, None);
            assert!(!args.geojson);
            assert_eq!(args.output, ReportFormat::Text);
        }
        _ => panic!("expected tile command"),
    }
}

#[test]
fn parse_tile_options() {
    let cli = Cli::parse_from([
        "vt-inspect",
        "tile",
        "fixture.mvt",
        "--tile",
        "3/4/5",
        "--layer",
        "roads",
        "--geojson",
        "--output",
        "json",
    ]);
    match cli.command {
        Command::Tile(args) => {
            assert_eq!(args.input.as_os_str(), "fixture.mvt");
            assert_eq!(args.tile.as_deref(), Some("3/4/5"));
            assert_eq!(args.layer.as_deref(), Some("roads"));
            assert!(args.geojson);
            assert_eq!(args.output, ReportFormat::Json);
        }
        _ => panic!("expected tile command"),
    }
}

#[test]
fn parse_stats_minimal() {
    let cli = Cli::parse_from(["vt-inspect", "stats", "a.pbf"]);
    match cli.command {
        Command::Stats(args) => {
            assert_eq!(args.inputs.len(), 1);
            assert_eq!(args.inputs[0].as_os_str(), "a.pbf");
            assert_eq!(args.threads, None);
            assert_eq!(args.timeout_ms, None);
            assert_eq!(args.output, ReportFormat::Text);
            assert!(!args.no_progress);
        }
        _ => panic!("expected stats command"),
    }
}

#[test]
fn parse_stats_options() {
    let cli = Cli::parse_from([
        "vt-inspect",
        "stats",
        "a.pbf",
        "b.pbf",
        "--threads",
        "8",
        "--timeout-ms",
        "2500",
        "--output",
        "ndjson",
        "--no-progress",
    ]);
    match cli.command {
        Command::Stats(args) => {
            assert_eq!(args.inputs.len(), 2);
            assert_eq!(args.inputs[0].as_os_str(), "a.pbf");
            assert_eq!(args.inputs[1].as_os_str(), "b.pbf");
            assert_eq!(args.threads, Some(8));
            assert_eq!(args.timeout_ms, Some(2500));
            assert_eq!(args.output, ReportFormat::Ndjson);
            assert!(args.no_progress);
        }
        _ => panic!("expected stats command"),
    }
}

#[test]
fn stats_requires_at_least_one_input() {
    assert!(Cli::try_parse_from(["vt-inspect", "stats"]).is_err());
}

#[test]
fn parse_log_level() {
    let cli = Cli::parse_from(["vt-inspect", "--log", "debug", "tile", "a.pbf"]);
    assert_eq!(cli.log, "debug");
}

#[test]
fn help_describes_fields() {
    let mut cmd = Cli::command();

    let tile = cmd.find_subcommand_mut("tile").expect("tile command");
    let mut buffer = Vec::new();
    tile.write_long_help(&mut buffer).expect("help");
    let help = String::from_utf8(buffer).expect("utf8");
    assert!(help.contains("Tile address"));
    assert!(help.contains("GeoJSON"));
    assert!(help.contains("Output format"));

    let stats = cmd.find_subcommand_mut("stats").expect("stats command");
    let mut buffer = Vec::new();
    stats.write_long_help(&mut buffer).expect("help");
    let help = String::from_utf8(buffer).expect("utf8");
    assert!(help.contains("Worker thread count"));
    assert!(help.contains("timeout in milliseconds"));
    assert!(help.contains("progress bar"));
}
