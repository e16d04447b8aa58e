// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use beatline::registry::Bucket;
use beatline::timeline::SelectionPoint;
use beatline::{Document, EditorConfig, PreserveMode, Timeline};
use tracing::Level;

fn print_usage() {
    println!("beatline - Beat/time mapping for rhythm-game levels");
    println!();
    println!("Usage: beatline [--config <FILE>] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  --mapping <LEVEL> [CHART]        Print the beat/time mapping");
    println!("  --events <LEVEL> [CHART]         List events with their times");
    println!("  --set-bpm <LEVEL> <N> <BPM> [MODE]");
    println!("                                   Set the tempo of tempo control N and print the level");
    println!("                                   MODE: keep-beats (default), keep-times, keep-times-after");
    println!("  --quantize <LEVEL> [GRID]        Snap every static event to the grid and print the level");
    println!("  --scaffold <AUDIO> <SECONDS>     Print a new level for an audio file");
    println!("  --help                           Show this help message");
}

fn init_logging(config: &EditorConfig) {
    let level: Level = config.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_timeline(config: &EditorConfig, level: &str, chart: Option<&String>) -> Result<Timeline> {
    let level_json = fs::read_to_string(Path::new(level))
        .with_context(|| format!("Failed to read level file: {}", level))?;
    let chart_json = match chart {
        Some(path) => fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read chart file: {}", path))?,
        None => "[]".to_string(),
    };
    let document = Document::from_json(&level_json, &chart_json)
        .with_context(|| format!("Failed to load level {}", level))?;
    Ok(Timeline::with_config(document, config)?)
}

fn print_mapping(timeline: &Timeline) {
    let start = timeline.start_data();
    println!(
        "first beat {:.3}, load beat {:.3}{}",
        start.true_first_beat,
        start.load_beat,
        if start.perform_load { " (preloading)" } else { "" }
    );
    println!("{:>12} {:>12} {:>10}", "beat", "time", "bpm");
    for point in timeline.mapping().points() {
        println!("{:>12.3} {:>12.3} {:>10.2}", point.b, point.t, point.bpm);
    }
}

fn print_events(timeline: &Timeline) {
    for (i, &id) in timeline.registry().bucket(Bucket::All).iter().enumerate() {
        let (Some(event), Some(entry)) = (timeline.event(id), timeline.timeline_event(id)) else {
            continue;
        };
        let time = timeline.beat_to_time(event.time);
        let source = if entry.from_chart { "chart" } else { "level" };
        let skipped = if entry.skipped { " [skipped]" } else { "" };
        println!("{:>9.3}s {:>5} {}{}", time, source, event.describe(Some(i)), skipped);
    }
}

fn print_level(timeline: &Timeline) -> Result<()> {
    let level = serde_json::to_string_pretty(&timeline.document().to_level())
        .context("Failed to serialize level")?;
    println!("{}", level);
    Ok(())
}

fn set_bpm(config: &EditorConfig, args: &[String]) -> Result<()> {
    if args.len() < 3 {
        bail!("--set-bpm requires a level file, a control number and a BPM");
    }
    let mut timeline = load_timeline(config, &args[0], None)?;
    let index: usize = args[1]
        .parse()
        .map_err(|_| anyhow!("Invalid control number: {}", args[1]))?;
    let bpm: f64 = args[2]
        .parse()
        .map_err(|_| anyhow!("Invalid BPM: {}", args[2]))?;
    let mode = match args.get(3) {
        Some(mode) => mode.parse::<PreserveMode>()?,
        None => PreserveMode::KeepBeats,
    };

    let controls = timeline.registry().tempo_controls();
    let target = *controls.get(index).ok_or_else(|| {
        anyhow!("No tempo control {} (level has {})", index, controls.len())
    })?;
    timeline.set_tempo(target, Some(bpm), mode, config.snap_grid, false)?;
    print_level(&timeline)
}

fn quantize(config: &EditorConfig, args: &[String]) -> Result<()> {
    let Some(level) = args.first() else {
        bail!("--quantize requires a level file");
    };
    let grid: f64 = match args.get(1) {
        Some(grid) => grid.parse().map_err(|_| anyhow!("Invalid grid: {}", grid))?,
        None => config.snap_grid,
    };
    let mut timeline = load_timeline(config, level, None)?;
    let selection: Vec<SelectionPoint> = timeline
        .registry()
        .statics()
        .iter()
        .flat_map(|&id| {
            let has_tail = timeline.event(id).map_or(false, |e| e.duration.is_some());
            let tail = has_tail.then(|| SelectionPoint::tail(id));
            std::iter::once(SelectionPoint::head(id)).chain(tail)
        })
        .collect();
    if selection.is_empty() {
        eprintln!("Nothing to quantize");
    } else {
        let moved = timeline.quantize(&selection, grid)?;
        eprintln!("Quantized {} events to 1/{} beat", moved, grid);
    }
    print_level(&timeline)
}

fn scaffold(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("--scaffold requires an audio file name and a length in seconds");
    }
    let seconds: f64 = args[1]
        .parse()
        .map_err(|_| anyhow!("Invalid length: {}", args[1]))?;
    let (level, _) = Document::scaffold(&args[0], seconds).to_json()?;
    println!("{}", level);
    Ok(())
}

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let config = if args.first().map(String::as_str) == Some("--config") {
        let path = args
            .get(1)
            .cloned()
            .ok_or_else(|| anyhow!("--config requires a file"))?;
        args = args.split_off(2);
        EditorConfig::load(&path)?
    } else {
        EditorConfig::default()
    };
    init_logging(&config);

    let Some(command) = args.first().cloned() else {
        println!("beatline - Beat/time mapping for rhythm-game levels");
        println!("Run with --help for usage information");
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "--mapping" | "--events" => {
            let Some(level) = rest.first() else {
                eprintln!("Error: {} requires a level file", command);
                std::process::exit(1);
            };
            let timeline = load_timeline(&config, level, rest.get(1))?;
            if command == "--mapping" {
                print_mapping(&timeline);
            } else {
                print_events(&timeline);
            }
        }
        "--set-bpm" => set_bpm(&config, rest)?,
        "--quantize" => quantize(&config, rest)?,
        "--scaffold" => scaffold(rest)?,
        "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown option: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
