mod cli;

use sampledrain::{
    config,
    sink::{LogSink, SampleSink, TrackFileSink},
    watch,
    worker::DrainWorker,
};
use sampledrain_media::{InterleaveStrategy, MovieIndex};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "sampledrain=trace,sampledrain_media=trace".to_string()
        } else {
            "sampledrain=info,sampledrain_media=info".to_string()
        }
    });

    // Samples may go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Drain {
            file,
            out_dir,
            keep,
            strategy,
            json,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(strategy) = strategy {
                config.drain.strategy = strategy;
            }
            if keep {
                config.drain.remove_after_drain = false;
            }
            if out_dir.is_some() {
                config.drain.output_dir = out_dir;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(drain_one(&file, &config.drain, json))
        }
        Commands::Inspect { file, json } => inspect_file(&file, json),
        Commands::Watch => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch_and_drain(config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("sampledrain {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn make_sink(config: &config::DrainConfig, file: &Path, json: bool) -> Result<Box<dyn SampleSink>> {
    Ok(match &config.output_dir {
        Some(dir) => Box::new(TrackFileSink::new(dir, file)?),
        None => Box::new(LogSink::stdout(json)),
    })
}

async fn drain_one(file: &Path, config: &config::DrainConfig, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }

    let worker = DrainWorker::from_config(config);
    let stop = worker.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current sample");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let mut sink = make_sink(config, file, json)?;
    let report = worker.drain(file, sink.as_mut()).await?;

    if json && config.output_dir.is_some() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Drained {} samples ({} bytes) from {} tracks",
            report.stats.total_samples(),
            report.stats.total_bytes(),
            report.stats.tracks.len()
        );
        for file in &report.sink.files {
            eprintln!("  wrote {}", file.display());
        }
    }

    Ok(())
}

async fn watch_and_drain(config: config::Config) -> Result<()> {
    if !config.watch.enabled {
        anyhow::bail!("Watching is disabled; set [watch] enabled = true in the config");
    }

    let worker = DrainWorker::from_config(&config.drain);
    let (finished_tx, mut finished_rx) = tokio::sync::mpsc::channel::<PathBuf>(100);
    let mut watcher = watch::FileWatcher::new(config.watch.clone());
    watcher.start(finished_tx)?;

    // Each container is drained on its own task; the worker refuses a second
    // drain of a path that is still in flight.
    let mut drains = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            finished = finished_rx.recv() => {
                let Some(path) = finished else { break };
                if worker.is_draining(&path) {
                    tracing::debug!("Already draining {:?}", path);
                    continue;
                }
                let mut sink = match make_sink(&config.drain, &path, false) {
                    Ok(sink) => sink,
                    Err(e) => {
                        tracing::error!("Cannot create sink for {:?}: {:#}", path, e);
                        continue;
                    }
                };
                let worker = worker.clone();
                drains.spawn(async move {
                    if let Err(e) = worker.drain(&path, sink.as_mut()).await {
                        tracing::error!("{:#}", e);
                    }
                });
            }
            Some(joined) = drains.join_next() => {
                if let Err(e) = joined {
                    tracing::error!("Drain task failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                worker.stop_signal().store(true, std::sync::atomic::Ordering::Relaxed);
                break;
            }
        }
    }

    // Running drains stop before their next sample.
    while drains.join_next().await.is_some() {}

    watcher.stop();
    Ok(())
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let index = MovieIndex::open(file).with_context(|| format!("Failed to parse {:?}", file))?;

    let mut tracks = Vec::new();
    for (i, track) in index.tracks.iter().enumerate() {
        let entry = match track.sample_table() {
            Ok(table) => serde_json::json!({
                "index": i,
                "track_id": track.track_id,
                "handler": track.handler_type.label(),
                "time_scale": table.time_scale(),
                "samples": table.sample_count(),
                "keyframes": if table.has_sync_table() {
                    serde_json::json!(table.keyframe_indices().len())
                } else {
                    serde_json::json!("all")
                },
                "uniform_size": table.sizes().is_uniform(),
                "bytes": table.total_size(),
                "duration_ms": table.total_duration() as f64 * 1000.0
                    / table.time_scale().max(1) as f64,
            }),
            Err(e) => serde_json::json!({
                "index": i,
                "track_id": track.track_id,
                "handler": track.handler_type.label(),
                "error": e.to_string(),
            }),
        };
        tracks.push(entry);
    }

    if json {
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "time_scale": index.header.time_scale,
            "duration_ms": index.duration_ms(),
            "tracks": tracks,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!(
        "Duration: {:.3}s (time scale {})",
        index.duration_secs(),
        index.header.time_scale
    );
    println!("\nTracks: {}", tracks.len());
    for track in &tracks {
        print!(
            "  [{}] id={} {}",
            track["index"], track["track_id"], track["handler"].as_str().unwrap_or("?")
        );
        if let Some(error) = track["error"].as_str() {
            println!(" - malformed: {}", error);
            continue;
        }
        println!(
            " - {} samples, {} bytes, {:.3} ms, keyframes: {}, time scale {}",
            track["samples"],
            track["bytes"],
            track["duration_ms"].as_f64().unwrap_or(0.0),
            track["keyframes"],
            track["time_scale"]
        );
    }
    if let Some(anchor) = tracks.first() {
        println!(
            "\nAnchor track for interleaving: [{}] ({})",
            anchor["index"],
            anchor["handler"].as_str().unwrap_or("?")
        );
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let strategy: InterleaveStrategy = config.drain.strategy;
    println!("  Strategy: {}", strategy);
    println!("  Remove after drain: {}", config.drain.remove_after_drain);
    match &config.drain.output_dir {
        Some(dir) => println!("  Output dir: {}", dir.display()),
        None => println!("  Output dir: (stdout)"),
    }
    println!("  Watch enabled: {}", config.watch.enabled);
    println!("  Watch paths: {}", config.watch.paths.len());
}
