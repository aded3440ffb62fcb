//! Herd Simulation Binary
//!
//! Plays a recorded herd dataset through the simulation engine and logs frames.
//! On exit prints the per-entity state timelines of the last window as JSON.
//!
//! Usage:
//!   herdsim --records day.json --mode replay --speed 60 --ticks 200
//!   herdsim --records day.json --config sim.toml --state-field posture
//!
//! Records file: JSON array of `{ "entity_id", "timestamp", "fields" }`, timestamps
//! as epoch nanoseconds or RFC3339 strings.
//!
//! Environment:
//!   HERDSIM_RECORDS - Records file path
//!   HERDSIM_CONFIG - TOML config path
//!   RUST_LOG - Log filter (default: herdsim=info,herdsim_engine=info)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use herdsim_engine::sim::clock::nanos_to_datetime;
use herdsim_engine::sim::{
    group_by_entity, samples_from_records, segment, CategoryField, DominantFraction,
    HorizonHours, Record, SimConfig, SimMode, SimulationEngine, SimulationRunner, Window,
};

#[derive(Parser, Debug)]
#[command(name = "herdsim")]
#[command(about = "Replay recorded herd sensor data as a live feed")]
struct Args {
    /// JSON records file
    #[arg(long, env = "HERDSIM_RECORDS")]
    records: PathBuf,

    /// TOML configuration file
    #[arg(short, long, env = "HERDSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Clock policy (live, replay)
    #[arg(long)]
    mode: Option<SimMode>,

    /// Dataset minutes per real second in replay mode
    #[arg(long)]
    speed: Option<f64>,

    /// Synthetic horizon (24 or 48)
    #[arg(long)]
    horizon_hours: Option<u32>,

    /// Tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Seed for live-mode jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many frames (default: run until Ctrl-C)
    #[arg(long)]
    ticks: Option<u64>,

    /// Log every Nth frame
    #[arg(long, default_value = "10")]
    log_every: u64,

    /// Categorical field used for timelines
    #[arg(long, conflicts_with = "dominant")]
    state_field: Option<String>,

    /// Membership fields whose largest value names the state (comma-separated)
    #[arg(long, default_value = "lying,standing,feeding,ruminating,walking")]
    dominant: String,
}

fn build_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            SimConfig::from_file(path)?
        }
        None => {
            info!("Using default configuration");
            SimConfig::default()
        }
    };

    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(speed) = args.speed {
        config.replay_speed = speed;
    }
    if let Some(hours) = args.horizon_hours {
        config.horizon_hours = HorizonHours::try_from(hours)?;
    }
    if let Some(ms) = args.tick_ms {
        config.tick_period = std::time::Duration::from_millis(ms);
    }
    if args.seed.is_some() {
        config.noise_seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

fn read_records(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let records: Vec<Record> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing records from {}", path.display()))?;
    Ok(records)
}

fn print_timelines(args: &Args, window: &Window) -> Result<()> {
    let intervals = match &args.state_field {
        Some(field) => segment(samples_from_records(
            window.records(),
            &CategoryField(field.clone()),
        )),
        None => {
            let fields = args
                .dominant
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            segment(samples_from_records(window.records(), &DominantFraction(fields)))
        }
    };
    let timelines = group_by_entity(intervals);
    println!("{}", serde_json::to_string_pretty(&timelines)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herdsim=info,herdsim_engine=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    info!("Starting herd simulation");
    info!("  Mode: {}", config.mode);
    info!("  Replay speed: {} min/s", config.replay_speed);
    info!("  Horizon: {}h", config.horizon_hours.hours());
    info!("  Tick: {}ms", config.tick_period.as_millis());

    let records = read_records(&args.records)?;
    info!("Read {} records from {}", records.len(), args.records.display());

    let engine = SimulationEngine::new(config)?;
    let (handle, task) = SimulationRunner::spawn(engine);

    if let Err(e) = handle.load(records).await {
        // Runner stays idle with no dataset; a bounded run has nothing to count.
        warn!("Waiting for data: {}", e);
        if args.ticks.is_none() {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            info!("Shutdown signal received");
        }
        handle.stop().await.ok();
        task.await.ok();
        return Ok(());
    }

    let mut frames = handle.subscribe();
    let mut last_window = Window::empty();
    let mut seen: u64 = 0;

    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(frame) = frames.borrow_and_update().clone() else {
                    continue;
                };
                if frame.tick == 0 {
                    continue;
                }
                seen += 1;
                if seen % args.log_every.max(1) == 0 {
                    let at = nanos_to_datetime(frame.virtual_now)
                        .map(|dt| dt.to_string())
                        .unwrap_or_else(|| frame.virtual_now.to_string());
                    info!(
                        tick = frame.tick,
                        progress = frame.progress_percent,
                        visible = frame.window.len(),
                        "{}",
                        at
                    );
                }
                last_window = (*frame.window).clone();
                if args.ticks.map_or(false, |n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    handle.stop().await.ok();
    task.await.ok();
    info!(stats = ?handle.stats(), "Simulation stopped");

    print_timelines(&args, &last_window)
}
