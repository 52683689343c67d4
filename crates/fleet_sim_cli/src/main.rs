use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fleet_sim_core::clock::SpeedMultiplier;
use fleet_sim_core::engine::{FastForwardOutcome, SimulationEngine};
use fleet_sim_core::scenario::EngineConfig;
use fleet_sim_core::scheduler::{IntervalScheduler, VirtualScheduler};
use fleet_sim_core::spatial::{EmergencyArea, Point};
use indicatif::{ProgressBar, ProgressStyle};

mod report;

use report::{print_snapshot, print_summary, OutputMode};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "fleet-sim",
    about = "Headless driver for the autonomous fleet and curb-slot simulation",
    long_about = "Runs the simulation engine without a dashboard: real-time ticking,\n\
                  fast-forward batches and emergency closures, printing snapshots\n\
                  as text or JSON lines."
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON engine configuration; missing fields fall back to defaults
    #[arg(long, global = true, env = "FLEET_SIM_CONFIG")]
    config: Option<PathBuf>,
    /// RNG seed for a reproducible run
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick in real time and print every snapshot
    Run {
        /// Number of ticks before stopping
        #[arg(long, default_value_t = 100)]
        ticks: u64,
        /// Speed multiplier (1, 2, 5, 10 or 30)
        #[arg(long, default_value = "1", value_parser = parse_speed)]
        speed: SpeedMultiplier,
        /// Real-time tick interval; defaults to the configured interval
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Tick as fast as possible instead of waiting on the wall clock
        #[arg(long)]
        no_wait: bool,
    },
    /// Advance simulated time by whole or fractional hours
    FastForward {
        #[arg(long)]
        hours: f64,
    },
    /// Close an area, fast-forward through it, then lift the closure
    Emergency {
        #[arg(long, default_value_t = 1000.0)]
        x: f64,
        #[arg(long, default_value_t = 600.0)]
        y: f64,
        #[arg(long, default_value_t = 0.5)]
        radius_km: f64,
        /// Simulated hours the closure stays active
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
    },
}

fn parse_speed(raw: &str) -> Result<SpeedMultiplier, String> {
    let factor: u32 = raw.parse().map_err(|e| format!("{e}"))?;
    SpeedMultiplier::try_from(factor).map_err(|e| e.to_string())
}

// ── helpers ────────────────────────────────────────────────────────

fn load_config(common: &CommonArgs) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match &common.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .map_err(|e| format!("invalid config {}: {e}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(seed) = common.seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

fn progress_bar(hours: f64) -> Result<ProgressBar, Box<dyn Error>> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message(format!("fast-forwarding {hours} h"));
    Ok(bar)
}

async fn fast_forward_with_bar(
    engine: &mut SimulationEngine,
    hours: f64,
    show_bar: bool,
) -> Result<FastForwardOutcome, Box<dyn Error>> {
    let bar = if show_bar { Some(progress_bar(hours)?) } else { None };
    let outcome = engine
        .fast_forward(hours, |time, percent| {
            if let Some(bar) = &bar {
                bar.set_position(percent.floor() as u64);
                bar.set_message(time.format("%Y-%m-%d %H:%M").to_string());
            }
        })
        .await?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    Ok(outcome)
}

// ── commands ───────────────────────────────────────────────────────

async fn run_realtime(
    mut engine: SimulationEngine,
    mode: OutputMode,
    ticks: u64,
    speed: SpeedMultiplier,
    interval_ms: Option<u64>,
    no_wait: bool,
) -> Result<(), Box<dyn Error>> {
    let interval = Duration::from_millis(interval_ms.unwrap_or(engine.config().tick_interval_ms));
    engine.initialize()?;
    engine.set_speed(speed);
    let handle = engine.stop_handle();
    engine.start(move |snapshot| {
        print_snapshot(mode, snapshot);
        if snapshot.tick >= ticks {
            handle.stop();
        }
    });

    let executed = if no_wait {
        let mut scheduler = VirtualScheduler::new(interval).with_limit(ticks);
        engine.run(&mut scheduler).await?
    } else {
        let mut scheduler = IntervalScheduler::new(interval);
        engine.run(&mut scheduler).await?
    };
    engine.stop();
    log::info!("Run finished after {executed} ticks");
    print_summary(mode, &engine.snapshot());
    Ok(())
}

async fn run_fast_forward(
    mut engine: SimulationEngine,
    mode: OutputMode,
    hours: f64,
) -> Result<(), Box<dyn Error>> {
    let outcome = fast_forward_with_bar(&mut engine, hours, mode == OutputMode::Text).await?;
    match &outcome {
        FastForwardOutcome::Completed { ticks } => log::info!("Completed {ticks} ticks"),
        FastForwardOutcome::Cancelled { ticks } => log::warn!("Cancelled after {ticks} ticks"),
        FastForwardOutcome::Halted { ticks, error } => {
            log::error!("Halted after {ticks} ticks: {error}");
        }
    }
    print_summary(mode, &engine.snapshot());
    match outcome {
        FastForwardOutcome::Halted { error, .. } => Err(error.into()),
        _ => Ok(()),
    }
}

async fn run_emergency(
    mut engine: SimulationEngine,
    mode: OutputMode,
    area: EmergencyArea,
    hours: f64,
) -> Result<(), Box<dyn Error>> {
    let report = engine.activate_emergency(area);
    report::print_emergency(mode, &report);

    fast_forward_with_bar(&mut engine, hours, mode == OutputMode::Text).await?;
    let efficiency = engine.slots().analyze_slot_efficiency();

    let restored = engine.deactivate_emergency();
    report::print_restored(mode, &restored, &efficiency);
    print_summary(mode, &engine.snapshot());
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mode = if cli.common.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = load_config(&cli.common)?;
    let engine = SimulationEngine::new(config)?;

    match cli.command {
        Commands::Run {
            ticks,
            speed,
            interval_ms,
            no_wait,
        } => run_realtime(engine, mode, ticks, speed, interval_ms, no_wait).await,
        Commands::FastForward { hours } => run_fast_forward(engine, mode, hours).await,
        Commands::Emergency {
            x,
            y,
            radius_km,
            hours,
        } => {
            let area = EmergencyArea::new(Point::new(x, y), radius_km);
            run_emergency(engine, mode, area, hours).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
