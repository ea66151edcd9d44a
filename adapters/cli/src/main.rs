#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs the Citadel Defence simulation headless.

mod wall_layout;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use citadel_defence_core::{Event, SimulationConfig, WELCOME_BANNER};
use citadel_defence_simulation::{Simulation, SimulationClock};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

use crate::wall_layout::parse_wall_layout;

/// Longest the event loop waits before re-checking the clock and deadline.
const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "citadel-defence", about = "Robots converge on the citadel; walls hold them off.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the simulation in real time and prints its events.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML file overriding the default configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for spawn corners, step delays and step axes.
    #[arg(long)]
    seed: Option<u64>,
    /// Wall-clock run length in milliseconds; the run ends earlier on game over.
    #[arg(long, default_value_t = 30_000)]
    duration_ms: u64,
    /// Walls requested before the clock starts, e.g. `1,0;2,3`.
    #[arg(long)]
    walls: Option<String>,
    /// Log filter directive, overriding `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,
}

/// Entry point for the Citadel Defence command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    init_tracing(args.log_level.as_deref())?;

    let mut config = load_config(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let walls = match args.walls.as_deref() {
        Some(layout) => parse_wall_layout(layout).context("invalid --walls layout")?,
        None => Vec::new(),
    };

    let simulation = Arc::new(Simulation::new(config).context("failed to build the simulation")?);
    println!("{WELCOME_BANNER}");
    for (x, y) in walls {
        if !simulation.request_wall_build(x, y) {
            tracing::warn!(x, y, "initial wall request rejected");
        }
    }

    let events = simulation.events();
    let mut clock =
        SimulationClock::start(Arc::clone(&simulation)).context("failed to start the clock")?;
    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !clock.is_running() {
            break;
        }
        match events.recv_timeout(remaining.min(EVENT_POLL)) {
            Ok(event) => println!("{}", describe(&event)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    clock.stop();
    let report = simulation.shutdown();
    for event in events.try_iter() {
        println!("{}", describe(&event));
    }

    let state = simulation.state();
    println!("--- summary ---");
    println!("elapsed: {:.1}s", state.elapsed.as_secs_f64());
    println!("score: {}", state.score);
    println!("robots destroyed: {}", state.destroyed_robots);
    println!("robots in play: {}", state.robots.len());
    println!(
        "walls standing: {}, queued: {}",
        state.walls.len().saturating_sub(state.pending_walls),
        state.pending_walls
    );
    println!("game over: {}", state.game_over);
    if simulation.dropped_events() > 0 {
        println!("events dropped: {}", simulation.dropped_events());
    }
    tracing::debug!(?report, "movement workers stopped");
    Ok(())
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid --log-level '{directive}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn describe(event: &Event) -> String {
    match event {
        Event::RobotSpawned { robot, cell } => format!("{robot} spawned at {cell}"),
        Event::RobotAdvanced { robot, from, to } => format!("{robot} moved {from} -> {to}"),
        Event::WallQueued { cell } => format!("wall queued at {cell}"),
        Event::WallBuilt { cell } => format!("wall built at {cell}"),
        Event::WallWeakened { cell, robot } => format!("wall at {cell} weakened by {robot}"),
        Event::WallDestroyed { cell, robot } => format!("wall at {cell} destroyed by {robot}"),
        Event::RobotDestroyed { robot, cell } => format!("{robot} destroyed at {cell}"),
        Event::GameOver { robot, cell } => format!("GAME OVER: {robot} reached the citadel at {cell}"),
    }
}
