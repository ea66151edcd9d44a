//! Tunable parameters for a simulation run.
//!
//! Every field carries a default so partial TOML documents deserialize
//! cleanly. Durations are expressed in whole milliseconds on the wire and
//! exposed as [`Duration`] through accessor methods.

use std::{ops::RangeInclusive, time::Duration};

use serde::Deserialize;

use crate::{CellCoord, Grid, SimError};

/// Complete configuration for a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Grid dimensions and citadel placement.
    pub grid: GridConfig,
    /// Wall construction parameters.
    pub walls: WallConfig,
    /// Robot spawning and movement parameters.
    pub robots: RobotConfig,
    /// Periodic driver cadences.
    pub clock: ClockConfig,
    /// Event bus sizing.
    pub events: EventConfig,
    /// Seed for spawn-corner, step-delay and axis selection. Random when absent.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Checks cross-field consistency and builds the grid description.
    pub fn validate(&self) -> Result<Grid, SimError> {
        let grid = Grid::new(self.grid.columns, self.grid.rows, self.grid.citadel)?;
        if self.walls.cap == 0 {
            return Err(invalid("wall cap must be at least one"));
        }
        if self.walls.builds_per_tick == 0 {
            return Err(invalid("builds_per_tick must be at least one"));
        }
        if self.walls.build_interval_ms == 0 {
            return Err(invalid("build_interval_ms must be positive"));
        }
        if self.robots.spawn_interval_ms == 0 {
            return Err(invalid("spawn_interval_ms must be positive"));
        }
        if self.robots.min_step_delay_ms == 0 {
            return Err(invalid("min_step_delay_ms must be positive"));
        }
        if self.robots.workers == 0 {
            return Err(invalid("movement pool needs at least one worker"));
        }
        if self.robots.queue_capacity == 0 {
            return Err(invalid("movement queue capacity must be at least one"));
        }
        if self.robots.min_step_delay_ms > self.robots.max_step_delay_ms {
            return Err(invalid("min_step_delay_ms exceeds max_step_delay_ms"));
        }
        if self.clock.frame_interval_ms == 0 {
            return Err(invalid("frame_interval_ms must be positive"));
        }
        if self.clock.collision_interval_ms == 0 {
            return Err(invalid("collision_interval_ms must be positive"));
        }
        if self.events.capacity == 0 {
            return Err(invalid("event bus capacity must be at least one"));
        }
        Ok(grid)
    }
}

fn invalid(reason: &str) -> SimError {
    SimError::InvalidConfig {
        reason: reason.to_owned(),
    }
}

/// Grid dimensions and citadel placement.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Number of columns.
    pub columns: u32,
    /// Number of rows.
    pub rows: u32,
    /// Target cell all robots converge on.
    pub citadel: CellCoord,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 9,
            rows: 9,
            citadel: CellCoord::new(4, 4),
        }
    }
}

/// Wall construction parameters.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WallConfig {
    /// Maximum number of standing plus pending walls.
    pub cap: usize,
    /// Interval between construction passes.
    pub build_interval_ms: u64,
    /// Maximum number of walls admitted by a single construction pass.
    pub builds_per_tick: usize,
}

impl WallConfig {
    /// Interval between construction passes.
    #[must_use]
    pub fn build_interval(&self) -> Duration {
        Duration::from_millis(self.build_interval_ms)
    }
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            cap: 10,
            build_interval_ms: 2_000,
            builds_per_tick: 10,
        }
    }
}

/// Whether robot steps may commit in parallel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPolicy {
    /// Only the source and destination cells of a step are exclusive.
    #[default]
    CellExclusive,
    /// A single global permit additionally serializes every step commit.
    GloballySerialized,
}

/// Robot spawning and movement parameters.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotConfig {
    /// Interval between spawn attempts.
    pub spawn_interval_ms: u64,
    /// Shortest delay a robot waits between steps.
    pub min_step_delay_ms: u64,
    /// Longest delay a robot waits between steps.
    pub max_step_delay_ms: u64,
    /// Number of movement worker threads.
    pub workers: usize,
    /// Capacity of the movement job queue.
    pub queue_capacity: usize,
    /// Time outstanding steps get to finish after game-over.
    pub shutdown_grace_ms: u64,
    /// Step commit parallelism policy.
    pub policy: MovementPolicy,
}

impl RobotConfig {
    /// Interval between spawn attempts.
    #[must_use]
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }

    /// Inclusive range robot step delays are drawn from, in milliseconds.
    #[must_use]
    pub fn step_delay_range_ms(&self) -> RangeInclusive<u64> {
        self.min_step_delay_ms..=self.max_step_delay_ms
    }

    /// Time outstanding steps get to finish after game-over.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            spawn_interval_ms: 1_500,
            min_step_delay_ms: 500,
            max_step_delay_ms: 2_000,
            workers: 8,
            queue_capacity: 64,
            shutdown_grace_ms: 500,
            policy: MovementPolicy::CellExclusive,
        }
    }
}

/// Periodic driver cadences.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Real-time interval between frames when the clock runs on its own thread.
    pub frame_interval_ms: u64,
    /// Interval between collision passes.
    pub collision_interval_ms: u64,
}

impl ClockConfig {
    /// Real-time interval between frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Interval between collision passes.
    #[must_use]
    pub fn collision_interval(&self) -> Duration {
        Duration::from_millis(self.collision_interval_ms)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            collision_interval_ms: 50,
        }
    }
}

/// Event bus sizing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventConfig {
    /// Number of undelivered events retained before new ones are dropped.
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 1_024 }
    }
}
