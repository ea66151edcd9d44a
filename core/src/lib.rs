#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Citadel Defence engine.
//!
//! This crate defines the vocabulary that connects the authoritative grid
//! state, the concurrent systems that mutate it, and the adapters that observe
//! it. Systems accept requests expressed in [`CellCoord`] and [`RobotId`]
//! values, reject invalid ones with a [`SimError`], and broadcast [`Event`]
//! values describing every lifecycle transition they commit. Observers only
//! ever see owned snapshots such as [`RobotSnapshot`] and [`WallSnapshot`];
//! no live collection escapes the component that owns it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod config;

pub use config::{
    ClockConfig, EventConfig, GridConfig, MovementPolicy, RobotConfig, SimulationConfig,
    WallConfig,
};

/// Canonical banner emitted when the experience boots.
pub const WELCOME_BANNER: &str = "Welcome to Citadel Defence.";

/// Points awarded for every whole second survived.
pub const POINTS_PER_SECOND: u64 = 10;

/// Points awarded for every robot destroyed by a wall.
pub const POINTS_PER_DESTROYED_ROBOT: u64 = 100;

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column().abs_diff(other.column()) + self.row().abs_diff(other.row())
    }

    /// Returns the neighbouring cell one step toward `target` along `axis`.
    ///
    /// Yields `None` when the cell is already aligned with the target on that
    /// axis. The result never moves away from the target and never moves
    /// diagonally.
    #[must_use]
    pub fn step_toward(self, target: CellCoord, axis: Axis) -> Option<CellCoord> {
        match axis {
            Axis::Horizontal => {
                let column = approach(self.column, target.column)?;
                Some(Self::new(column, self.row))
            }
            Axis::Vertical => {
                let row = approach(self.row, target.row)?;
                Some(Self::new(self.column, row))
            }
        }
    }
}

fn approach(current: u32, target: u32) -> Option<u32> {
    match current.cmp(&target) {
        std::cmp::Ordering::Less => Some(current + 1),
        std::cmp::Ordering::Greater => Some(current - 1),
        std::cmp::Ordering::Equal => None,
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.column, self.row)
    }
}

/// Movement axis selected for a single robot step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Movement along the column index.
    Horizontal,
    /// Movement along the row index.
    Vertical,
}

/// Immutable description of the rectangular grid and its citadel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Grid {
    columns: u32,
    rows: u32,
    citadel: CellCoord,
}

impl Grid {
    /// Creates a grid, validating that it is non-empty and contains the citadel.
    pub fn new(columns: u32, rows: u32, citadel: CellCoord) -> Result<Self, SimError> {
        if columns == 0 || rows == 0 {
            return Err(SimError::InvalidConfig {
                reason: format!("grid must not be empty, got {columns}x{rows}"),
            });
        }
        if citadel.column() >= columns || citadel.row() >= rows {
            return Err(SimError::InvalidConfig {
                reason: format!("citadel {citadel} lies outside the {columns}x{rows} grid"),
            });
        }
        Ok(Self {
            columns,
            rows,
            citadel,
        })
    }

    /// Number of columns contained in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows contained in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Cell every robot converges on.
    #[must_use]
    pub const fn citadel(&self) -> CellCoord {
        self.citadel
    }

    /// Total number of cells in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let count = u64::from(self.columns) * u64::from(self.rows);
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Reports whether the cell lies within `[0, columns) x [0, rows)`.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Fails with [`SimError::OutOfBounds`] when the cell lies outside the grid.
    pub fn check(&self, cell: CellCoord) -> Result<(), SimError> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(SimError::OutOfBounds {
                cell,
                columns: self.columns,
                rows: self.rows,
            })
        }
    }

    /// Row-major index of the cell; this is the canonical lock order.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    /// The four corner cells robots spawn from, in clockwise order from the origin.
    #[must_use]
    pub const fn corners(&self) -> [CellCoord; 4] {
        let right = self.columns - 1;
        let bottom = self.rows - 1;
        [
            CellCoord::new(0, 0),
            CellCoord::new(right, 0),
            CellCoord::new(right, bottom),
            CellCoord::new(0, bottom),
        ]
    }
}

/// Unique identifier assigned to a robot, allocated monotonically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(u32);

impl RobotId {
    /// Creates a new robot identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RobotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "robot#{}", self.0)
    }
}

/// Real-valued robot position.
///
/// The core only ever commits whole-cell positions; the fractional part is
/// reserved for presentation layers that interpolate between cells.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate measured in cells.
    pub x: f64,
    /// Vertical coordinate measured in cells.
    pub y: f64,
}

impl Position {
    /// Position resting exactly on the provided cell.
    #[must_use]
    pub fn at(cell: CellCoord) -> Self {
        Self {
            x: f64::from(cell.column()),
            y: f64::from(cell.row()),
        }
    }

    /// Integer cell used for every occupancy check.
    #[must_use]
    pub fn cell(&self) -> CellCoord {
        CellCoord::new(snap(self.x), snap(self.y))
    }
}

fn snap(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.floor() as u32
    }
}

/// Lifecycle of a wall. Destruction is removal from the wall set, not a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallState {
    /// Accepted into the construction queue but not yet admitted.
    Queued,
    /// Standing at full strength.
    Built,
    /// Struck once by a robot; the next impact destroys it.
    Weakened,
}

/// Result of a robot striking a standing wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WallImpact {
    /// The wall survived and is now weakened.
    Weakened,
    /// The wall collapsed and its cell was freed.
    Destroyed,
}

/// Events broadcast after a component commits a state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Event {
    /// A robot entered the grid at a corner.
    RobotSpawned {
        /// Identifier assigned to the robot.
        robot: RobotId,
        /// Corner the robot occupies.
        cell: CellCoord,
    },
    /// A robot committed a single-cell step.
    RobotAdvanced {
        /// Identifier of the robot that moved.
        robot: RobotId,
        /// Cell occupied before the step.
        from: CellCoord,
        /// Cell occupied after the step.
        to: CellCoord,
    },
    /// A build request entered the construction queue.
    WallQueued {
        /// Cell the wall will occupy.
        cell: CellCoord,
    },
    /// A queued wall was admitted and now stands.
    WallBuilt {
        /// Cell the wall occupies.
        cell: CellCoord,
    },
    /// A standing wall absorbed its first impact.
    WallWeakened {
        /// Cell the wall occupies.
        cell: CellCoord,
        /// Robot responsible for the impact.
        robot: RobotId,
    },
    /// A weakened wall collapsed, freeing its cell.
    WallDestroyed {
        /// Cell the wall occupied.
        cell: CellCoord,
        /// Robot responsible for the impact.
        robot: RobotId,
    },
    /// A robot was destroyed by collapsing a wall.
    RobotDestroyed {
        /// Identifier of the destroyed robot.
        robot: RobotId,
        /// Cell where the robot was destroyed.
        cell: CellCoord,
    },
    /// A robot reached the citadel; the simulation is lost.
    GameOver {
        /// Robot that reached the citadel.
        robot: RobotId,
        /// The citadel cell.
        cell: CellCoord,
    },
}

/// Failures surfaced by the simulation's request surface.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The coordinate lies outside the grid; nothing was mutated.
    #[error("cell {cell} lies outside the {columns}x{rows} grid")]
    OutOfBounds {
        /// Offending coordinate.
        cell: CellCoord,
        /// Grid width.
        columns: u32,
        /// Grid height.
        rows: u32,
    },
    /// The wall cap has been reached; the caller may retry later.
    #[error("wall capacity of {cap} reached")]
    CapacityExceeded {
        /// Configured cap on built plus pending walls.
        cap: usize,
    },
    /// The cell already holds a robot, a wall, a pending request or the citadel.
    #[error("cell {cell} is occupied")]
    CellOccupied {
        /// Offending coordinate.
        cell: CellCoord,
    },
    /// A movement step for the robot is already scheduled or executing.
    #[error("{robot} already has a step in flight")]
    AlreadyInFlight {
        /// Robot whose step was ignored.
        robot: RobotId,
    },
    /// No live robot carries the identifier.
    #[error("{robot} is not in play")]
    UnknownRobot {
        /// Identifier that was not found.
        robot: RobotId,
    },
    /// Game-over has been latched; no new work is accepted.
    #[error("the game is over")]
    GameOver,
    /// The movement worker queue is full.
    #[error("movement worker queue is saturated")]
    PoolSaturated,
    /// The configuration is inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human readable explanation.
        reason: String,
    },
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {reason}")]
    WorkerSpawn {
        /// Error reported by the operating system.
        reason: String,
    },
}

/// Immutable representation of a single robot used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RobotSnapshot {
    /// Unique identifier assigned to the robot.
    pub id: RobotId,
    /// Current real-valued position.
    pub position: Position,
    /// Integer cell derived from the position.
    pub cell: CellCoord,
    /// Indicates whether a step for the robot is currently executing.
    pub moving: bool,
}

/// Immutable representation of a single wall used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WallSnapshot {
    /// Cell occupied by the wall.
    pub cell: CellCoord,
    /// Lifecycle state of the wall.
    pub state: WallState,
}

/// Read-only snapshot of every observable quantity of the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct StateView {
    /// Live robots ordered by identifier.
    pub robots: Vec<RobotSnapshot>,
    /// Standing walls followed by queued walls in FIFO order.
    pub walls: Vec<WallSnapshot>,
    /// Number of robots destroyed by walls.
    pub destroyed_robots: u64,
    /// Number of build requests still waiting for admission.
    pub pending_walls: usize,
    /// Whether a robot has reached the citadel.
    pub game_over: bool,
    /// Simulated time elapsed since the start.
    pub elapsed: Duration,
    /// Score derived from `elapsed` and `destroyed_robots`.
    pub score: u64,
}

/// Accumulates simulated time and reports how many whole intervals elapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    interval: Duration,
    accumulator: Duration,
}

impl Cadence {
    /// Creates a cadence firing once per `interval`. A zero interval never fires.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulator: Duration::ZERO,
        }
    }

    /// Adds `dt` and returns the number of intervals that completed.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        if self.interval.is_zero() {
            return 0;
        }

        self.accumulator = self.accumulator.saturating_add(dt);
        let mut fired = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            fired += 1;
        }
        fired
    }
}

/// Computes the player's score: ten points per whole second plus one hundred per kill.
#[must_use]
pub fn score(elapsed: Duration, destroyed_robots: u64) -> u64 {
    elapsed
        .as_secs()
        .saturating_mul(POINTS_PER_SECOND)
        .saturating_add(destroyed_robots.saturating_mul(POINTS_PER_DESTROYED_ROBOT))
}
