#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Public facade over the Citadel Defence engine.
//!
//! [`Simulation`] wires the grid, the wall construction pipeline, the
//! movement scheduler and the collision resolver together and exposes the
//! narrow request surface observers interact with: wall build requests,
//! robot step requests, state queries and the event stream. Time only moves
//! when [`Simulation::advance`] is called, either by a test or by the
//! real-time [`SimulationClock`].

mod clock;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use citadel_defence_core::{
    score, Axis, Cadence, CellCoord, Event, RobotId, RobotSnapshot, SimError, SimulationConfig,
    StateView,
};
use citadel_defence_system_builder::WallConstructionPipeline;
use citadel_defence_system_collision::CollisionResolver;
use citadel_defence_system_movement::{MovementScheduler, ShutdownReport, StepOutcome};
use citadel_defence_world::{lock_recovering, EventBus, GameOverLatch, GridState};
use crossbeam_channel::Receiver;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use clock::SimulationClock;

/// Work performed by a single call to [`Simulation::advance`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Robots spawned during the frame.
    pub spawned: usize,
    /// Robot steps queued on the worker pool.
    pub steps_dispatched: usize,
    /// Walls admitted by construction passes.
    pub walls_built: usize,
    /// Robots destroyed by collision passes.
    pub robots_destroyed: usize,
    /// Game-over was settled and the simulation no longer advances.
    pub finished: bool,
}

#[derive(Debug)]
struct Timers {
    elapsed: Duration,
    builds: Cadence,
    collisions: Cadence,
    finished: bool,
    // Score observed by the frame that first saw game-over.
    frozen_score: Option<u64>,
}

/// The concurrent robot and wall simulation.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    events: Arc<EventBus>,
    game_over: Arc<GameOverLatch>,
    walls: Arc<WallConstructionPipeline>,
    movement: MovementScheduler,
    collisions: CollisionResolver,
    // Taken before any engine lock.
    timers: Mutex<Timers>,
}

impl Simulation {
    /// Validates `config` and starts the movement worker pool.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        let grid = config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let grid_state = Arc::new(GridState::new(grid));
        let events = Arc::new(EventBus::new(config.events.capacity));
        let game_over = Arc::new(GameOverLatch::new());
        let walls = Arc::new(WallConstructionPipeline::new(
            Arc::clone(&grid_state),
            Arc::clone(&events),
            &config.walls,
        ));
        let movement = MovementScheduler::new(
            grid_state,
            Arc::clone(&events),
            Arc::clone(&game_over),
            &config.robots,
            rng,
        )?;
        let collisions = CollisionResolver::new(
            Arc::clone(movement.roster()),
            Arc::clone(&walls),
            Arc::clone(&events),
        );

        tracing::info!(
            columns = grid.columns(),
            rows = grid.rows(),
            citadel = %grid.citadel(),
            wall_cap = config.walls.cap,
            workers = config.robots.workers,
            seed = ?config.seed,
            "simulation created"
        );

        let timers = Timers {
            elapsed: Duration::ZERO,
            builds: Cadence::new(config.walls.build_interval()),
            collisions: Cadence::new(config.clock.collision_interval()),
            finished: false,
            frozen_score: None,
        };
        Ok(Self {
            config,
            events,
            game_over,
            walls,
            movement,
            collisions,
            timers: Mutex::new(timers),
        })
    }

    /// Configuration the simulation was built from.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Requests a wall at `(x, y)`. Returns whether the request was queued.
    pub fn request_wall_build(&self, x: i64, y: i64) -> bool {
        let (Ok(column), Ok(row)) = (u32::try_from(x), u32::try_from(y)) else {
            tracing::debug!(x, y, "wall request rejected, negative coordinate");
            return false;
        };
        match self.try_request_wall_build(CellCoord::new(column, row)) {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(x, y, %error, "wall request rejected");
                false
            }
        }
    }

    /// Requests a wall at `cell`, explaining any rejection.
    pub fn try_request_wall_build(&self, cell: CellCoord) -> Result<(), SimError> {
        if self.game_over.is_set() {
            return Err(SimError::GameOver);
        }
        self.walls.request_build(cell, &**self.movement.roster())
    }

    /// Spawns a robot at a random free corner.
    pub fn spawn_robot(&self) -> Result<Option<RobotSnapshot>, SimError> {
        self.movement.spawn_robot()
    }

    /// Spawns a robot at `cell`.
    pub fn spawn_robot_at(&self, cell: CellCoord) -> Result<RobotSnapshot, SimError> {
        self.movement.spawn_robot_at(cell)
    }

    /// Requests one step of `robot` toward the citadel.
    ///
    /// A request for a robot whose previous step is still in flight is
    /// ignored.
    pub fn request_robot_step(&self, robot: RobotId) -> Result<(), SimError> {
        match self.movement.step_robot(robot) {
            Err(SimError::AlreadyInFlight { .. }) => Ok(()),
            other => other,
        }
    }

    /// Executes one step of `robot` along `axis` on the calling thread.
    pub fn advance_robot(&self, robot: RobotId, axis: Axis) -> Result<StepOutcome, SimError> {
        self.movement.advance_robot(robot, axis)
    }

    /// Drives one frame: a collision pass followed by a construction pass.
    ///
    /// Movement steps already scheduled keep running on the worker pool. Once
    /// game-over is latched the frame settles the simulation the same way
    /// [`Self::advance`] does.
    pub fn notify_tick(&self) -> FrameReport {
        let timers = lock_recovering(&self.timers);
        if timers.finished {
            return FrameReport {
                finished: true,
                ..FrameReport::default()
            };
        }
        if self.game_over.is_set() {
            return self.settle(timers);
        }

        let destroyed = self.collisions.resolve().destroyed.len();
        let built = self.walls.tick(&**self.movement.roster()).len();
        FrameReport {
            walls_built: built,
            robots_destroyed: destroyed,
            ..FrameReport::default()
        }
    }

    /// Advances simulated time by `dt`, running every periodic action that
    /// came due.
    ///
    /// Once game-over is latched the next call stops the worker pool, runs one
    /// final collision and construction pass and reports the frame as
    /// finished. Later calls do nothing.
    pub fn advance(&self, dt: Duration) -> FrameReport {
        let mut timers = lock_recovering(&self.timers);
        if timers.finished {
            return FrameReport {
                finished: true,
                ..FrameReport::default()
            };
        }
        if self.game_over.is_set() {
            return self.settle(timers);
        }

        let mut report = FrameReport::default();
        timers.elapsed = timers.elapsed.saturating_add(dt);
        report.spawned = self.movement.spawn_due(dt).len();
        report.steps_dispatched = self.movement.dispatch_due(dt);
        if timers.collisions.advance(dt) > 0 {
            report.robots_destroyed = self.collisions.resolve().destroyed.len();
        }
        for _ in 0..timers.builds.advance(dt) {
            report.walls_built += self.walls.tick(&**self.movement.roster()).len();
        }
        report
    }

    /// Freezes time and score, lets in-flight steps land, then runs the last
    /// collision and construction pass.
    fn settle(&self, mut timers: MutexGuard<'_, Timers>) -> FrameReport {
        let frozen = score(timers.elapsed, self.collisions.destroyed_count());
        timers.finished = true;
        timers.frozen_score = Some(frozen);
        let elapsed = timers.elapsed;
        drop(timers);

        let shutdown = self.movement.shutdown();
        let report = FrameReport {
            robots_destroyed: self.collisions.resolve().destroyed.len(),
            walls_built: self.walls.tick(&**self.movement.roster()).len(),
            finished: true,
            ..FrameReport::default()
        };
        tracing::info!(
            ?elapsed,
            score = frozen,
            graceful = shutdown.graceful,
            stragglers = shutdown.stragglers,
            "simulation settled after game over"
        );
        report
    }

    /// Snapshot of everything an observer may read.
    #[must_use]
    pub fn state(&self) -> StateView {
        let (elapsed, frozen_score) = {
            let timers = lock_recovering(&self.timers);
            (timers.elapsed, timers.frozen_score)
        };
        let destroyed_robots = self.collisions.destroyed_count();
        StateView {
            robots: self.movement.robots(),
            walls: self.walls.walls(),
            destroyed_robots,
            pending_walls: self.walls.pending_count(),
            game_over: self.game_over.is_set(),
            elapsed,
            score: frozen_score.unwrap_or_else(|| score(elapsed, destroyed_robots)),
        }
    }

    /// Receiver sharing the event queue with every other subscriber.
    #[must_use]
    pub fn events(&self) -> Receiver<Event> {
        self.events.subscribe()
    }

    /// Removes every buffered event.
    #[must_use]
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }

    /// Number of events discarded because the buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Whether a robot has reached the citadel.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.game_over.is_set()
    }

    /// Robot that reached the citadel first.
    #[must_use]
    pub fn winner(&self) -> Option<RobotId> {
        self.game_over.winner()
    }

    /// Simulated time elapsed, frozen once game-over is observed.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        lock_recovering(&self.timers).elapsed
    }

    /// Robots destroyed so far.
    #[must_use]
    pub fn destroyed_robots(&self) -> u64 {
        self.collisions.destroyed_count()
    }

    /// Current score, frozen once game-over has been observed.
    #[must_use]
    pub fn score(&self) -> u64 {
        let timers = lock_recovering(&self.timers);
        timers
            .frozen_score
            .unwrap_or_else(|| score(timers.elapsed, self.destroyed_robots()))
    }

    /// Whether game-over has been settled by [`Self::advance`].
    #[must_use]
    pub fn is_finished(&self) -> bool {
        lock_recovering(&self.timers).finished
    }

    /// Stops the movement worker pool.
    pub fn shutdown(&self) -> ShutdownReport {
        self.movement.shutdown()
    }
}
