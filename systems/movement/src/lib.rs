#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Robot movement: spawning robots at free corners and executing their
//! single-cell steps toward the citadel on a bounded worker pool.
//!
//! A step follows a fixed protocol. The robot's single in-flight slot is
//! claimed, an axis is chosen at random, and the step is queued for a worker.
//! The worker computes the neighbouring cell toward the citadel, acquires the
//! origin and destination cell locks without blocking, rejects destinations
//! held by another robot that is mid-move, and commits. Whatever happens, the
//! in-flight slot is released when the step's ticket is dropped, including
//! steps discarded by a cancelling shutdown.
//!
//! Under [`MovementPolicy::GloballySerialized`] a single commit permit is
//! taken before the cell locks. The scheduler's RNG and spawn cadence are
//! leaf locks: nothing else is acquired while they are held.

mod pool;
mod roster;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use citadel_defence_core::{
    Axis, CellCoord, Event, MovementPolicy, RobotConfig, RobotId, RobotSnapshot, SimError,
};
use citadel_defence_system_spawning::{select_corner, Config as SpawnConfig, Spawning};
use citadel_defence_world::{lock_recovering, EventBus, GameOverLatch, GridState};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use pool::WorkerPool;
pub use pool::ShutdownReport;
use roster::CommitRefusal;
pub use roster::RobotRoster;

/// Result of executing a single robot step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The robot committed a move between two adjacent cells.
    Moved {
        /// Cell occupied before the step.
        from: CellCoord,
        /// Cell occupied after the step.
        to: CellCoord,
    },
    /// The robot is already aligned with the citadel on the chosen axis.
    Aligned,
    /// The step was rejected and the robot stayed put.
    Blocked(BlockReason),
    /// The robot already stands on the citadel.
    AtCitadel,
}

/// Reason a step was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// The origin or destination cell lock was held elsewhere.
    CellLocked,
    /// Another robot on the destination is mid-move.
    RobotMidMove,
}

/// Collaborators shared by the scheduler and the steps running on workers.
#[derive(Debug)]
struct Shared {
    grid: Arc<GridState>,
    roster: Arc<RobotRoster>,
    events: Arc<EventBus>,
    game_over: Arc<GameOverLatch>,
    policy: MovementPolicy,
    commit_permit: Mutex<()>,
}

/// Owns the robot roster and schedules every robot's steps.
#[derive(Debug)]
pub struct MovementScheduler {
    shared: Arc<Shared>,
    spawning: Mutex<Spawning>,
    rng: Mutex<ChaCha8Rng>,
    pool: WorkerPool,
    shutdown_grace: Duration,
}

impl MovementScheduler {
    /// Creates the scheduler and starts its worker pool.
    pub fn new(
        grid: Arc<GridState>,
        events: Arc<EventBus>,
        game_over: Arc<GameOverLatch>,
        config: &RobotConfig,
        rng: ChaCha8Rng,
    ) -> Result<Self, SimError> {
        let pool = WorkerPool::start(config.workers, config.queue_capacity)?;
        let spawning = Spawning::new(SpawnConfig::new(
            config.spawn_interval(),
            config.step_delay_range_ms(),
        ));
        Ok(Self {
            shared: Arc::new(Shared {
                grid,
                roster: Arc::new(RobotRoster::new()),
                events,
                game_over,
                policy: config.policy,
                commit_permit: Mutex::new(()),
            }),
            spawning: Mutex::new(spawning),
            rng: Mutex::new(rng),
            pool,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    /// Live robots, shared with collision resolution and wall admission.
    #[must_use]
    pub fn roster(&self) -> &Arc<RobotRoster> {
        &self.shared.roster
    }

    /// Snapshots every live robot.
    #[must_use]
    pub fn robots(&self) -> Vec<RobotSnapshot> {
        self.shared.roster.snapshot()
    }

    /// Advances the spawn cadence and spawns one robot per elapsed interval.
    ///
    /// Attempts finding every corner occupied are skipped silently.
    pub fn spawn_due(&self, dt: Duration) -> Vec<RobotSnapshot> {
        if self.shared.game_over.is_set() {
            return Vec::new();
        }
        let attempts = lock_recovering(&self.spawning).advance(dt);
        let mut spawned = Vec::new();
        for _ in 0..attempts {
            match self.spawn_robot() {
                Ok(Some(robot)) => spawned.push(robot),
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(%error, "spawn attempt abandoned");
                    break;
                }
            }
        }
        spawned
    }

    /// Places a new robot on a randomly chosen free corner.
    ///
    /// Returns `Ok(None)` when every corner holds a robot.
    pub fn spawn_robot(&self) -> Result<Option<RobotSnapshot>, SimError> {
        let grid = self.shared.grid.grid();
        let mut candidates: Vec<CellCoord> = Vec::with_capacity(4);
        for corner in grid.corners() {
            if !candidates.contains(&corner) {
                candidates.push(corner);
            }
        }

        loop {
            if self.shared.game_over.is_set() {
                return Err(SimError::GameOver);
            }
            let occupied: HashSet<CellCoord> = self
                .shared
                .roster
                .snapshot()
                .into_iter()
                .map(|robot| robot.cell)
                .collect();
            let corner = {
                let mut rng = lock_recovering(&self.rng);
                select_corner(&candidates, |cell| occupied.contains(&cell), &mut *rng)
            };
            let Some(corner) = corner else {
                tracing::debug!("every corner is occupied; spawn skipped");
                return Ok(None);
            };

            match self.place(corner)? {
                Some(robot) => return Ok(Some(robot)),
                None => candidates.retain(|candidate| *candidate != corner),
            }
        }
    }

    /// Places a new robot on `cell`, rejecting cells that already hold one.
    pub fn spawn_robot_at(&self, cell: CellCoord) -> Result<RobotSnapshot, SimError> {
        if self.shared.game_over.is_set() {
            return Err(SimError::GameOver);
        }
        self.place(cell)?.ok_or(SimError::CellOccupied { cell })
    }

    fn place(&self, cell: CellCoord) -> Result<Option<RobotSnapshot>, SimError> {
        let guard = self.shared.grid.lock_cell(cell)?;
        if guard.is_occupied(&[&*self.shared.roster]) {
            return Ok(None);
        }
        let step_delay = {
            let spawning = lock_recovering(&self.spawning);
            let mut rng = lock_recovering(&self.rng);
            spawning.draw_step_delay(&mut *rng)
        };
        let citadel = self.shared.grid.grid().citadel();
        let robot = self.shared.roster.register(cell, citadel, step_delay);
        guard.unlock();

        tracing::info!(robot = %robot.id, %cell, ?step_delay, "robot spawned");
        self.shared.events.publish(Event::RobotSpawned {
            robot: robot.id,
            cell,
        });
        self.shared.reach_citadel(robot.id, cell);
        Ok(Some(robot))
    }

    /// Queues one step for `robot` on the worker pool without blocking.
    ///
    /// At most one step per robot is in flight; further requests are rejected
    /// with [`SimError::AlreadyInFlight`] until it completes.
    pub fn step_robot(&self, robot: RobotId) -> Result<(), SimError> {
        if self.shared.game_over.is_set() || !self.pool.is_accepting() {
            return Err(SimError::GameOver);
        }
        let ticket = StepTicket::claim(&self.shared, robot)?;
        let axis = self.draw_axis();
        self.pool.submit(Box::new(move || {
            match ticket.execute(axis) {
                Ok(outcome) => tracing::trace!(robot = %ticket.robot, ?outcome, "step finished"),
                Err(error) => tracing::debug!(robot = %ticket.robot, %error, "step abandoned"),
            }
        }))
    }

    /// Executes one step for `robot` along `axis` on the calling thread.
    ///
    /// Shares the in-flight slot with [`Self::step_robot`].
    pub fn advance_robot(&self, robot: RobotId, axis: Axis) -> Result<StepOutcome, SimError> {
        if self.shared.game_over.is_set() {
            return Err(SimError::GameOver);
        }
        StepTicket::claim(&self.shared, robot)?.execute(axis)
    }

    /// Advances every robot's step cadence by `dt` and queues the steps now due.
    ///
    /// Returns the number of steps queued.
    pub fn dispatch_due(&self, dt: Duration) -> usize {
        if self.shared.game_over.is_set() {
            return 0;
        }
        let mut queued = 0;
        for robot in self.shared.roster.due(dt) {
            match self.step_robot(robot) {
                Ok(()) => queued += 1,
                Err(SimError::PoolSaturated) => {
                    tracing::debug!(%robot, "movement queue saturated; step deferred");
                }
                Err(SimError::AlreadyInFlight { .. } | SimError::UnknownRobot { .. }) => {}
                Err(error) => {
                    tracing::debug!(%robot, %error, "step dispatch stopped");
                    break;
                }
            }
        }
        queued
    }

    /// Stops the worker pool using the configured grace period.
    pub fn shutdown(&self) -> ShutdownReport {
        self.pool.shutdown(self.shutdown_grace)
    }

    fn draw_axis(&self) -> Axis {
        if lock_recovering(&self.rng).gen_bool(0.5) {
            Axis::Horizontal
        } else {
            Axis::Vertical
        }
    }
}

impl Shared {
    fn reach_citadel(&self, robot: RobotId, cell: CellCoord) {
        let citadel = self.grid.grid().citadel();
        if cell == citadel && self.game_over.trigger(robot, citadel) {
            tracing::warn!(%robot, %cell, "robot reached the citadel; game over");
            self.events.publish(Event::GameOver {
                robot,
                cell: citadel,
            });
        }
    }
}

/// Claim on a robot's single in-flight slot, released on drop.
struct StepTicket {
    shared: Arc<Shared>,
    robot: RobotId,
}

impl StepTicket {
    fn claim(shared: &Arc<Shared>, robot: RobotId) -> Result<Self, SimError> {
        shared.roster.claim(robot)?;
        Ok(Self {
            shared: Arc::clone(shared),
            robot,
        })
    }

    fn execute(&self, axis: Axis) -> Result<StepOutcome, SimError> {
        let shared = &*self.shared;
        let start = shared.roster.start_moving(self.robot)?;
        if start.cell == start.target {
            shared.reach_citadel(self.robot, start.cell);
            return Ok(StepOutcome::AtCitadel);
        }
        let Some(to) = start.cell.step_toward(start.target, axis) else {
            return Ok(StepOutcome::Aligned);
        };
        shared.grid.grid().check(to)?;

        let permit = match shared.policy {
            MovementPolicy::GloballySerialized => Some(lock_recovering(&shared.commit_permit)),
            MovementPolicy::CellExclusive => None,
        };
        let Some(cells) = shared.grid.try_lock_pair(start.cell, to)? else {
            tracing::trace!(robot = %self.robot, from = %start.cell, %to, "step blocked by cell lock");
            return Ok(StepOutcome::Blocked(BlockReason::CellLocked));
        };
        let committed = shared.roster.commit(self.robot, start.cell, to);
        cells.unlock();
        drop(permit);

        match committed {
            Ok(()) => {}
            Err(CommitRefusal::RobotMidMove) => {
                tracing::trace!(robot = %self.robot, %to, "step blocked by moving robot");
                return Ok(StepOutcome::Blocked(BlockReason::RobotMidMove));
            }
            Err(CommitRefusal::Vanished | CommitRefusal::Displaced) => {
                return Err(SimError::UnknownRobot { robot: self.robot });
            }
        }

        tracing::debug!(robot = %self.robot, from = %start.cell, %to, "robot advanced");
        shared.events.publish(Event::RobotAdvanced {
            robot: self.robot,
            from: start.cell,
            to,
        });
        shared.reach_citadel(self.robot, to);
        Ok(StepOutcome::Moved {
            from: start.cell,
            to,
        })
    }
}

impl Drop for StepTicket {
    fn drop(&mut self) {
        self.shared.roster.release(self.robot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citadel_defence_core::SimulationConfig;
    use rand::SeedableRng;

    fn scheduler() -> MovementScheduler {
        let config = SimulationConfig::default();
        let grid = config.validate().expect("default config is valid");
        MovementScheduler::new(
            Arc::new(GridState::new(grid)),
            Arc::new(EventBus::new(64)),
            Arc::new(GameOverLatch::new()),
            &config.robots,
            ChaCha8Rng::seed_from_u64(11),
        )
        .expect("scheduler starts")
    }

    #[test]
    fn held_destination_lock_blocks_the_step() {
        let scheduler = scheduler();
        let robot = scheduler
            .spawn_robot_at(CellCoord::new(0, 4))
            .expect("spawn")
            .id;

        let held = scheduler
            .shared
            .grid
            .lock_cell(CellCoord::new(1, 4))
            .expect("in bounds");
        assert_eq!(
            scheduler.advance_robot(robot, Axis::Horizontal),
            Ok(StepOutcome::Blocked(BlockReason::CellLocked))
        );
        held.unlock();

        assert_eq!(
            scheduler.advance_robot(robot, Axis::Horizontal),
            Ok(StepOutcome::Moved {
                from: CellCoord::new(0, 4),
                to: CellCoord::new(1, 4),
            })
        );
        let _ = scheduler.shutdown();
    }

    #[test]
    fn aligned_axis_leaves_robot_in_place() {
        let scheduler = scheduler();
        let robot = scheduler
            .spawn_robot_at(CellCoord::new(4, 0))
            .expect("spawn")
            .id;

        assert_eq!(
            scheduler.advance_robot(robot, Axis::Horizontal),
            Ok(StepOutcome::Aligned)
        );
        assert_eq!(
            scheduler.robots()[0].cell,
            CellCoord::new(4, 0),
            "aligned step must not move the robot"
        );
        assert!(!scheduler.robots()[0].moving);
        let _ = scheduler.shutdown();
    }
}
