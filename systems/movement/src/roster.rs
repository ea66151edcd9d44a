//! Live robot collection and the per-robot in-flight bookkeeping.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use citadel_defence_core::{Cadence, CellCoord, Position, RobotId, RobotSnapshot, SimError};
use citadel_defence_world::{lock_recovering, OccupancyProbe};

/// A robot converging on the citadel.
#[derive(Clone, Debug)]
struct Robot {
    id: RobotId,
    position: Position,
    target: CellCoord,
    cadence: Cadence,
    moving: bool,
    in_flight: bool,
}

impl Robot {
    fn cell(&self) -> CellCoord {
        self.position.cell()
    }

    fn snapshot(&self) -> RobotSnapshot {
        RobotSnapshot {
            id: self.id,
            position: self.position,
            cell: self.cell(),
            moving: self.moving,
        }
    }
}

/// Where a claimed robot stands when its step begins.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepStart {
    pub(crate) cell: CellCoord,
    pub(crate) target: CellCoord,
}

/// Why a commit could not be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommitRefusal {
    Vanished,
    Displaced,
    RobotMidMove,
}

/// Live robots, mutated only by the movement scheduler and the collision resolver.
#[derive(Debug, Default)]
pub struct RobotRoster {
    robots: Mutex<Vec<Robot>>,
    next_id: AtomicU32,
}

impl RobotRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots every live robot ordered by identifier.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RobotSnapshot> {
        lock_recovering(&self.robots)
            .iter()
            .map(Robot::snapshot)
            .collect()
    }

    /// Removes every robot for which `destroy` returns `true`, holding the
    /// roster lock for the whole scan.
    ///
    /// `destroy` is invoked exactly once per live robot with its identifier and
    /// cell. Callers may acquire the wall ledger inside `destroy`; nothing may
    /// acquire a cell lock there. Returns the removed robots.
    pub fn remove_where<F>(&self, mut destroy: F) -> Vec<(RobotId, CellCoord)>
    where
        F: FnMut(RobotId, CellCoord) -> bool,
    {
        let mut robots = lock_recovering(&self.robots);
        let mut removed = Vec::new();
        robots.retain(|robot| {
            let cell = robot.cell();
            if destroy(robot.id, cell) {
                removed.push((robot.id, cell));
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn register(
        &self,
        cell: CellCoord,
        target: CellCoord,
        step_delay: Duration,
    ) -> RobotSnapshot {
        let id = RobotId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let robot = Robot {
            id,
            position: Position::at(cell),
            target,
            cadence: Cadence::new(step_delay),
            moving: false,
            in_flight: false,
        };
        let snapshot = robot.snapshot();
        lock_recovering(&self.robots).push(robot);
        snapshot
    }

    /// Marks the robot's single step slot as taken.
    pub(crate) fn claim(&self, robot: RobotId) -> Result<(), SimError> {
        let mut robots = lock_recovering(&self.robots);
        let entry = robots
            .iter_mut()
            .find(|candidate| candidate.id == robot)
            .ok_or(SimError::UnknownRobot { robot })?;
        if entry.in_flight {
            return Err(SimError::AlreadyInFlight { robot });
        }
        entry.in_flight = true;
        Ok(())
    }

    /// Frees the robot's step slot. Tolerates robots removed mid-step.
    pub(crate) fn release(&self, robot: RobotId) {
        let mut robots = lock_recovering(&self.robots);
        if let Some(entry) = robots.iter_mut().find(|candidate| candidate.id == robot) {
            entry.in_flight = false;
            entry.moving = false;
        }
    }

    /// Flags the claimed robot as moving and reports where it stands.
    pub(crate) fn start_moving(&self, robot: RobotId) -> Result<StepStart, SimError> {
        let mut robots = lock_recovering(&self.robots);
        let entry = robots
            .iter_mut()
            .find(|candidate| candidate.id == robot)
            .ok_or(SimError::UnknownRobot { robot })?;
        entry.moving = true;
        Ok(StepStart {
            cell: entry.cell(),
            target: entry.target,
        })
    }

    /// Moves the robot from `from` to `to` unless another moving robot stands on `to`.
    ///
    /// Callers must hold the cell locks for both cells.
    pub(crate) fn commit(
        &self,
        robot: RobotId,
        from: CellCoord,
        to: CellCoord,
    ) -> Result<(), CommitRefusal> {
        let mut robots = lock_recovering(&self.robots);
        let blocked = robots
            .iter()
            .any(|other| other.id != robot && other.moving && other.cell() == to);

        let entry = robots
            .iter_mut()
            .find(|candidate| candidate.id == robot)
            .ok_or(CommitRefusal::Vanished)?;
        if entry.cell() != from {
            return Err(CommitRefusal::Displaced);
        }
        if blocked {
            return Err(CommitRefusal::RobotMidMove);
        }
        entry.position = Position::at(to);
        Ok(())
    }

    /// Adds `dt` to every idle robot's step cadence and returns those due to step.
    pub(crate) fn due(&self, dt: Duration) -> Vec<RobotId> {
        let mut robots = lock_recovering(&self.robots);
        robots
            .iter_mut()
            .filter_map(|robot| {
                let fired = robot.cadence.advance(dt);
                (fired > 0 && !robot.in_flight).then_some(robot.id)
            })
            .collect()
    }
}

impl OccupancyProbe for RobotRoster {
    fn occupies(&self, cell: CellCoord) -> bool {
        lock_recovering(&self.robots)
            .iter()
            .any(|robot| robot.cell() == cell)
    }
}
