#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wall construction pipeline: accepts build requests, admits them in FIFO
//! batches on each construction tick, and applies robot impacts.
//!
//! The pipeline owns both the standing-wall set and the pending queue behind a
//! single ledger lock. Robot occupancy is supplied by the caller as an
//! [`OccupancyProbe`] so this crate never depends on the movement system.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use citadel_defence_core::{
    CellCoord, Event, RobotId, SimError, WallConfig, WallImpact, WallSnapshot, WallState,
};
use citadel_defence_world::{lock_recovering, EventBus, GridState, OccupancyProbe};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Wall {
    cell: CellCoord,
    state: WallState,
}

impl Wall {
    fn snapshot(&self) -> WallSnapshot {
        WallSnapshot {
            cell: self.cell,
            state: self.state,
        }
    }
}

#[derive(Debug, Default)]
struct WallLedger {
    standing: Vec<Wall>,
    pending: VecDeque<CellCoord>,
}

impl WallLedger {
    fn committed(&self) -> usize {
        self.standing.len() + self.pending.len()
    }

    fn standing_at(&self, cell: CellCoord) -> Option<usize> {
        self.standing.iter().position(|wall| wall.cell == cell)
    }

    fn is_pending(&self, cell: CellCoord) -> bool {
        self.pending.contains(&cell)
    }
}

/// Queue-backed, rate-limited wall construction.
#[derive(Debug)]
pub struct WallConstructionPipeline {
    grid: Arc<GridState>,
    events: Arc<EventBus>,
    cap: usize,
    builds_per_tick: usize,
    ledger: Mutex<WallLedger>,
}

impl WallConstructionPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(grid: Arc<GridState>, events: Arc<EventBus>, config: &WallConfig) -> Self {
        Self {
            grid,
            events,
            cap: config.cap,
            builds_per_tick: config.builds_per_tick,
            ledger: Mutex::new(WallLedger::default()),
        }
    }

    /// Accepts a build request into the FIFO queue or explains the rejection.
    ///
    /// Rejections, in the order they are checked: `OutOfBounds`, then
    /// `CellOccupied` when the cell holds the citadel, a robot, a wall or an
    /// earlier pending request, then `CapacityExceeded`. A rejected request
    /// mutates nothing.
    pub fn request_build(
        &self,
        cell: CellCoord,
        robots: &dyn OccupancyProbe,
    ) -> Result<(), SimError> {
        let guard = self.grid.lock_cell(cell)?;
        if cell == self.grid.grid().citadel() || guard.is_occupied(&[robots]) {
            return Err(SimError::CellOccupied { cell });
        }

        let mut ledger = lock_recovering(&self.ledger);
        if ledger.standing_at(cell).is_some() || ledger.is_pending(cell) {
            return Err(SimError::CellOccupied { cell });
        }
        if ledger.committed() >= self.cap {
            tracing::debug!(%cell, cap = self.cap, "wall request rejected, capacity reached");
            return Err(SimError::CapacityExceeded { cap: self.cap });
        }
        ledger.pending.push_back(cell);
        let pending = ledger.pending.len();
        drop(ledger);
        drop(guard);

        tracing::info!(%cell, pending, "wall queued");
        self.events.publish(Event::WallQueued { cell });
        Ok(())
    }

    /// Runs one construction pass over the pending queue in FIFO order.
    ///
    /// Requests whose cell is currently occupied stay queued for the next
    /// pass; they are never dropped. At most `builds_per_tick` walls are
    /// admitted per pass. Returns the cells built by this pass.
    pub fn tick(&self, robots: &dyn OccupancyProbe) -> Vec<CellCoord> {
        let candidates: Vec<CellCoord> = lock_recovering(&self.ledger)
            .pending
            .iter()
            .copied()
            .collect();

        let mut built = Vec::new();
        for cell in candidates {
            if built.len() >= self.builds_per_tick {
                break;
            }

            let Ok(guard) = self.grid.lock_cell(cell) else {
                continue;
            };
            let robot_present = guard.is_occupied(&[robots]);

            let mut ledger = lock_recovering(&self.ledger);
            let Some(position) = ledger.pending.iter().position(|pending| *pending == cell) else {
                continue;
            };
            if robot_present || ledger.standing_at(cell).is_some() {
                tracing::trace!(%cell, "wall request blocked, retrying next pass");
                continue;
            }
            if ledger.standing.len() >= self.cap {
                break;
            }

            let _ = ledger.pending.remove(position);
            ledger.standing.push(Wall {
                cell,
                state: WallState::Built,
            });
            drop(ledger);
            drop(guard);

            tracing::info!(%cell, "wall built");
            self.events.publish(Event::WallBuilt { cell });
            built.push(cell);
        }
        built
    }

    /// Applies a robot impact to the wall standing on `cell`, if any.
    ///
    /// `Built` walls become `Weakened`; `Weakened` walls are removed, freeing
    /// the cell and a slot under the cap. Queued walls are not hit.
    pub fn impact(&self, cell: CellCoord, robot: RobotId) -> Option<WallImpact> {
        self.impacts().hit(cell, robot)
    }

    /// Locks the wall ledger for a batch of impacts.
    ///
    /// The ledger stays locked until the batch is dropped. Callers holding the
    /// robot roster may open a batch; nothing may take a cell lock while one
    /// is open.
    #[must_use]
    pub fn impacts(&self) -> ImpactBatch<'_> {
        ImpactBatch {
            ledger: Some(lock_recovering(&self.ledger)),
            events: &self.events,
            applied: Vec::new(),
        }
    }

    /// State of the wall standing on `cell`, ignoring queued requests.
    #[must_use]
    pub fn standing_at(&self, cell: CellCoord) -> Option<WallState> {
        let ledger = lock_recovering(&self.ledger);
        ledger
            .standing_at(cell)
            .map(|index| ledger.standing[index].state)
    }

    /// Standing walls in construction order, followed by queued walls in FIFO order.
    #[must_use]
    pub fn walls(&self) -> Vec<WallSnapshot> {
        let ledger = lock_recovering(&self.ledger);
        ledger
            .standing
            .iter()
            .map(Wall::snapshot)
            .chain(ledger.pending.iter().map(|cell| WallSnapshot {
                cell: *cell,
                state: WallState::Queued,
            }))
            .collect()
    }

    /// Number of requests waiting for admission.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock_recovering(&self.ledger).pending.len()
    }

    /// Number of walls currently standing.
    #[must_use]
    pub fn standing_count(&self) -> usize {
        lock_recovering(&self.ledger).standing.len()
    }
}

/// Wall ledger held across several impacts.
///
/// Events for the applied impacts are published in order once the batch is
/// dropped and the ledger released.
#[derive(Debug)]
pub struct ImpactBatch<'a> {
    ledger: Option<MutexGuard<'a, WallLedger>>,
    events: &'a EventBus,
    applied: Vec<Event>,
}

impl ImpactBatch<'_> {
    /// Applies one robot impact to the wall standing on `cell`, if any.
    pub fn hit(&mut self, cell: CellCoord, robot: RobotId) -> Option<WallImpact> {
        let ledger = self.ledger.as_mut()?;
        let index = ledger.standing_at(cell)?;
        match ledger.standing[index].state {
            WallState::Built => {
                ledger.standing[index].state = WallState::Weakened;
                tracing::info!(%cell, %robot, "wall weakened");
                self.applied.push(Event::WallWeakened { cell, robot });
                Some(WallImpact::Weakened)
            }
            WallState::Weakened => {
                let _ = ledger.standing.remove(index);
                tracing::info!(%cell, %robot, "wall destroyed");
                self.applied.push(Event::WallDestroyed { cell, robot });
                Some(WallImpact::Destroyed)
            }
            WallState::Queued => None,
        }
    }
}

impl Drop for ImpactBatch<'_> {
    fn drop(&mut self) {
        drop(self.ledger.take());
        for event in self.applied.drain(..) {
            self.events.publish(event);
        }
    }
}

impl OccupancyProbe for WallConstructionPipeline {
    fn occupies(&self, cell: CellCoord) -> bool {
        let ledger = lock_recovering(&self.ledger);
        ledger.standing_at(cell).is_some() || ledger.is_pending(cell)
    }
}
