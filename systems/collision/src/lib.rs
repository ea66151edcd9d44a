#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Resolves robots standing on standing walls.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use citadel_defence_core::{CellCoord, Event, RobotId, WallImpact};
use citadel_defence_system_builder::WallConstructionPipeline;
use citadel_defence_system_movement::RobotRoster;
use citadel_defence_world::EventBus;

/// Transitions applied by a single collision pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollisionReport {
    /// Walls weakened during the pass.
    pub weakened: Vec<CellCoord>,
    /// Robots destroyed together with the wall they collapsed.
    pub destroyed: Vec<(RobotId, CellCoord)>,
}

impl CollisionReport {
    /// Whether the pass changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weakened.is_empty() && self.destroyed.is_empty()
    }
}

/// Applies wall impacts for every robot sharing a cell with a standing wall.
#[derive(Debug)]
pub struct CollisionResolver {
    roster: Arc<RobotRoster>,
    walls: Arc<WallConstructionPipeline>,
    events: Arc<EventBus>,
    destroyed: AtomicU64,
}

impl CollisionResolver {
    /// Creates a resolver over the live robots and the wall pipeline.
    #[must_use]
    pub fn new(
        roster: Arc<RobotRoster>,
        walls: Arc<WallConstructionPipeline>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            roster,
            walls,
            events,
            destroyed: AtomicU64::new(0),
        }
    }

    /// Runs one collision pass.
    ///
    /// Holds the robot roster and then the wall ledger for the whole scan, so
    /// each robot resolves at most one impact against a consistent wall set.
    pub fn resolve(&self) -> CollisionReport {
        let mut report = CollisionReport::default();
        let mut impacts = None;
        let removed = self.roster.remove_where(|robot, cell| {
            let impacts = impacts.get_or_insert_with(|| self.walls.impacts());
            match impacts.hit(cell, robot) {
                Some(WallImpact::Destroyed) => true,
                Some(WallImpact::Weakened) => {
                    report.weakened.push(cell);
                    false
                }
                None => false,
            }
        });
        drop(impacts);

        for (robot, cell) in removed {
            let total = self.destroyed.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(%robot, %cell, destroyed = total, "robot destroyed by collapsing wall");
            self.events.publish(Event::RobotDestroyed { robot, cell });
            report.destroyed.push((robot, cell));
        }
        report
    }

    /// Robots destroyed since the simulation started.
    #[must_use]
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }
}
