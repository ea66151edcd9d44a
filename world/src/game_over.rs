//! Process-wide game-over condition.

use std::sync::OnceLock;

use citadel_defence_core::{CellCoord, RobotId};

/// Latches once, the first time any robot occupies the citadel.
#[derive(Debug, Default)]
pub struct GameOverLatch {
    winner: OnceLock<(RobotId, CellCoord)>,
}

impl GameOverLatch {
    /// Creates an unset latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch. Returns `true` only for the call that set it.
    pub fn trigger(&self, robot: RobotId, citadel: CellCoord) -> bool {
        self.winner.set((robot, citadel)).is_ok()
    }

    /// Whether the game is over.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.winner.get().is_some()
    }

    /// Robot that reached the citadel first, if any.
    #[must_use]
    pub fn winner(&self) -> Option<RobotId> {
        self.winner.get().map(|(robot, _)| *robot)
    }
}
