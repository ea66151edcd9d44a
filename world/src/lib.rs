#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative shared grid state for Citadel Defence.
//!
//! [`GridState`] owns one exclusive lock per cell. Every operation that reads
//! and then writes what occupies a cell holds that cell's lock for the whole
//! read-modify-write. Operations touching two cells acquire both locks through
//! [`GridState::lock_pair`] or [`GridState::try_lock_pair`], which always lock
//! the lower row-major index first. Guards release on drop, on every exit path.
//!
//! Crate-wide lock order: cell locks (row-major), then the robot roster, then
//! the wall ledger. No component acquires them in any other order.

use std::sync::{Mutex, MutexGuard, TryLockError};

use citadel_defence_core::{CellCoord, Grid, SimError};

mod bus;
mod game_over;

pub use bus::EventBus;
pub use game_over::GameOverLatch;

/// Something that can report whether it occupies a cell.
///
/// Implemented by the robot roster and the wall ledger so the grid can answer
/// occupancy questions without owning either collection.
pub trait OccupancyProbe {
    /// Reports whether the cell holds an entity tracked by this probe.
    fn occupies(&self, cell: CellCoord) -> bool;
}

impl<F> OccupancyProbe for F
where
    F: Fn(CellCoord) -> bool,
{
    fn occupies(&self, cell: CellCoord) -> bool {
        self(cell)
    }
}

/// Grid dimensions plus the per-cell lock set.
#[derive(Debug)]
pub struct GridState {
    grid: Grid,
    cells: Box<[Mutex<()>]>,
}

impl GridState {
    /// Allocates one lock per cell of the provided grid.
    #[must_use]
    pub fn new(grid: Grid) -> Self {
        let cells = (0..grid.cell_count()).map(|_| Mutex::new(())).collect();
        Self { grid, cells }
    }

    /// Immutable grid description.
    #[must_use]
    pub const fn grid(&self) -> Grid {
        self.grid
    }

    /// Attempts to lock the cell without blocking.
    ///
    /// Returns `Ok(None)` when another operation currently holds the cell.
    pub fn try_lock_cell(&self, cell: CellCoord) -> Result<Option<CellGuard<'_>>, SimError> {
        let slot = self.slot(cell)?;
        Ok(try_acquire(slot).map(|guard| CellGuard {
            cell,
            _guard: guard,
        }))
    }

    /// Locks the cell, blocking until it is free.
    pub fn lock_cell(&self, cell: CellCoord) -> Result<CellGuard<'_>, SimError> {
        let slot = self.slot(cell)?;
        Ok(CellGuard {
            cell,
            _guard: lock_recovering(slot),
        })
    }

    /// Locks two cells in canonical order, blocking until both are free.
    ///
    /// Identical cells are locked once.
    pub fn lock_pair(&self, first: CellCoord, second: CellCoord) -> Result<CellPair<'_>, SimError> {
        let (low, high) = self.ordered(first, second)?;
        let low_guard = self.lock_cell(low)?;
        let high_guard = match high {
            Some(cell) => Some(self.lock_cell(cell)?),
            None => None,
        };
        Ok(CellPair {
            first,
            second,
            _low: low_guard,
            _high: high_guard,
        })
    }

    /// Attempts to lock two cells in canonical order without blocking.
    ///
    /// Returns `Ok(None)` if either cell is held elsewhere; in that case no
    /// lock is retained.
    pub fn try_lock_pair(
        &self,
        first: CellCoord,
        second: CellCoord,
    ) -> Result<Option<CellPair<'_>>, SimError> {
        let (low, high) = self.ordered(first, second)?;
        let Some(low_guard) = self.try_lock_cell(low)? else {
            return Ok(None);
        };
        let high_guard = match high {
            Some(cell) => match self.try_lock_cell(cell)? {
                Some(guard) => Some(guard),
                None => return Ok(None),
            },
            None => None,
        };
        Ok(Some(CellPair {
            first,
            second,
            _low: low_guard,
            _high: high_guard,
        }))
    }

    /// Reports whether any probe occupies the cell, holding the cell lock while asking.
    pub fn is_occupied(
        &self,
        cell: CellCoord,
        probes: &[&dyn OccupancyProbe],
    ) -> Result<bool, SimError> {
        let guard = self.lock_cell(cell)?;
        Ok(guard.is_occupied(probes))
    }

    fn slot(&self, cell: CellCoord) -> Result<&Mutex<()>, SimError> {
        self.grid.check(cell)?;
        self.grid
            .index(cell)
            .and_then(|index| self.cells.get(index))
            .ok_or(SimError::OutOfBounds {
                cell,
                columns: self.grid.columns(),
                rows: self.grid.rows(),
            })
    }

    fn ordered(
        &self,
        first: CellCoord,
        second: CellCoord,
    ) -> Result<(CellCoord, Option<CellCoord>), SimError> {
        self.grid.check(first)?;
        self.grid.check(second)?;
        let first_index = self.grid.index(first);
        let second_index = self.grid.index(second);
        Ok(match first_index.cmp(&second_index) {
            std::cmp::Ordering::Equal => (first, None),
            std::cmp::Ordering::Less => (first, Some(second)),
            std::cmp::Ordering::Greater => (second, Some(first)),
        })
    }
}

/// Scoped ownership of a single cell lock.
#[derive(Debug)]
pub struct CellGuard<'a> {
    cell: CellCoord,
    _guard: MutexGuard<'a, ()>,
}

impl CellGuard<'_> {
    /// Cell protected by the guard.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.cell
    }

    /// Reports whether any probe occupies the guarded cell.
    #[must_use]
    pub fn is_occupied(&self, probes: &[&dyn OccupancyProbe]) -> bool {
        probes.iter().any(|probe| probe.occupies(self.cell))
    }

    /// Releases the lock explicitly.
    pub fn unlock(self) {}
}

/// Scoped ownership of the locks for a source and destination cell.
#[derive(Debug)]
pub struct CellPair<'a> {
    first: CellCoord,
    second: CellCoord,
    _low: CellGuard<'a>,
    _high: Option<CellGuard<'a>>,
}

impl CellPair<'_> {
    /// First cell as passed by the caller.
    #[must_use]
    pub const fn first(&self) -> CellCoord {
        self.first
    }

    /// Second cell as passed by the caller.
    #[must_use]
    pub const fn second(&self) -> CellCoord {
        self.second
    }

    /// Releases both locks explicitly.
    pub fn unlock(self) {}
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn try_acquire<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}
