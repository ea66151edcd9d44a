#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Spawning policy: when robots enter the grid, which corner they enter
//! from, and how quickly each one steps afterwards.

use std::{ops::RangeInclusive, time::Duration};

use citadel_defence_core::{Cadence, CellCoord};
use rand::{seq::SliceRandom, Rng};

/// Configuration parameters required to construct the spawning system.
#[derive(Clone, Debug)]
pub struct Config {
    spawn_interval: Duration,
    step_delay_ms: RangeInclusive<u64>,
}

impl Config {
    /// Creates a new configuration using the provided spawn cadence and step delay range.
    #[must_use]
    pub const fn new(spawn_interval: Duration, step_delay_ms: RangeInclusive<u64>) -> Self {
        Self {
            spawn_interval,
            step_delay_ms,
        }
    }
}

/// Decides when robots spawn and how fast each one moves.
#[derive(Debug)]
pub struct Spawning {
    cadence: Cadence,
    step_delay_ms: RangeInclusive<u64>,
}

impl Spawning {
    /// Creates a new spawning system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            cadence: Cadence::new(config.spawn_interval),
            step_delay_ms: config.step_delay_ms,
        }
    }

    /// Advances the spawn cadence, returning the number of spawn attempts now due.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        self.cadence.advance(dt)
    }

    /// Draws the delay a freshly spawned robot waits between its steps.
    pub fn draw_step_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let (low, high) = (*self.step_delay_ms.start(), *self.step_delay_ms.end());
        if low >= high {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

/// Picks a corner uniformly at random among those no robot occupies.
///
/// Returns `None` when every corner is taken; callers treat that as
/// backpressure and skip the spawn.
pub fn select_corner<R, F>(corners: &[CellCoord], occupied: F, rng: &mut R) -> Option<CellCoord>
where
    R: Rng,
    F: Fn(CellCoord) -> bool,
{
    let free: Vec<CellCoord> = corners
        .iter()
        .copied()
        .filter(|corner| !occupied(*corner))
        .collect();
    free.choose(rng).copied()
}
