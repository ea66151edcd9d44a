use std::{
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use citadel_defence_core::{
    Axis, CellCoord, Event, MovementPolicy, RobotConfig, SimError, SimulationConfig,
};
use citadel_defence_system_movement::{MovementScheduler, StepOutcome};
use citadel_defence_world::{EventBus, GameOverLatch, GridState};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct Harness {
    scheduler: Arc<MovementScheduler>,
    events: Arc<EventBus>,
    game_over: Arc<GameOverLatch>,
}

fn harness(robots: RobotConfig) -> Harness {
    let config = SimulationConfig {
        robots,
        ..SimulationConfig::default()
    };
    let grid = config.validate().expect("valid config");
    let events = Arc::new(EventBus::new(1024));
    let game_over = Arc::new(GameOverLatch::new());
    let scheduler = MovementScheduler::new(
        Arc::new(GridState::new(grid)),
        Arc::clone(&events),
        Arc::clone(&game_over),
        &config.robots,
        ChaCha8Rng::seed_from_u64(0xC17A_DE1),
    )
    .expect("scheduler starts");
    Harness {
        scheduler: Arc::new(scheduler),
        events,
        game_over,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn concurrent_step_requests_execute_one_at_a_time() {
    let harness = harness(RobotConfig::default());
    let robot = harness
        .scheduler
        .spawn_robot_at(CellCoord::new(0, 0))
        .expect("spawn")
        .id;

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|index| {
            let scheduler = Arc::clone(&harness.scheduler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let axis = if index % 2 == 0 {
                    Axis::Horizontal
                } else {
                    Axis::Vertical
                };
                let mut outcomes = Vec::new();
                let _ = barrier.wait();
                for _ in 0..4 {
                    outcomes.push(scheduler.advance_robot(robot, axis));
                }
                outcomes
            })
        })
        .collect();

    let mut moved = 0;
    for handle in handles {
        for outcome in handle.join().expect("stepping thread panicked") {
            match outcome {
                Ok(StepOutcome::Moved { from, to }) => {
                    assert_eq!(from.manhattan_distance(to), 1);
                    moved += 1;
                }
                Ok(StepOutcome::Aligned | StepOutcome::AtCitadel) => {}
                Err(SimError::AlreadyInFlight { .. } | SimError::GameOver) => {}
                other => panic!("unexpected step result: {other:?}"),
            }
        }
    }

    let origin = CellCoord::new(0, 0);
    let cell = harness.scheduler.robots()[0].cell;
    assert_eq!(
        origin.manhattan_distance(cell),
        moved,
        "overlapping steps would lose displacement"
    );
    let _ = harness.scheduler.shutdown();
}

#[test]
fn reaching_the_citadel_latches_game_over() {
    let harness = harness(RobotConfig::default());
    let robot = harness
        .scheduler
        .spawn_robot_at(CellCoord::new(3, 4))
        .expect("spawn")
        .id;

    assert_eq!(
        harness.scheduler.advance_robot(robot, Axis::Horizontal),
        Ok(StepOutcome::Moved {
            from: CellCoord::new(3, 4),
            to: CellCoord::new(4, 4),
        })
    );
    assert!(harness.game_over.is_set());
    assert_eq!(harness.game_over.winner(), Some(robot));

    let events = harness.events.drain();
    assert_eq!(
        events.last(),
        Some(&Event::GameOver {
            robot,
            cell: CellCoord::new(4, 4),
        })
    );

    assert_eq!(harness.scheduler.spawn_robot(), Err(SimError::GameOver));
    assert_eq!(harness.scheduler.step_robot(robot), Err(SimError::GameOver));
    assert!(harness.scheduler.spawn_due(Duration::from_secs(10)).is_empty());
    assert_eq!(
        harness.scheduler.robots().len(),
        1,
        "the winning robot stays in play"
    );
    let _ = harness.scheduler.shutdown();
}

#[test]
fn spawns_are_skipped_once_every_corner_is_taken() {
    let harness = harness(RobotConfig::default());

    let mut corners: Vec<CellCoord> = (0..4)
        .map(|_| {
            harness
                .scheduler
                .spawn_robot()
                .expect("game running")
                .expect("a corner is free")
                .cell
        })
        .collect();
    corners.sort();
    corners.dedup();
    assert_eq!(corners.len(), 4, "each corner hosts exactly one robot");

    assert_eq!(harness.scheduler.spawn_robot(), Ok(None));
    assert_eq!(harness.scheduler.robots().len(), 4);
    assert_eq!(
        harness
            .scheduler
            .spawn_robot_at(CellCoord::new(0, 0))
            .map(|robot| robot.id),
        Err(SimError::CellOccupied {
            cell: CellCoord::new(0, 0)
        })
    );
    let _ = harness.scheduler.shutdown();
}

#[test]
fn spawn_cadence_emits_one_robot_per_interval() {
    let harness = harness(RobotConfig::default());

    assert!(harness
        .scheduler
        .spawn_due(Duration::from_millis(1_499))
        .is_empty());
    assert_eq!(harness.scheduler.spawn_due(Duration::from_millis(1)).len(), 1);
    assert_eq!(
        harness.scheduler.spawn_due(Duration::from_millis(3_000)).len(),
        2
    );

    let spawned = harness
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::RobotSpawned { .. }))
        .count();
    assert_eq!(spawned, 3);
    let _ = harness.scheduler.shutdown();
}

#[test]
fn pooled_steps_finish_before_shutdown_reports() {
    let harness = harness(RobotConfig {
        min_step_delay_ms: 100,
        max_step_delay_ms: 100,
        ..RobotConfig::default()
    });
    for corner in [CellCoord::new(0, 0), CellCoord::new(8, 8)] {
        let _ = harness.scheduler.spawn_robot_at(corner).expect("spawn");
    }

    assert_eq!(harness.scheduler.dispatch_due(Duration::from_millis(100)), 2);
    let report = harness.scheduler.shutdown();
    assert!(report.graceful);
    assert_eq!(report.cancelled_jobs, 0);
    assert_eq!(report.stragglers, 0);

    let advanced = harness
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::RobotAdvanced { .. }))
        .count();
    assert_eq!(advanced, 2, "both queued steps ran to completion");
    assert!(harness.scheduler.robots().iter().all(|robot| !robot.moving));

    let robot = harness.scheduler.robots()[0].id;
    assert_eq!(harness.scheduler.step_robot(robot), Err(SimError::GameOver));
}

#[test]
fn globally_serialized_policy_still_converges() {
    let harness = harness(RobotConfig {
        policy: MovementPolicy::GloballySerialized,
        ..RobotConfig::default()
    });
    let robot = harness
        .scheduler
        .spawn_robot_at(CellCoord::new(0, 0))
        .expect("spawn")
        .id;

    let reached = wait_until(Duration::from_secs(5), || {
        let _ = harness.scheduler.step_robot(robot);
        harness.game_over.is_set()
    });
    assert!(reached, "robot never reached the citadel");
    assert_eq!(harness.scheduler.robots()[0].cell, CellCoord::new(4, 4));
    let _ = harness.scheduler.shutdown();
}

fn axis() -> impl Strategy<Value = Axis> {
    prop_oneof![Just(Axis::Horizontal), Just(Axis::Vertical)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_step_moves_one_cell_toward_the_citadel(
        start in (0u32..9, 0u32..9).prop_filter("not the citadel", |(c, r)| (*c, *r) != (4, 4)),
        axes in proptest::collection::vec(axis(), 1..24),
    ) {
        let harness = harness(RobotConfig { workers: 1, ..RobotConfig::default() });
        let citadel = CellCoord::new(4, 4);
        let robot = harness
            .scheduler
            .spawn_robot_at(CellCoord::new(start.0, start.1))
            .expect("spawn")
            .id;

        for axis in axes {
            let before = harness.scheduler.robots()[0].cell;
            match harness.scheduler.advance_robot(robot, axis) {
                Ok(StepOutcome::Moved { from, to }) => {
                    prop_assert_eq!(from, before);
                    prop_assert_eq!(from.manhattan_distance(to), 1);
                    prop_assert_eq!(
                        to.manhattan_distance(citadel) + 1,
                        from.manhattan_distance(citadel)
                    );
                    let horizontal = from.row() == to.row();
                    prop_assert_eq!(horizontal, axis == Axis::Horizontal);
                }
                Ok(StepOutcome::Aligned) => {
                    let aligned = match axis {
                        Axis::Horizontal => before.column() == citadel.column(),
                        Axis::Vertical => before.row() == citadel.row(),
                    };
                    prop_assert!(aligned);
                }
                Err(SimError::GameOver) => prop_assert_eq!(before, citadel),
                other => prop_assert!(false, "unexpected step result: {:?}", other),
            }
        }
        let _ = harness.scheduler.shutdown();
    }
}
