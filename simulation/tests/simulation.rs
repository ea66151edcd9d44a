use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use citadel_defence_core::{
    Axis, CellCoord, ClockConfig, Event, EventConfig, RobotConfig, RobotId, SimError,
    SimulationConfig, WallSnapshot, WallState,
};
use citadel_defence_simulation::{FrameReport, Simulation, SimulationClock};
use citadel_defence_system_movement::StepOutcome;

fn seeded() -> SimulationConfig {
    SimulationConfig {
        seed: Some(0x00C1_7ADE),
        ..SimulationConfig::default()
    }
}

#[test]
fn wall_absorbs_two_impacts_then_takes_the_robot_with_it() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    let robot = simulation
        .spawn_robot_at(CellCoord::new(0, 0))
        .expect("spawn")
        .id;

    assert!(simulation.request_wall_build(1, 0));
    let _ = simulation.notify_tick();
    assert_eq!(
        simulation.state().walls,
        vec![WallSnapshot {
            cell: CellCoord::new(1, 0),
            state: WallState::Built,
        }]
    );

    assert!(matches!(
        simulation.advance_robot(robot, Axis::Horizontal),
        Ok(StepOutcome::Moved { .. })
    ));
    let first = simulation.notify_tick();
    assert_eq!(first.robots_destroyed, 0);
    assert_eq!(simulation.state().walls[0].state, WallState::Weakened);

    let second = simulation.notify_tick();
    assert_eq!(second.robots_destroyed, 1);

    let state = simulation.state();
    assert_eq!(state.destroyed_robots, 1);
    assert!(state.walls.is_empty());
    assert!(state.robots.is_empty());
    assert_eq!(state.score, 100);
    assert!(simulation.request_wall_build(1, 0), "freed cell is reusable");
    let _ = simulation.shutdown();
}

#[test]
fn eleventh_request_is_refused() {
    let simulation = Simulation::new(seeded()).expect("simulation");

    let accepted: Vec<bool> = (0..11)
        .map(|index| simulation.request_wall_build(index % 9, 1 + index / 9))
        .collect();

    assert_eq!(accepted.iter().filter(|accepted| **accepted).count(), 10);
    assert_eq!(accepted.last(), Some(&false));
    assert_eq!(simulation.state().pending_walls, 10);
    assert_eq!(
        simulation.try_request_wall_build(CellCoord::new(7, 7)),
        Err(SimError::CapacityExceeded { cap: 10 })
    );
    let _ = simulation.shutdown();
}

#[test]
fn invalid_coordinates_change_nothing() {
    let simulation = Simulation::new(seeded()).expect("simulation");

    assert!(!simulation.request_wall_build(-1, 0));
    assert!(!simulation.request_wall_build(0, -3));
    assert!(!simulation.request_wall_build(9, 0));
    assert!(!simulation.request_wall_build(4, 4), "citadel cell");

    let state = simulation.state();
    assert!(state.walls.is_empty());
    assert_eq!(state.pending_walls, 0);
    assert!(simulation.drain_events().is_empty());
    let _ = simulation.shutdown();
}

#[test]
fn game_over_settles_once_and_freezes_the_score() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    assert_eq!(simulation.advance(Duration::from_millis(1_200)).spawned, 0);

    let robot = simulation
        .spawn_robot_at(CellCoord::new(3, 4))
        .expect("spawn")
        .id;
    assert!(matches!(
        simulation.advance_robot(robot, Axis::Horizontal),
        Ok(StepOutcome::Moved { .. })
    ));
    assert!(simulation.is_game_over());
    assert_eq!(simulation.winner(), Some(robot));

    let settle = simulation.advance(Duration::from_millis(800));
    assert!(settle.finished);
    assert_eq!(settle.spawned, 0);
    assert!(simulation.advance(Duration::from_secs(5)).finished);

    let state = simulation.state();
    assert!(state.game_over);
    assert_eq!(state.elapsed, Duration::from_millis(1_200));
    assert_eq!(state.score, 10);
    assert!(state
        .robots
        .iter()
        .any(|snapshot| snapshot.id == robot && snapshot.cell == CellCoord::new(4, 4)));
    assert!(!simulation.request_wall_build(0, 1));
    assert_eq!(simulation.request_robot_step(robot), Err(SimError::GameOver));

    let game_overs = simulation
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, Event::GameOver { .. }))
        .count();
    assert_eq!(game_overs, 1);
}

/// Leaves a robot standing on a weakened wall at (1,0) and returns its id.
fn rest_on_weakened_wall(simulation: &Simulation) -> RobotId {
    let robot = simulation
        .spawn_robot_at(CellCoord::new(0, 0))
        .expect("spawn")
        .id;
    assert!(simulation.request_wall_build(1, 0));
    let _ = simulation.notify_tick();
    assert!(matches!(
        simulation.advance_robot(robot, Axis::Horizontal),
        Ok(StepOutcome::Moved { .. })
    ));
    assert_eq!(simulation.notify_tick().robots_destroyed, 0);
    assert_eq!(simulation.state().walls[0].state, WallState::Weakened);
    robot
}

fn win(simulation: &Simulation) {
    let winner = simulation
        .spawn_robot_at(CellCoord::new(3, 4))
        .expect("spawn")
        .id;
    assert!(matches!(
        simulation.advance_robot(winner, Axis::Horizontal),
        Ok(StepOutcome::Moved { .. })
    ));
    assert!(simulation.is_game_over());
}

#[test]
fn ticks_after_game_over_settle_once_without_moving_the_score() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    let resting = rest_on_weakened_wall(&simulation);
    win(&simulation);
    let score_at_latch = simulation.score();

    let settle = simulation.notify_tick();
    assert!(settle.finished);
    assert_eq!(settle.robots_destroyed, 1);
    for _ in 0..3 {
        assert_eq!(
            simulation.notify_tick(),
            FrameReport {
                finished: true,
                ..FrameReport::default()
            }
        );
    }

    let state = simulation.state();
    assert!(simulation.is_finished());
    assert_eq!(state.destroyed_robots, 1);
    assert_eq!(state.score, score_at_latch);
    assert_eq!(simulation.score(), score_at_latch);
    assert!(state.robots.iter().all(|robot| robot.id != resting));
}

#[test]
fn settle_frame_destroys_without_scoring() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    assert_eq!(simulation.advance(Duration::from_millis(1_000)).spawned, 0);
    let _ = rest_on_weakened_wall(&simulation);
    win(&simulation);
    assert_eq!(simulation.score(), 10);

    let settle = simulation.advance(Duration::from_secs(2));
    assert!(settle.finished);
    assert_eq!(settle.robots_destroyed, 1);
    assert_eq!(settle.spawned, 0);
    assert_eq!(simulation.destroyed_robots(), 1);
    assert_eq!(simulation.score(), 10);
    assert_eq!(simulation.state().score, 10);
    assert_eq!(simulation.elapsed(), Duration::from_secs(1));
}

#[test]
fn pooled_step_landing_on_a_wall_is_resolved_when_settling() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    let walker = simulation
        .spawn_robot_at(CellCoord::new(2, 2))
        .expect("spawn")
        .id;
    assert!(simulation.request_wall_build(3, 2));
    assert!(simulation.request_wall_build(2, 3));
    assert_eq!(simulation.notify_tick().walls_built, 2);

    simulation.request_robot_step(walker).expect("step queued");
    win(&simulation);
    assert!(simulation.advance(Duration::from_millis(50)).finished);

    let state = simulation.state();
    let landed = state
        .robots
        .iter()
        .find(|robot| robot.id == walker)
        .expect("one impact leaves the walker standing")
        .cell;
    assert!(landed == CellCoord::new(3, 2) || landed == CellCoord::new(2, 3));
    assert!(state.walls.contains(&WallSnapshot {
        cell: landed,
        state: WallState::Weakened,
    }));
}

#[test]
fn elapsed_time_scores_ten_points_per_second() {
    let simulation = Simulation::new(seeded()).expect("simulation");
    for _ in 0..6 {
        let _ = simulation.advance(Duration::from_millis(500));
    }

    assert_eq!(simulation.elapsed(), Duration::from_secs(3));
    assert_eq!(simulation.score(), 30);
    assert_eq!(simulation.state().robots.len(), 2, "spawned at 1.5 s and 3 s");
    let _ = simulation.shutdown();
}

#[test]
fn full_event_buffer_drops_and_counts() {
    let simulation = Simulation::new(SimulationConfig {
        events: EventConfig { capacity: 1 },
        ..seeded()
    })
    .expect("simulation");

    for column in 1..4 {
        assert!(simulation.request_wall_build(column, 0));
    }
    assert_eq!(simulation.dropped_events(), 2);
    assert_eq!(
        simulation.drain_events(),
        vec![Event::WallQueued {
            cell: CellCoord::new(1, 0)
        }]
    );
    let _ = simulation.shutdown();
}

#[test]
fn real_time_clock_runs_until_a_robot_wins() {
    let simulation = Arc::new(
        Simulation::new(SimulationConfig {
            robots: RobotConfig {
                spawn_interval_ms: 20,
                min_step_delay_ms: 5,
                max_step_delay_ms: 15,
                ..RobotConfig::default()
            },
            clock: ClockConfig {
                frame_interval_ms: 5,
                collision_interval_ms: 5,
            },
            ..seeded()
        })
        .expect("simulation"),
    );
    let clock = SimulationClock::start(Arc::clone(&simulation)).expect("clock starts");

    let deadline = Instant::now() + Duration::from_secs(10);
    while clock.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!clock.is_running(), "clock should stop itself after game over");
    drop(clock);

    let state = simulation.state();
    assert!(state.game_over);
    assert!(simulation.is_finished());
    let winner = simulation.winner().expect("a robot won");
    assert!(state
        .robots
        .iter()
        .any(|robot| robot.id == winner && robot.cell == CellCoord::new(4, 4)));
}
