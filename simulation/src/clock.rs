//! Real-time driver advancing a [`Simulation`] on a background thread.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use citadel_defence_core::SimError;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::Simulation;

/// Periodic driver calling [`Simulation::advance`] once per frame interval
/// with the wall-clock time that actually passed.
///
/// The driver exits on its own after the frame that settles game-over.
#[derive(Debug)]
pub struct SimulationClock {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SimulationClock {
    /// Starts driving `simulation` on a dedicated thread.
    pub fn start(simulation: Arc<Simulation>) -> Result<Self, SimError> {
        let frame = simulation.config().clock.frame_interval();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("citadel-clock".to_owned())
            .spawn(move || {
                let mut last = Instant::now();
                loop {
                    match stop_rx.recv_timeout(frame) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            let now = Instant::now();
                            let report = simulation.advance(now - last);
                            last = now;
                            if report.finished {
                                tracing::info!("clock stopping after game over");
                                return;
                            }
                        }
                    }
                }
                let _ = simulation.shutdown();
            })
            .map_err(|err| SimError::WorkerSpawn {
                reason: err.to_string(),
            })?;
        tracing::debug!(?frame, "simulation clock started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Whether the driver thread is still advancing the simulation.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stops the driver and waits for its thread to exit.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("simulation clock panicked");
            }
        }
    }
}

impl Drop for SimulationClock {
    fn drop(&mut self) {
        self.stop();
    }
}
