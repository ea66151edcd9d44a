//! Fixed-size worker pool executing robot steps off the caller's thread.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use citadel_defence_core::SimError;
use citadel_defence_world::lock_recovering;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of stopping the movement worker pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker finished within the grace period.
    pub graceful: bool,
    /// Queued steps discarded without running.
    pub cancelled_jobs: usize,
    /// Workers still running when shutdown gave up waiting on them.
    pub stragglers: usize,
}

#[derive(Debug)]
pub(crate) struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    exited: Receiver<usize>,
    cancelled: Arc<AtomicBool>,
    discarded: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub(crate) fn start(workers: usize, capacity: usize) -> Result<Self, SimError> {
        let (sender, receiver) = bounded::<Job>(capacity);
        let (exit_tx, exited) = bounded::<usize>(workers);
        let cancelled = Arc::new(AtomicBool::new(false));
        let discarded = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = receiver.clone();
            let exit_tx = exit_tx.clone();
            let cancelled = Arc::clone(&cancelled);
            let discarded = Arc::clone(&discarded);
            let handle = thread::Builder::new()
                .name(format!("citadel-move-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        if cancelled.load(Ordering::SeqCst) {
                            drop(job);
                            let _ = discarded.fetch_add(1, Ordering::SeqCst);
                            continue;
                        }
                        job();
                    }
                    let _ = exit_tx.send(index);
                })
                .map_err(|err| SimError::WorkerSpawn {
                    reason: err.to_string(),
                })?;
            handles.push(handle);
        }
        tracing::debug!(workers, capacity, "movement worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            exited,
            cancelled,
            discarded,
        })
    }

    /// Queues a job without blocking. A rejected job is dropped unexecuted.
    pub(crate) fn submit(&self, job: Job) -> Result<(), SimError> {
        let sender = lock_recovering(&self.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(SimError::GameOver);
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SimError::PoolSaturated),
            Err(TrySendError::Disconnected(_)) => Err(SimError::GameOver),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        lock_recovering(&self.sender).is_some()
    }

    /// Stops accepting work, lets queued and running steps finish within
    /// `grace`, then discards whatever is still queued.
    pub(crate) fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let Some(sender) = lock_recovering(&self.sender).take() else {
            return ShutdownReport {
                graceful: true,
                ..ShutdownReport::default()
            };
        };
        drop(sender);

        let mut handles = std::mem::take(&mut *lock_recovering(&self.workers));
        let total = handles.len();
        let mut finished = self.await_exits(total, Instant::now() + grace);
        let graceful = finished.len() == total;

        if !graceful {
            self.cancelled.store(true, Ordering::SeqCst);
            tracing::warn!(
                pending = total - finished.len(),
                "movement workers exceeded grace period; cancelling queued steps"
            );
            finished.extend(self.await_exits(total - finished.len(), Instant::now() + grace));
        }

        let mut stragglers = 0;
        for (index, handle) in handles.drain(..).enumerate() {
            if finished.contains(&index) {
                if handle.join().is_err() {
                    tracing::error!(worker = index, "movement worker panicked");
                }
            } else {
                stragglers += 1;
            }
        }
        if stragglers > 0 {
            tracing::warn!(stragglers, "detaching movement workers that did not stop");
        }

        let report = ShutdownReport {
            graceful,
            cancelled_jobs: self.discarded.load(Ordering::SeqCst),
            stragglers,
        };
        tracing::info!(?report, "movement worker pool stopped");
        report
    }

    fn await_exits(&self, expected: usize, deadline: Instant) -> Vec<usize> {
        let mut exited = Vec::with_capacity(expected);
        while exited.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exited.recv_timeout(remaining) {
                Ok(index) => exited.push(index),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        exited
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers drain the queue and exit once the sender is gone.
        drop(lock_recovering(&self.sender).take());
    }
}
