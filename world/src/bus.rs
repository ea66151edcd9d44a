//! Bounded, non-blocking event fan-out.

use std::sync::atomic::{AtomicU64, Ordering};

use citadel_defence_core::Event;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Bounded channel carrying lifecycle events to observers.
///
/// Publishing never blocks. When the buffer is full the event is discarded
/// and counted. Receivers share one queue, so each event reaches exactly one
/// of them.
#[derive(Debug)]
pub struct EventBus {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    dropped: AtomicU64,
}

impl EventBus {
    /// Creates a bus retaining at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            dropped: AtomicU64::new(0),
        }
    }

    /// Publishes an event, discarding it when the buffer is full.
    pub fn publish(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(?event, dropped, "event bus full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Returns a receiver observing the shared event queue.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Event> {
        self.receiver.clone()
    }

    /// Removes every event currently buffered.
    #[must_use]
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }

    /// Number of events discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
