//! # Event bus.
//!
//! Every component of a supervised service reports through one [`Bus`]: the
//! control loop, the stop escalation, both drain tasks and the subscriber
//! workers. It wraps a [`tokio::sync::broadcast`] ring buffer.
//!
//! ```text
//!   ControlLoop ──┐
//!   stop::run   ──┤                 ┌──► subscriber listener ──► SubscriberSet
//!   drain (out) ──┼──► Bus (ring) ──┤
//!   drain (err) ──┤                 └──► Supervisor::subscribe() receivers
//!   workers     ──┘
//! ```
//!
//! Publishing never waits. A receiver that falls more than `capacity` events
//! behind gets `RecvError::Lagged(n)` and resumes at the oldest retained event.
//! Events published while nobody listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing handle to the event ring.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Hands `ev` to every current receiver. Never blocks.
    pub fn publish(&self, ev: Event) {
        // No receivers is not an error: the event is simply not observed.
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
