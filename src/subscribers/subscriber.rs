//! # The subscriber extension point.
//!
//! Anything that wants to observe a supervised service (log shipping, crash
//! counters, alerting, a status page) implements [`Subscribe`] and is handed to
//! [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).
//!
//! ```text
//! Bus ─► listener ─► SubscriberSet ─┬─ interested(kind)? ─► [queue] ─► worker ─► on_event
//!                                   └─ otherwise skipped for this subscriber
//! ```
//!
//! Delivery is per subscriber: its own bounded queue, its own worker, FIFO
//! order. A full queue drops the event for that subscriber and publishes
//! `SubscriberOverflow`; a panic in `on_event` is published as
//! `SubscriberPanicked` and the worker moves on to the next event.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use async_trait::async_trait;
//! use servicevisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct CrashCounter(AtomicU32);
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!
//!     fn interested(&self, kind: EventKind) -> bool {
//!         kind == EventKind::ChildExited
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Observer of a supervised service's events.
///
/// `on_event` runs on the subscriber's own worker task, so it may await I/O;
/// it must not block the executor thread.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Filter applied before queueing. Skipped kinds never reach the queue and
    /// cannot overflow it.
    ///
    /// Default: every kind.
    fn interested(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Name used in overflow/panic events and logs.
    ///
    /// Defaults to the type name; override with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
