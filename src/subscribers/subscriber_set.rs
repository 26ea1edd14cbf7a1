//! # Fan-out of bus events to subscribers.
//!
//! [`SubscriberSet`] gives each [`Subscribe`] implementation its own bounded
//! queue and worker task, so that a slow or broken subscriber never delays the
//! control loop or its peers.
//!
//! ```text
//! emit(&event)
//!   ├─ S1 interested ─► try_send ─► [queue S1] ─► worker S1 ─► on_event
//!   │                     └ full ─► Bus ◄─ SubscriberOverflow{S1}
//!   ├─ S2 not interested ─► skipped
//!   └─ SN ...                                      └ panic ─► Bus ◄─ SubscriberPanicked{SN}
//! ```
//!
//! Guarantees: FIFO per subscriber, none across subscribers. Overflow and
//! panic reports are never themselves reported as overflowing, which keeps a
//! stuck subscriber from feeding a loop through the bus.
//!
//! A panicking subscriber is unwound with `AssertUnwindSafe`; state it shares
//! behind a lock may be left half-updated.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use servicevisor::{Event, ServiceConfig, Subscribe, Supervisor};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, ev: &Event) {
//!         println!("#{} {:?}", ev.seq, ev.kind);
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//! }
//!
//! # async fn wire() -> Result<(), servicevisor::ConfigError> {
//! let sup = Supervisor::builder(ServiceConfig::new("app", "/usr/bin/app"))
//!     .with_subscribers(vec![Arc::new(Audit) as Arc<dyn Subscribe>])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Sending side of one subscriber's queue.
struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Per-subscriber queues and workers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates the queues and spawns one worker per subscriber.
    ///
    /// Must be called inside a Tokio runtime. Workers run until the set is
    /// dropped or [`shutdown`](Self::shutdown) is awaited.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers): (Vec<Lane>, Vec<JoinHandle<()>>) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let worker = tokio::spawn(run_worker(Arc::clone(&sub), rx, bus.clone()));
                (Lane { sub, tx }, worker)
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Queues `event` for every interested subscriber. Never waits.
    pub fn emit(&self, event: &Event) {
        let mut shared: Option<Arc<Event>> = None;
        let reportable = !matches!(
            event.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        );

        for lane in &self.lanes {
            if !lane.sub.interested(event.kind) {
                continue;
            }
            let ev = shared.get_or_insert_with(|| Arc::new(event.clone()));
            let reason = match lane.tx.try_send(Arc::clone(ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if reportable {
                self.bus
                    .publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Number of subscribers in the set.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Whether the set has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        if let Err(panic) = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await {
            let info = panic_message(panic.as_ref());
            tracing::error!(subscriber = sub.name(), panic = %info, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}
