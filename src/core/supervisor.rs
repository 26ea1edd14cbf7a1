//! # Supervisor: the public handle of one supervised service.
//!
//! The [`Supervisor`] owns the event bus, hands the [`SubscriberSet`] to the
//! bus listener, and talks
//! to the control loop through a command queue. All lifecycle decisions are
//! made by the loop; the handle only sends requests and reads the published
//! [`Status`].
//!
//! ## High-level architecture
//! ```text
//! Supervisor::builder(cfg).with_subscribers(..).build()
//!   ├─► SubscriberSet (one worker + bounded queue per subscriber)
//!   ├─► listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   └─► ControlLoop::run(runtime_token)
//!
//! start()/stop()/restart()/shutdown()
//!   └─► mpsc Command ─► ControlLoop ─► oneshot reply
//!
//! Event flow:
//!   ControlLoop / drains / stop escalation ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                                      ┌─────────┬─────────┐
//!                                                                      ▼         ▼         ▼
//!                                                               [queue S1] [queue S2] ... [queue SN]
//!
//! Status flow:
//!   ControlLoop ── watch::Sender<Status> ──► state() / status() / checkpoint() / watch_status()
//!
//! Shutdown path:
//!   shutdown() ─► Command::Shutdown ─► stop child ─► loop exits
//!             └─► runtime_token.cancel() ─► listener forwards remaining events
//!                 ─► SubscriberSet::shutdown (workers empty their queues) ─► drained
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use servicevisor::{FailureAction, ServiceConfig, Supervisor};
//! #[cfg(feature = "logging")]
//! use servicevisor::LogWriter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ServiceConfig::new("ticker", "/bin/sh")
//!         .with_arguments(["-c", "while true; do date; sleep 1; done"])
//!         .with_stop_timeout(Duration::from_secs(5))
//!         .with_failure_actions(vec![FailureAction::restart(Duration::from_secs(1))]);
//!
//!     let mut subs: Vec<Arc<dyn servicevisor::Subscribe>> = Vec::new();
//!     #[cfg(feature = "logging")]
//!     subs.push(Arc::new(LogWriter::new()));
//!
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build()?;
//!     sup.start().await?;
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     let outcome = sup.shutdown().await?;
//!     println!("stopped: {outcome:?}");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ServiceConfig,
    error::SupervisorError,
    events::{Bus, Event},
    subscribers::SubscriberSet,
};

use super::{
    builder::SupervisorBuilder,
    control::Command,
    state::{ServiceState, Status, StopOutcome},
};

/// How long shutdown waits for subscribers to process their queued events.
const SUBSCRIBER_DRAIN: Duration = Duration::from_secs(5);

/// Handle to one supervised service.
pub struct Supervisor {
    cfg: Arc<ServiceConfig>,
    bus: Bus,
    subscriber_count: usize,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<Status>,
    runtime_token: CancellationToken,
    finished: CancellationToken,
    drained: CancellationToken,
}

impl Supervisor {
    /// Starts building a supervisor for `cfg`.
    pub fn builder(cfg: ServiceConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: Arc<ServiceConfig>,
        bus: Bus,
        subscriber_count: usize,
        commands: mpsc::Sender<Command>,
        status: watch::Receiver<Status>,
        runtime_token: CancellationToken,
        finished: CancellationToken,
        drained: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            subscriber_count,
            commands,
            status,
            runtime_token,
            finished,
            drained,
        }
    }

    /// Spawns the child. Fails with [`SupervisorError::InvalidState`] if one is already running.
    ///
    /// Also cancels a pending failure action.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Stops the child and its descendants, escalating to a forced kill after `stop_timeout`.
    ///
    /// Also cancels a pending failure action. Returns [`StopOutcome::AlreadyStopped`]
    /// when there is no child.
    pub async fn stop(&self, reason: impl Into<Arc<str>>) -> Result<StopOutcome, SupervisorError> {
        let reason = reason.into();
        self.request(|reply| Command::Stop { reason, reply }).await?
    }

    /// Stops (if running) and starts again, bypassing the failure actions.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Restart { reply }).await?
    }

    /// Stops the child and terminates the control loop.
    ///
    /// Returns once subscribers have processed every event published before
    /// the loop ended (bounded by a grace period). Later lifecycle calls fail
    /// with [`SupervisorError::Closed`]. Calling it twice returns
    /// [`StopOutcome::AlreadyStopped`].
    pub async fn shutdown(&self) -> Result<StopOutcome, SupervisorError> {
        let outcome = match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(outcome) => outcome,
            Err(SupervisorError::Closed) => StopOutcome::AlreadyStopped,
            Err(e) => return Err(e),
        };
        self.runtime_token.cancel();
        self.finished.cancelled().await;
        self.drained.cancelled().await;
        Ok(outcome)
    }

    /// Completes once the control loop has terminated.
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.status.borrow().state
    }

    /// Snapshot of the whole status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Checkpoint counter of the stop in progress (zero otherwise).
    pub fn checkpoint(&self) -> u32 {
        self.status.borrow().checkpoint
    }

    /// Pid of the live child.
    pub fn pid(&self) -> Option<u32> {
        self.status.borrow().pid
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Receiver of the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The configuration this supervisor runs with.
    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Once the control loop has finished, already published events are
    /// forwarded, the set is shut down and `drained` is cancelled.
    pub(super) fn spawn_listener(
        bus: &Bus,
        set: SubscriberSet,
        finished: CancellationToken,
        drained: CancellationToken,
    ) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = finished.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
            if tokio::time::timeout(SUBSCRIBER_DRAIN, set.shutdown()).await.is_err() {
                tracing::warn!(grace = ?SUBSCRIBER_DRAIN, "subscribers still busy at shutdown");
            }
            drained.cancel();
        });
    }
}
