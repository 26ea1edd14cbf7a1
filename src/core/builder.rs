use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ServiceConfig,
    error::ConfigError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

use super::{
    control::ControlLoop,
    host::{Host, NoopHost},
    state::Status,
    supervisor::Supervisor,
};

/// Default capacity of the event bus.
const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Queued commands before `start`/`stop` callers wait for the control loop.
const COMMAND_QUEUE: usize = 16;

/// Builder for a [`Supervisor`] with optional subscribers and host hook.
pub struct SupervisorBuilder {
    cfg: ServiceConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    host: Arc<dyn Host>,
    bus_capacity: usize,
}

impl SupervisorBuilder {
    /// Creates a new builder for the given service.
    pub fn new(cfg: ServiceConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            host: Arc::new(NoopHost),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Installs the hook that receives reboot requests.
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = host;
        self
    }

    /// Overrides the event bus capacity (minimum 1).
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Validates the configuration and starts the runtime components:
    /// - event bus and subscriber workers
    /// - the control loop (child stays stopped until [`Supervisor::start`])
    /// - the listener forwarding bus events to subscribers
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Arc<Supervisor>, ConfigError> {
        self.cfg.validate()?;

        let cfg = Arc::new(self.cfg);
        let bus = Bus::new(self.bus_capacity);
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let subscriber_count = subs.len();
        let runtime_token = CancellationToken::new();
        let finished = CancellationToken::new();
        let drained = CancellationToken::new();

        let (status_tx, status_rx) = watch::channel(Status::default());
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);

        // Subscribe before the loop can publish anything.
        Supervisor::spawn_listener(&bus, subs, finished.clone(), drained.clone());

        let control = ControlLoop::new(Arc::clone(&cfg), bus.clone(), self.host, status_tx, cmd_rx);
        let token = runtime_token.clone();
        let done = finished.clone();
        tokio::spawn(async move {
            control.run(token).await;
            done.cancel();
        });

        tracing::debug!(service = %cfg.id, subscribers = subscriber_count, "supervisor built");
        Ok(Arc::new(Supervisor::new_internal(
            cfg,
            bus,
            subscriber_count,
            cmd_tx,
            status_rx,
            runtime_token,
            finished,
            drained,
        )))
    }
}
