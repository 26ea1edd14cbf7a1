//! # Control loop: the single owner of lifecycle state.
//!
//! Every transition of the supervised child happens inside [`ControlLoop::run`].
//! The loop multiplexes four inputs:
//!
//! ```text
//!             ┌─────────────── Supervisor handle (mpsc Command + oneshot reply)
//!             │  ┌──────────── monitor tasks (Exited, one per spawn generation)
//!             │  │  ┌───────── pending failure action deadline
//!             │  │  │  ┌────── runtime CancellationToken
//!             ▼  ▼  ▼  ▼
//!          ControlLoop::run ── select! ──► start_child / stop_child / on_exit / fire_pending
//!                                   │
//!                                   ├─► watch::Sender<Status>   (state, pid, checkpoints)
//!                                   └─► Bus                     (lifecycle events)
//! ```
//!
//! Commands are handled one at a time: a `stop` that arrives while another stop
//! is in flight is answered once the first one has completed.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::logs::{self, LogEngine, Reporter};
use crate::policies::{FailureActionKind, FailureScheduler};
use crate::process::{self, signal};

use super::host::Host;
use super::monitor::{self, ExitInfo, Exited};
use super::state::{ServiceState, Status, StopOutcome};
use super::stop::{self, StopContext, StopPlan};

/// Requests sent by the [`Supervisor`](super::Supervisor) handle.
pub(crate) enum Command {
    Start {
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Stop {
        reason: Arc<str>,
        reply: oneshot::Sender<Result<StopOutcome, SupervisorError>>,
    },
    Restart {
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Shutdown {
        reply: oneshot::Sender<StopOutcome>,
    },
}

/// The child of the current generation.
struct Live {
    pid: u32,
    generation: u64,
    exit: watch::Receiver<Option<ExitInfo>>,
}

/// A failure action waiting for its delay.
struct Pending {
    kind: FailureActionKind,
    at: Instant,
    failures: u32,
}

pub(crate) struct ControlLoop {
    cfg: Arc<ServiceConfig>,
    service: Arc<str>,
    bus: Bus,
    host: Arc<dyn Host>,
    status: watch::Sender<Status>,
    scheduler: FailureScheduler,
    commands: mpsc::Receiver<Command>,
    exits_tx: mpsc::UnboundedSender<Exited>,
    exits_rx: mpsc::UnboundedReceiver<Exited>,
    child: Option<Live>,
    pending: Option<Pending>,
    generation: u64,
}

impl ControlLoop {
    pub(crate) fn new(
        cfg: Arc<ServiceConfig>,
        bus: Bus,
        host: Arc<dyn Host>,
        status: watch::Sender<Status>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            service: Arc::from(cfg.id.as_str()),
            scheduler: FailureScheduler::new(cfg.failure_actions.clone(), cfg.reset_failure_after),
            cfg,
            bus,
            host,
            status,
            commands,
            exits_tx,
            exits_rx,
            child: None,
            pending: None,
            generation: 0,
        }
    }

    /// Runs until shutdown, cancellation, or every handle is dropped.
    /// The child is always stopped before returning.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        loop {
            let pending_at = self.pending.as_ref().map(|p| p.at);
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    self.stop_child("runtime cancelled", ServiceState::Stopping).await;
                    break;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle(cmd).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.stop_child("supervisor dropped", ServiceState::Stopping).await;
                        break;
                    }
                },
                Some(exited) = self.exits_rx.recv() => self.on_exit(exited),
                _ = sleep_until_opt(pending_at) => self.fire_pending().await,
            }
        }
        tracing::debug!(service = %self.service, "control loop finished");
    }

    async fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Start { reply } => {
                let res = self.start_child().await;
                let _ = reply.send(res);
            }
            Command::Stop { reason, reply } => {
                let outcome = self.stop_child(&reason, ServiceState::Stopping).await;
                let _ = reply.send(Ok(outcome));
            }
            Command::Restart { reply } => {
                self.publish(Event::new(EventKind::RestartRequested).with_pid_opt(self.pid()));
                self.stop_child("restart", ServiceState::Restarting).await;
                let res = self.start_child().await;
                let _ = reply.send(res);
            }
            Command::Shutdown { reply } => {
                let outcome = self.stop_child("shutdown", ServiceState::Stopping).await;
                let _ = reply.send(outcome);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_service(Arc::clone(&self.service)));
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.pid)
    }

    fn set_state(&self, state: ServiceState) {
        self.status.send_modify(|s| s.state = state);
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.status.send_modify(|s| s.pending = None);
            self.publish(Event::new(EventKind::PendingActionCancelled).with_action(pending.kind));
        }
    }

    /// Spawns a new generation and wires its drains and monitor.
    async fn start_child(&mut self) -> Result<(), SupervisorError> {
        if self.child.is_some() {
            let state = self.status.borrow().state;
            return Err(SupervisorError::InvalidState { op: "start", state });
        }
        self.cancel_pending();
        self.publish(Event::new(EventKind::StartRequested));
        self.set_state(ServiceState::Starting);

        let spawned = match process::spawn(&self.cfg) {
            Ok(spawned) => spawned,
            Err(source) => {
                tracing::error!(
                    service = %self.service,
                    executable = %self.cfg.executable.display(),
                    error = %source,
                    "failed to launch child"
                );
                self.publish(Event::new(EventKind::SpawnFailed).with_reason(source.to_string()));
                self.set_state(ServiceState::Stopped);
                return Err(SupervisorError::Launch {
                    executable: self.cfg.executable.clone(),
                    source,
                });
            }
        };

        let reporter = Reporter::new(self.bus.clone(), Arc::clone(&self.service));
        let engine = match LogEngine::open_reporting(&self.cfg.resolved_log(), Local::now(), reporter) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(service = %self.service, pid = spawned.pid, error = %e, "failed to open logs; killing child");
                let mut child = spawned.child;
                let _ = signal::kill_group(spawned.pid);
                if let Err(kill) = child.kill().await {
                    tracing::warn!(service = %self.service, pid = spawned.pid, error = %kill, "failed to kill child");
                }
                self.set_state(ServiceState::Stopped);
                return Err(SupervisorError::LogOpen(e));
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let pid = spawned.pid;
        let (out, err) = engine.into_sinks();
        let drains = [
            tokio::spawn(logs::drain(spawned.stdout, out)),
            tokio::spawn(logs::drain(spawned.stderr, err)),
        ];
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(monitor::monitor(
            spawned.child,
            pid,
            generation,
            drains,
            exit_tx,
            self.exits_tx.clone(),
        ));

        self.child = Some(Live {
            pid,
            generation,
            exit: exit_rx,
        });
        self.status.send_modify(|s| {
            s.state = ServiceState::Running;
            s.pid = Some(pid);
            s.generation = generation;
            s.checkpoint = 0;
            s.wait_hint = Duration::ZERO;
        });
        self.publish(
            Event::new(EventKind::ChildSpawned)
                .with_pid(pid)
                .with_generation(generation),
        );
        Ok(())
    }

    /// Stops the current child, reporting `through` while the escalation runs.
    async fn stop_child(&mut self, reason: &str, through: ServiceState) -> StopOutcome {
        self.cancel_pending();
        let Some(mut live) = self.child.take() else {
            return StopOutcome::AlreadyStopped;
        };

        self.publish(
            Event::new(EventKind::StopRequested)
                .with_pid(live.pid)
                .with_generation(live.generation)
                .with_reason(reason.to_owned()),
        );
        let wait_hint = self.cfg.wait_hint;
        self.status.send_modify(|s| {
            s.state = through;
            s.checkpoint = 0;
            s.wait_hint = wait_hint;
        });

        let plan = StopPlan {
            pid: live.pid,
            timeout: self.cfg.stop_timeout,
            parent_first: self.cfg.stop_parent_first,
            checkpoint_interval: self.cfg.checkpoint_interval(),
            wait_hint: self.cfg.wait_hint,
        };
        let ctx = StopContext {
            cfg: &self.cfg,
            service: &self.service,
            bus: &self.bus,
            status: &self.status,
        };
        let outcome = stop::run(plan, &mut live.exit, &ctx).await;

        let code = (*live.exit.borrow()).and_then(|e| e.code);
        self.publish(
            Event::new(EventKind::ChildStopped)
                .with_pid(live.pid)
                .with_generation(live.generation)
                .with_exit_code(code)
                .with_reason(outcome.as_str()),
        );
        self.status.send_modify(|s| {
            s.state = ServiceState::Stopped;
            s.pid = None;
            s.checkpoint = 0;
            s.wait_hint = Duration::ZERO;
        });
        outcome
    }

    /// Handles a monitor report. Exits of stopped or older generations are ignored.
    fn on_exit(&mut self, exited: Exited) {
        if self.child.as_ref().map(|c| c.generation) != Some(exited.generation) {
            return;
        }
        self.child = None;

        self.publish(
            Event::new(EventKind::ChildExited)
                .with_pid(exited.pid)
                .with_generation(exited.generation)
                .with_exit_code(exited.exit.code),
        );

        let action = self.scheduler.decide(std::time::Instant::now());
        let failures = self.scheduler.failure_count();
        let pending = match action.kind {
            FailureActionKind::None => None,
            kind => Some(Pending {
                kind,
                at: Instant::now() + action.delay,
                failures,
            }),
        };

        self.status.send_modify(|s| {
            s.state = ServiceState::Stopped;
            s.pid = None;
            s.failures = failures;
            s.pending = pending.as_ref().map(|p| p.kind);
        });
        self.publish(
            Event::new(EventKind::FailureActionScheduled)
                .with_pid(exited.pid)
                .with_action(action.kind)
                .with_delay(action.delay)
                .with_failures(failures),
        );
        self.pending = pending;
    }

    async fn fire_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.status.send_modify(|s| s.pending = None);

        match pending.kind {
            FailureActionKind::Restart => {
                if let Err(e) = self.start_child().await {
                    tracing::error!(service = %self.service, error = %e, "failure restart did not start the child");
                }
            }
            FailureActionKind::Reboot => {
                let reason = format!("failures={}", pending.failures);
                self.publish(
                    Event::new(EventKind::RebootRequested)
                        .with_failures(pending.failures)
                        .with_reason(reason.clone()),
                );
                self.host.request_reboot(&self.service, &reason).await;
            }
            FailureActionKind::None => {}
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
