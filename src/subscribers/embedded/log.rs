//! # LogWriter: events as `tracing` records
//!
//! Maps every incoming [`Event`] to one `tracing` record at a level matching
//! its severity. Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`)
//! to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  servicevisor::subscribers: child spawned service="demo" pid=4242 generation=1
//! WARN  servicevisor::subscribers: child exited unexpectedly service="demo" pid=4242 exit_code=Some(3)
//! INFO  servicevisor::subscribers: failure action scheduled service="demo" action="restart" delay_ms=1000 failures=1
//! WARN  servicevisor::subscribers: stop timeout hit service="demo" pid=4243 timeout_ms=15000
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let path = e.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default();
        let stream = e.stream.map(|s| s.to_string()).unwrap_or_default();

        match e.kind {
            EventKind::ShutdownRequested => info!(target: "servicevisor::subscribers", "shutdown requested"),
            EventKind::StartRequested => {
                info!(target: "servicevisor::subscribers", service, "start requested")
            }
            EventKind::ChildSpawned => info!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                generation = e.generation,
                "child spawned"
            ),
            EventKind::SpawnFailed => {
                error!(target: "servicevisor::subscribers", service, reason, "spawn failed")
            }
            EventKind::StopRequested => info!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                reason,
                "stop requested"
            ),
            EventKind::GracefulStopSent => debug!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                reason,
                "graceful stop sent"
            ),
            EventKind::Checkpoint => debug!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                checkpoint = e.checkpoint,
                wait_hint_ms = e.timeout_ms,
                "stop pending"
            ),
            EventKind::StopTimeoutHit => warn!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                timeout_ms = e.timeout_ms,
                "stop timeout hit"
            ),
            EventKind::ForcedKill => warn!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                reason,
                "process tree killed"
            ),
            EventKind::ChildStopped => info!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                exit_code = e.exit_code,
                "child stopped"
            ),
            EventKind::ChildExited => warn!(
                target: "servicevisor::subscribers",
                service,
                pid = e.pid,
                exit_code = e.exit_code,
                "child exited unexpectedly"
            ),
            EventKind::RestartRequested => {
                info!(target: "servicevisor::subscribers", service, "restart requested")
            }
            EventKind::FailureActionScheduled => info!(
                target: "servicevisor::subscribers",
                service,
                action = %e.action.map(|a| a.to_string()).unwrap_or_default(),
                delay_ms = e.delay_ms,
                failures = e.failures,
                "failure action scheduled"
            ),
            EventKind::PendingActionCancelled => info!(
                target: "servicevisor::subscribers",
                service,
                action = %e.action.map(|a| a.to_string()).unwrap_or_default(),
                "pending failure action cancelled"
            ),
            EventKind::RebootRequested => error!(
                target: "servicevisor::subscribers",
                service,
                failures = e.failures,
                "reboot requested"
            ),
            EventKind::LogRotated => debug!(
                target: "servicevisor::subscribers",
                service,
                %stream,
                %path,
                "log rotated"
            ),
            EventKind::LogArchived => info!(
                target: "servicevisor::subscribers",
                service,
                %stream,
                %path,
                reason,
                "logs archived"
            ),
            EventKind::LogWriteFailed => warn!(
                target: "servicevisor::subscribers",
                service,
                %stream,
                %path,
                reason,
                "log write failed"
            ),
            EventKind::SubscriberOverflow => warn!(
                target: "servicevisor::subscribers",
                subscriber = service,
                reason,
                "subscriber overflow"
            ),
            EventKind::SubscriberPanicked => error!(
                target: "servicevisor::subscribers",
                subscriber = service,
                reason,
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
