//! # Runtime events emitted by the supervisor and the log engine.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: child start, stop escalation, exit
//! - **Failure events**: unexpected exits and the action taken for them
//! - **Log events**: rotation, archival, write failures
//! - **Subscriber events**: overflow and panic of user subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service id,
//! pid, exit code, delays and file paths.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use servicevisor::{Event, EventKind, FailureActionKind};
//!
//! let ev = Event::new(EventKind::FailureActionScheduled)
//!     .with_service("demo")
//!     .with_failures(2)
//!     .with_action(FailureActionKind::Restart)
//!     .with_delay(Duration::from_secs(10));
//!
//! assert_eq!(ev.kind, EventKind::FailureActionScheduled);
//! assert_eq!(ev.service.as_deref(), Some("demo"));
//! assert_eq!(ev.delay_ms, Some(10_000));
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::logs::Stream;
use crate::policies::FailureActionKind;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed or `Supervisor::shutdown`).
    ShutdownRequested,

    // === Child lifecycle events ===
    /// `start` accepted by the control loop.
    ///
    /// Sets:
    /// - `service`
    StartRequested,

    /// Child spawned and its pipes handed to the log engine.
    ///
    /// Sets:
    /// - `service`, `pid`, `generation`
    ChildSpawned,

    /// The executable could not be spawned, or its log sinks could not be opened.
    ///
    /// Sets:
    /// - `service`
    /// - `reason`: error message
    SpawnFailed,

    /// `stop` accepted by the control loop.
    ///
    /// Sets:
    /// - `service`, `pid`
    /// - `reason`: caller-supplied reason
    StopRequested,

    /// Graceful termination request delivered to the process tree.
    ///
    /// Sets:
    /// - `service`, `pid`
    /// - `reason`: number of processes signalled
    GracefulStopSent,

    /// Stop still in progress; emitted every checkpoint interval.
    ///
    /// Sets:
    /// - `service`, `pid`, `checkpoint`
    /// - `timeout_ms`: wait hint reported to the service manager
    Checkpoint,

    /// Graceful wait exceeded `stop_timeout`.
    ///
    /// Sets:
    /// - `service`, `pid`
    /// - `timeout_ms`: configured stop timeout
    StopTimeoutHit,

    /// Remaining processes of the tree were force-killed.
    ///
    /// Sets:
    /// - `service`, `pid`
    /// - `reason`: number of processes killed
    ForcedKill,

    /// Child reaped after a requested stop.
    ///
    /// Sets:
    /// - `service`, `pid`, `exit_code` (absent when killed by a signal)
    ChildStopped,

    /// Child exited on its own while running.
    ///
    /// Sets:
    /// - `service`, `pid`, `exit_code` (absent when killed by a signal), `generation`
    ChildExited,

    /// Operator restart accepted (stop, then start; failure actions bypassed).
    ///
    /// Sets:
    /// - `service`
    RestartRequested,

    // === Failure events ===
    /// Failure action selected for an unexpected exit.
    ///
    /// Sets:
    /// - `service`, `failures`, `action`, `delay_ms`
    FailureActionScheduled,

    /// A pending failure action was dropped by `stop` or superseded by `start`.
    ///
    /// Sets:
    /// - `service`, `action`
    PendingActionCancelled,

    /// Reboot requested from the host.
    ///
    /// Sets:
    /// - `service`, `failures`
    RebootRequested,

    // === Log events ===
    /// A live log file was rotated.
    ///
    /// Sets:
    /// - `service`, `stream`
    /// - `path`: the rotated (renamed) file
    LogRotated,

    /// Old log files were compressed into an archive.
    ///
    /// Sets:
    /// - `service`, `stream`
    /// - `path`: the archive
    /// - `reason`: number of files added
    LogArchived,

    /// Writing, rotating or archiving a log file failed; output may be lost.
    ///
    /// Sets:
    /// - `service`, `stream`, `path`
    /// - `reason`: I/O error
    LogWriteFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service id (or subscriber name for subscriber events).
    pub service: Option<Arc<str>>,
    /// Child pid.
    pub pid: Option<u32>,
    /// Spawn generation of the child.
    pub generation: Option<u64>,
    /// Exit code of the child.
    pub exit_code: Option<i32>,
    /// Consecutive unexpected exits inside the reset window.
    pub failures: Option<u32>,
    /// Delay before a failure action in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Timeout or wait hint in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Checkpoint counter of a pending stop.
    pub checkpoint: Option<u32>,
    /// Failure action.
    pub action: Option<FailureActionKind>,
    /// Output stream of a log event.
    pub stream: Option<Stream>,
    /// File of a log event.
    pub path: Option<Arc<Path>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            pid: None,
            generation: None,
            exit_code: None,
            failures: None,
            delay_ms: None,
            timeout_ms: None,
            checkpoint: None,
            action: None,
            stream: None,
            path: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a service id.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a child pid.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an optional child pid.
    #[inline]
    pub fn with_pid_opt(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches a spawn generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches an exit code (`None` when terminated by a signal).
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attaches a failure count.
    #[inline]
    pub fn with_failures(mut self, n: u32) -> Self {
        self.failures = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a checkpoint counter.
    #[inline]
    pub fn with_checkpoint(mut self, n: u32) -> Self {
        self.checkpoint = Some(n);
        self
    }

    /// Attaches a failure action.
    #[inline]
    pub fn with_action(mut self, action: FailureActionKind) -> Self {
        self.action = Some(action);
        self
    }

    /// Attaches an output stream.
    #[inline]
    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attaches a file path.
    #[inline]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(Arc::from(path.into()));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::StartRequested);
        let b = Event::new(EventKind::StartRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_compact_ms_saturates() {
        let ev = Event::new(EventKind::StopTimeoutHit).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn test_log_event_fields() {
        let ev = Event::new(EventKind::LogRotated)
            .with_stream(Stream::Err)
            .with_path("/var/log/svc.1.err.log");
        assert_eq!(ev.stream, Some(Stream::Err));
        assert_eq!(ev.path.as_deref(), Some(Path::new("/var/log/svc.1.err.log")));
    }
}
