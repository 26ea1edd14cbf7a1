//! # servicevisor
//!
//! **Servicevisor** runs an ordinary console program as a supervised service:
//! it spawns and owns one child process, turns service-control requests into
//! lifecycle transitions, applies failure actions when the child dies, and
//! persists the child's stdout/stderr into rotated log files.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ServiceConfig (serde / builder) ──expand()──validate()──┐
//!                                                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (handle)                                              │
//! │  - start / stop / restart / shutdown  ──► mpsc Command            │
//! │  - state / status / checkpoint / pid  ◄── watch<Status>           │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ControlLoop (single owner of lifecycle state)                    │
//! │  - FailureScheduler (capped-index replay, reset window)           │
//! │  - pending failure action deadline                                │
//! │  - stop escalation: SIGTERM tree ─► checkpoints ─► SIGKILL tree   │
//! └──────┬──────────────────────────────────────────────┬─────────────┘
//!        ▼ spawn                                         ▲ Exited{generation}
//!     ┌──────────┐  stdout ──► drain ──► StreamSink ──┐  │
//!     │  child   │  stderr ──► drain ──► StreamSink ──┼──┤ monitor (reap + EOF)
//!     └──────────┘                RotationPolicy ◄────┘  │
//!                                 ArchiveJob (zip, blocking pool)
//!
//! Every component ── publish(Event) ──► Bus ──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ### Lifecycle
//! ```text
//! Stopped ──start──► Starting ──spawned──► Running
//!    ▲                                       │
//!    │          ┌──── stop / shutdown ───────┤
//!    │          ▼                            │ unexpected exit (after pipes closed)
//!    ├──── Stopping ◄── restart (Restarting) │
//!    │                                       ▼
//!    └──────────── Stopped + FailureScheduler::decide(now)
//!                     ├─ None    ─► stay stopped
//!                     ├─ Restart ─► start() after delay (cancelled by stop/start)
//!                     └─ Reboot  ─► Host::request_reboot after delay
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------|---------------------------------------------|
//! | **Configuration** | Immutable service descriptor with placeholder expansion.   | [`ServiceConfig`], [`LogConfig`]            |
//! | **Supervision**   | Start/stop/restart one child and its process tree.         | [`Supervisor`], [`ServiceState`], [`Host`]  |
//! | **Policies**      | Failure actions and log rotation modes.                     | [`FailureAction`], [`RotationPolicy`]       |
//! | **Logs**          | Rotating per-stream sinks with zip archival.                | [`LogEngine`], [`ArchiveJob`]               |
//! | **Subscriber API**| Hook into lifecycle and log events.                         | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels.                            | [`SupervisorError`], [`ConfigError`]        |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], which renders events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use servicevisor::{FailureAction, RotationPolicy, ServiceConfig, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let env: std::collections::BTreeMap<String, String> = std::env::vars().collect();
//!     let cfg = ServiceConfig::new("worker", "%BASE%/bin/worker")
//!         .with_working_directory("/srv/worker")
//!         .with_base_environment(env.clone())
//!         .with_log_directory("%BASE%/logs")
//!         .with_policy(RotationPolicy::roll_by_size())
//!         .with_failure_actions(vec![
//!             FailureAction::restart(Duration::from_secs(1)),
//!             FailureAction::restart(Duration::from_secs(10)),
//!         ])
//!         .expand(&env);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn servicevisor::Subscribe>> = vec![Arc::new(servicevisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn servicevisor::Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build()?;
//!     let outcome = servicevisor::bridge::run_until_signal(&sup).await?;
//!     println!("service stopped: {outcome:?}");
//!     Ok(())
//! }
//! ```
pub mod bridge;
mod config;
mod core;
mod error;
mod events;
mod logs;
mod policies;
mod process;
mod subscribers;

// ---- Public re-exports ----

pub use config::duration::parse_duration;
pub use config::{
    expand_placeholders, LogConfig, ProcessPriority, ServiceConfig, StartMode,
    DEFAULT_RESET_FAILURE_AFTER, DEFAULT_SLEEP_TIME, DEFAULT_STOP_TIMEOUT, DEFAULT_WAIT_HINT,
};
pub use core::{Host, NoopHost, ServiceState, Status, StopOutcome, Supervisor, SupervisorBuilder};
pub use error::{ConfigError, FormatError, FormatKind, LogError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use logs::{ArchiveJob, ArchiveOutcome, LogEngine, Stream};
pub use policies::{
    parse_time_of_day, FailureAction, FailureActionKind, FailureScheduler, RotationPolicy,
    DEFAULT_DATE_PATTERN, DEFAULT_FILES_TO_KEEP, DEFAULT_SIZE_THRESHOLD, DEFAULT_ZIP_DATE_FORMAT,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a built-in subscriber that renders events through `tracing`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
