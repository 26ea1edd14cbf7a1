//! Failure and rotation policies.
//!
//! This module groups the two declarative rule sets a service descriptor carries:
//! **what to do** when the child dies unexpectedly, and **how** its console output
//! is rolled on disk.
//!
//! ## Contents
//! - [`FailureAction`], [`FailureActionKind`] one entry of the failure-action list
//! - [`FailureScheduler`] capped-index replay of that list with a reset window
//! - [`RotationPolicy`] tagged rotation mode with its own parameters
//!
//! ## Quick wiring
//! ```text
//! ServiceConfig { failure_actions, reset_failure_after, log.policy }
//!      ├─► core::control::ControlLoop owns FailureScheduler
//!      │      └─ decide(now) on every unexpected exit
//!      └─► logs::LogEngine::open(log, now)
//!             └─ one StreamSink per stream, rolling per RotationPolicy
//! ```
//!
//! ## Defaults
//! - empty failure-action list → implicit `{None, 0}` (service stays stopped).
//! - `RotationPolicy::Append`.

mod failure;
mod rotation;

pub use failure::{FailureAction, FailureActionKind, FailureScheduler};
pub use rotation::{
    parse_time_of_day, RotationPolicy, DEFAULT_DATE_PATTERN, DEFAULT_FILES_TO_KEEP,
    DEFAULT_SIZE_THRESHOLD, DEFAULT_ZIP_DATE_FORMAT,
};
