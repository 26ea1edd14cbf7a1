//! Error types used by the servicevisor runtime.
//!
//! This module defines the error taxonomy:
//!
//! - [`SupervisorError`]: failures of supervisor operations (`start`, `stop`, `restart`).
//! - [`LogError`]: log sink I/O failures; these degrade logging, never supervision.
//! - [`FormatError`]: malformed duration or date pattern in configuration.
//! - [`ConfigError`]: a configuration value that cannot drive a supervisor.
//!
//! Every type provides `as_label` (stable snake_case) for logs/metrics.
//!
//! A child that ignores the graceful stop request is **not** an error: forced
//! termination is a successful stop, reported as [`StopOutcome::Killed`](crate::StopOutcome::Killed).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::ServiceState;

/// # Errors produced by supervisor operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The executable could not be spawned. Fatal to this start attempt; no retry.
    #[error("failed to launch {executable:?}: {source}")]
    Launch {
        /// Executable path as configured.
        executable: PathBuf,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The log sinks could not be opened after the child was spawned.
    /// The child is killed and the start attempt fails.
    #[error("failed to open log sinks: {0}")]
    LogOpen(#[from] LogError),

    /// Operation is not valid in the current lifecycle state.
    #[error("cannot {op} while {state}")]
    InvalidState {
        /// Requested operation.
        op: &'static str,
        /// State observed by the control loop.
        state: ServiceState,
    },

    /// The control loop has terminated (after `shutdown`).
    #[error("supervisor control loop is closed")]
    Closed,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servicevisor::{ServiceState, SupervisorError};
    ///
    /// let err = SupervisorError::InvalidState { op: "start", state: ServiceState::Running };
    /// assert_eq!(err.as_label(), "supervisor_invalid_state");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Launch { .. } => "supervisor_launch",
            SupervisorError::LogOpen(_) => "supervisor_log_open",
            SupervisorError::InvalidState { .. } => "supervisor_invalid_state",
            SupervisorError::Closed => "supervisor_closed",
        }
    }

    /// Indicates a start failure caused by the environment (spawn or log open),
    /// as opposed to a misuse of the lifecycle API.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::Launch { .. } | SupervisorError::LogOpen(_)
        )
    }
}

/// # Log sink I/O failure.
///
/// Raised by [`LogEngine::open`](crate::LogEngine::open). Failures on the write
/// path are reported through `tracing` and the event bus instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LogError {
    /// A log directory or file could not be created, opened or moved.
    #[error("log file {path:?}: {source}")]
    Io {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A date pattern of the rotation policy cannot be formatted.
    #[error(transparent)]
    Pattern(#[from] FormatError),
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LogError::Io { .. } => "log_io",
            LogError::Pattern(_) => "log_pattern",
        }
    }
}

/// What kind of value failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// A textual duration (`"15 sec"`).
    Duration,
    /// A file-name date pattern (`"yyyyMMdd"`).
    DatePattern,
    /// A time of day (`"00:00:00"`).
    TimeOfDay,
}

/// # Malformed configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind:?} value {value:?}")]
pub struct FormatError {
    /// What was being parsed.
    pub kind: FormatKind,
    /// The offending text.
    pub value: String,
}

impl FormatError {
    pub(crate) fn duration(value: &str) -> Self {
        Self {
            kind: FormatKind::Duration,
            value: value.to_string(),
        }
    }

    pub(crate) fn date_pattern(value: &str) -> Self {
        Self {
            kind: FormatKind::DatePattern,
            value: value.to_string(),
        }
    }

    pub(crate) fn time_of_day(value: &str) -> Self {
        Self {
            kind: FormatKind::TimeOfDay,
            value: value.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            FormatKind::Duration => "format_duration",
            FormatKind::DatePattern => "format_date_pattern",
            FormatKind::TimeOfDay => "format_time_of_day",
        }
    }
}

/// # Configuration that cannot drive a supervisor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed to parse.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// No executable was configured.
    #[error("service {id:?} has no executable")]
    MissingExecutable {
        /// Service identifier.
        id: String,
    },

    /// Log settings are inconsistent (e.g. a zero size threshold).
    #[error("invalid log settings: {reason}")]
    InvalidLogSettings {
        /// What is wrong.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Format(e) => e.as_label(),
            ConfigError::MissingExecutable { .. } => "config_missing_executable",
            ConfigError::InvalidLogSettings { .. } => "config_invalid_log_settings",
        }
    }
}
