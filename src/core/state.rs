//! Lifecycle state and the status snapshot published by the control loop.

use std::fmt;
use std::time::Duration;

use crate::policies::FailureActionKind;

/// Lifecycle state of the supervised child.
///
/// ```text
/// Stopped ──start──► Starting ──spawned──► Running ──stop──► Stopping ──reaped──► Stopped
///                                             │
///                                             ├──restart──► Restarting ──► Starting ...
///                                             └──exit─────► Stopped (failure action may follow)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// No child process.
    #[default]
    Stopped,
    /// Spawn in progress.
    Starting,
    /// Child alive and its output drained.
    Running,
    /// Stop escalation in progress.
    Stopping,
    /// Operator restart in progress (stopping, then starting).
    Restarting,
}

impl ServiceState {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Restarting => "restarting",
        }
    }

    /// Whether a stop is being carried out.
    #[inline]
    pub fn is_pending_stop(&self) -> bool {
        matches!(self, ServiceState::Stopping | ServiceState::Restarting)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the supervisor, as seen by the service-control bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Lifecycle state.
    pub state: ServiceState,
    /// Pid of the live child.
    pub pid: Option<u32>,
    /// Checkpoint counter of the current stop; zero otherwise.
    pub checkpoint: u32,
    /// Time the current stop is still expected to take.
    pub wait_hint: Duration,
    /// Consecutive unexpected exits inside the reset window.
    pub failures: u32,
    /// Spawn generation of the current (or last) child.
    pub generation: u64,
    /// Failure action waiting for its delay to elapse.
    pub pending: Option<FailureActionKind>,
}

/// How a stop request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process tree exited within `stop_timeout`.
    Graceful,
    /// `stop_timeout` elapsed and the tree was force-killed.
    Killed,
    /// There was no child to stop.
    AlreadyStopped,
}

impl StopOutcome {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopOutcome::Graceful => "graceful",
            StopOutcome::Killed => "killed",
            StopOutcome::AlreadyStopped => "already_stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_default() {
        assert_eq!(ServiceState::default(), ServiceState::Stopped);
        assert_eq!(ServiceState::Restarting.to_string(), "restarting");
        assert!(ServiceState::Stopping.is_pending_stop());
        assert!(!ServiceState::Running.is_pending_stop());
        assert_eq!(Status::default().checkpoint, 0);
    }
}
