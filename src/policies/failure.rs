//! # Failure actions for unexpected child terminations.
//!
//! A service descriptor carries an ordered list of [`FailureAction`]s. The
//! [`FailureScheduler`] replays that list with a capped index:
//!
//! ```text
//! actions = [Restart 1s, Restart 10s, Reboot 1min]
//!
//! failure #1 ─► actions[0]  Restart after 1s
//! failure #2 ─► actions[1]  Restart after 10s
//! failure #3 ─► actions[2]  Reboot after 1min
//! failure #4 ─► actions[2]  (last entry repeats)
//!   ...
//! quiet for longer than reset_after ─► counter = 0, next failure uses actions[0]
//! ```
//!
//! Delays are used exactly as configured; the scheduler adds no backoff of its own.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::duration;

/// What to do after an unexpected termination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureActionKind {
    /// Leave the service stopped.
    None,
    /// Start the child again.
    Restart,
    /// Ask the host to reboot the machine.
    Reboot,
}

impl fmt::Display for FailureActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureActionKind::None => "none",
            FailureActionKind::Restart => "restart",
            FailureActionKind::Reboot => "reboot",
        })
    }
}

/// One entry of the failure-action list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct FailureAction {
    /// Action to take.
    #[serde(rename = "action")]
    pub kind: FailureActionKind,
    /// Delay before the action is taken.
    #[serde(default, deserialize_with = "duration::deserialize")]
    pub delay: Duration,
}

impl FailureAction {
    /// `{None, 0}`: the implicit action of an empty list.
    pub const NONE: FailureAction = FailureAction {
        kind: FailureActionKind::None,
        delay: Duration::ZERO,
    };

    /// Restart after `delay`.
    pub fn restart(delay: Duration) -> Self {
        Self {
            kind: FailureActionKind::Restart,
            delay,
        }
    }

    /// Reboot the host after `delay`.
    pub fn reboot(delay: Duration) -> Self {
        Self {
            kind: FailureActionKind::Reboot,
            delay,
        }
    }
}

/// Stateful failure-action selector.
///
/// ### Rules
/// - The failure count only changes inside [`decide`](Self::decide).
/// - The count resets when the time since the previous failure **exceeds** `reset_after`.
/// - Index is `min(count - 1, len - 1)`; an empty list yields [`FailureAction::NONE`].
#[derive(Clone, Debug)]
pub struct FailureScheduler {
    actions: Vec<FailureAction>,
    reset_after: Duration,
    count: u32,
    last_failure: Option<Instant>,
}

impl FailureScheduler {
    /// Creates a scheduler with a zero failure count.
    pub fn new(actions: Vec<FailureAction>, reset_after: Duration) -> Self {
        Self {
            actions,
            reset_after,
            count: 0,
            last_failure: None,
        }
    }

    /// Records an unexpected termination observed at `now` and returns the action to take.
    pub fn decide(&mut self, now: Instant) -> FailureAction {
        if let Some(last) = self.last_failure {
            if now.saturating_duration_since(last) > self.reset_after {
                self.count = 0;
            }
        }

        self.count = self.count.saturating_add(1);
        self.last_failure = Some(now);

        let Some(last_index) = self.actions.len().checked_sub(1) else {
            return FailureAction::NONE;
        };
        let index = (self.count as usize - 1).min(last_index);
        self.actions[index]
    }

    /// Number of consecutive failures inside the current reset window.
    pub fn failure_count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_capped_index_and_reset_window() {
        let mut sched = FailureScheduler::new(
            vec![FailureAction::restart(secs(1)), FailureAction::reboot(secs(5))],
            secs(10),
        );
        let t0 = Instant::now();

        assert_eq!(sched.decide(t0), FailureAction::restart(secs(1)));
        assert_eq!(sched.decide(t0 + secs(1)), FailureAction::reboot(secs(5)));
        assert_eq!(sched.decide(t0 + secs(2)), FailureAction::reboot(secs(5)));
        assert_eq!(sched.failure_count(), 3);

        // 11s of stability after the third failure.
        assert_eq!(sched.decide(t0 + secs(13)), FailureAction::restart(secs(1)));
        assert_eq!(sched.failure_count(), 1);
    }

    #[test]
    fn test_reset_requires_strictly_longer_quiet_period() {
        let mut sched = FailureScheduler::new(
            vec![FailureAction::restart(secs(1)), FailureAction::reboot(secs(5))],
            secs(10),
        );
        let t0 = Instant::now();
        sched.decide(t0);
        assert_eq!(sched.decide(t0 + secs(10)), FailureAction::reboot(secs(5)));
    }

    #[test]
    fn test_empty_list_yields_none() {
        let mut sched = FailureScheduler::new(Vec::new(), secs(10));
        let t0 = Instant::now();
        assert_eq!(sched.decide(t0), FailureAction::NONE);
        assert_eq!(sched.decide(t0), FailureAction::NONE);
        assert_eq!(sched.failure_count(), 2);
    }

    #[test]
    fn test_last_entry_repeats() {
        let mut sched = FailureScheduler::new(vec![FailureAction::restart(Duration::ZERO)], secs(60));
        let t0 = Instant::now();
        for i in 0..20 {
            let action = sched.decide(t0 + Duration::from_millis(i * 10));
            assert_eq!(action.kind, FailureActionKind::Restart);
            assert_eq!(action.delay, Duration::ZERO);
        }
        assert_eq!(sched.failure_count(), 20);
    }

    #[test]
    fn test_deserialize_failure_action() {
        let action: FailureAction =
            serde_json::from_str(r#"{ "action": "restart", "delay": "10 sec" }"#).unwrap();
        assert_eq!(action, FailureAction::restart(secs(10)));

        let action: FailureAction = serde_json::from_str(r#"{ "action": "none" }"#).unwrap();
        assert_eq!(action, FailureAction::NONE);
    }
}
