//! # Stop escalation.
//!
//! Stops the child and every process it spawned, gracefully first, by force
//! once `stop_timeout` has elapsed.
//!
//! ```text
//! snapshot tree (root + descendants)
//!   │
//!   ├─ phase 1 ─► request ─► wait (phase members gone | deadline)
//!   ├─ phase 2 ─► request ─► wait (everything gone | deadline)
//!   │              ▲ phases: [root, descendants] if stop_parent_first
//!   │              │         [descendants, root] otherwise
//!   │              └─ Checkpoint every checkpoint interval while waiting
//!   │
//!   └─ deadline hit ─► StopTimeoutHit ─► SIGKILL (re-scanned tree ∪ snapshot, process group)
//!                                         └─► wait for the monitor's exit report
//! ```
//!
//! The request is SIGTERM, except for the root when a stop command is
//! configured: the command runs instead and SIGTERM is the fallback when it
//! cannot be spawned. The deadline is shared by both phases. The root is considered gone only
//! once the monitor has reaped it and its pipes are closed; descendants are
//! polled through process-table snapshots (zombies count as gone).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::config::ServiceConfig;
use crate::events::{Bus, Event, EventKind};
use crate::process::{signal, spawn_stop_command, ProcessTable};

use super::monitor::ExitInfo;
use super::state::{Status, StopOutcome};

/// Interval between descendant liveness polls.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Parameters of one stop, read from the configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopPlan {
    pub(crate) pid: u32,
    pub(crate) timeout: Duration,
    pub(crate) parent_first: bool,
    pub(crate) checkpoint_interval: Duration,
    pub(crate) wait_hint: Duration,
}

/// Where a stop reports progress, and the stop command it may run.
pub(crate) struct StopContext<'a> {
    pub(crate) cfg: &'a ServiceConfig,
    pub(crate) service: &'a Arc<str>,
    pub(crate) bus: &'a Bus,
    pub(crate) status: &'a watch::Sender<Status>,
}

impl StopContext<'_> {
    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_service(Arc::clone(self.service)));
    }

    fn checkpoint(&self, pid: u32, wait_hint: Duration) {
        let mut checkpoint = 0;
        self.status.send_modify(|s| {
            s.checkpoint = s.checkpoint.saturating_add(1);
            s.wait_hint = wait_hint;
            checkpoint = s.checkpoint;
        });
        self.publish(
            Event::new(EventKind::Checkpoint)
                .with_pid(pid)
                .with_checkpoint(checkpoint)
                .with_timeout(wait_hint),
        );
    }
}

/// Runs the escalation for `plan.pid`. Returns once the monitor has reported the exit.
pub(crate) async fn run(
    plan: StopPlan,
    exit: &mut watch::Receiver<Option<ExitInfo>>,
    ctx: &StopContext<'_>,
) -> StopOutcome {
    let deadline = Instant::now() + plan.timeout;
    if exit.borrow().is_some() {
        return StopOutcome::Graceful;
    }

    let snapshot = descendants_of(plan.pid).await;
    let root = vec![plan.pid];
    let phases = if plan.parent_first {
        [root, snapshot.clone()]
    } else {
        [snapshot.clone(), root]
    };

    let mut ticks = interval_at(
        Instant::now() + plan.checkpoint_interval,
        plan.checkpoint_interval,
    );
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Held until the stop completes; dropping it kills a still-running command.
    let mut stop_command: Option<Child> = None;
    let mut remaining: BTreeSet<u32> = BTreeSet::new();
    let mut graceful = true;
    for phase in phases {
        let signalled = phase
            .iter()
            .filter(|&&pid| {
                if pid == plan.pid {
                    request_root_stop(pid, ctx, &mut stop_command)
                } else {
                    terminate(pid, ctx)
                }
            })
            .count();
        if signalled > 0 {
            ctx.publish(
                Event::new(EventKind::GracefulStopSent)
                    .with_pid(plan.pid)
                    .with_reason(format!("processes={signalled}")),
            );
        }

        let include_root = phase.contains(&plan.pid);
        remaining.extend(phase.iter().copied().filter(|&p| p != plan.pid));
        if !wait_gone(&plan, include_root, &mut remaining, exit, deadline, &mut ticks, ctx).await {
            graceful = false;
            break;
        }
    }

    if graceful {
        return StopOutcome::Graceful;
    }

    tracing::warn!(service = %ctx.service, pid = plan.pid, timeout = ?plan.timeout, "stop timeout hit; killing process tree");
    ctx.publish(
        Event::new(EventKind::StopTimeoutHit)
            .with_pid(plan.pid)
            .with_timeout(plan.timeout),
    );
    kill_tree(plan.pid, &snapshot, ctx).await;

    loop {
        if exit.borrow().is_some() {
            break;
        }
        tokio::select! {
            changed = exit.changed() => if changed.is_err() { break },
            _ = ticks.tick() => ctx.checkpoint(plan.pid, plan.wait_hint),
        }
    }
    StopOutcome::Killed
}

fn terminate(pid: u32, ctx: &StopContext<'_>) -> bool {
    match signal::terminate(pid) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(service = %ctx.service, pid, error = %e, "graceful stop request failed");
            false
        }
    }
}

/// Runs the stop command when one is configured, signals the root otherwise.
fn request_root_stop(pid: u32, ctx: &StopContext<'_>, held: &mut Option<Child>) -> bool {
    match spawn_stop_command(ctx.cfg) {
        None => terminate(pid, ctx),
        Some(Ok(child)) => {
            tracing::info!(service = %ctx.service, pid, stop_pid = ?child.id(), "stop command started");
            *held = Some(child);
            true
        }
        Some(Err(e)) => {
            tracing::warn!(service = %ctx.service, pid, error = %e, "stop command failed to start; signalling instead");
            terminate(pid, ctx)
        }
    }
}

/// Waits until the tracked processes are gone. Returns `false` on deadline.
async fn wait_gone(
    plan: &StopPlan,
    include_root: bool,
    remaining: &mut BTreeSet<u32>,
    exit: &mut watch::Receiver<Option<ExitInfo>>,
    deadline: Instant,
    ticks: &mut tokio::time::Interval,
    ctx: &StopContext<'_>,
) -> bool {
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut root_reported = false;
    loop {
        let root_gone = !include_root || root_reported || exit.borrow().is_some();
        if root_gone && remaining.is_empty() {
            return true;
        }

        tokio::select! {
            _ = sleep_until(deadline) => return false,
            changed = exit.changed(), if !root_gone => {
                if changed.is_err() {
                    root_reported = true;
                }
            }
            _ = poll.tick(), if !remaining.is_empty() => {
                let table = snapshot_table().await;
                remaining.retain(|&pid| table.as_ref().map_or(false, |t| t.is_alive(pid)));
            }
            _ = ticks.tick() => ctx.checkpoint(plan.pid, plan.wait_hint),
        }
    }
}

/// Force-kills the re-scanned tree, the original snapshot and the child's process group.
async fn kill_tree(pid: u32, snapshot: &[u32], ctx: &StopContext<'_>) {
    let mut victims: BTreeSet<u32> = snapshot.iter().copied().collect();
    if let Some(table) = snapshot_table().await {
        victims.extend(table.descendants(pid));
    }

    let mut killed = 0usize;
    for &victim in &victims {
        match signal::kill(victim) {
            Ok(()) => killed += 1,
            Err(e) => tracing::warn!(service = %ctx.service, pid = victim, error = %e, "kill failed"),
        }
    }
    match signal::kill(pid) {
        Ok(()) => killed += 1,
        Err(e) => tracing::warn!(service = %ctx.service, pid, error = %e, "kill failed"),
    }
    if let Err(e) = signal::kill_group(pid) {
        tracing::debug!(service = %ctx.service, pid, error = %e, "process group kill failed");
    }

    ctx.publish(
        Event::new(EventKind::ForcedKill)
            .with_pid(pid)
            .with_reason(format!("processes={killed}")),
    );
}

async fn descendants_of(pid: u32) -> Vec<u32> {
    snapshot_table()
        .await
        .map(|t| t.descendants(pid))
        .unwrap_or_default()
}

async fn snapshot_table() -> Option<ProcessTable> {
    match tokio::task::spawn_blocking(ProcessTable::snapshot).await {
        Ok(table) => Some(table),
        Err(e) => {
            tracing::warn!(error = %e, "process table snapshot failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(pid: u32) -> StopPlan {
        StopPlan {
            pid,
            timeout: Duration::from_secs(5),
            parent_first: false,
            checkpoint_interval: Duration::from_millis(10),
            wait_hint: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_already_reported_exit_is_graceful() {
        let bus = Bus::new(8);
        let (status, _status_rx) = watch::channel(Status::default());
        let service: Arc<str> = Arc::from("svc");
        let cfg = ServiceConfig::new("svc", "/bin/true");
        let ctx = StopContext {
            cfg: &cfg,
            service: &service,
            bus: &bus,
            status: &status,
        };
        let (_tx, mut exit) = watch::channel(Some(ExitInfo { code: Some(0) }));

        assert_eq!(run(plan(u32::MAX), &mut exit, &ctx).await, StopOutcome::Graceful);
        assert_eq!(status.borrow().checkpoint, 0);
    }

    #[tokio::test]
    async fn test_checkpoints_advance_while_waiting() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (status, mut status_rx) = watch::channel(Status::default());
        let service: Arc<str> = Arc::from("svc");
        let (exit_tx, mut exit) = watch::channel(None);

        // Out-of-range pid: the request is a no-op and the wait lasts until the exit report.
        let reporter = tokio::spawn(async move {
            status_rx.wait_for(|s| s.checkpoint >= 2).await.unwrap();
            exit_tx.send_replace(Some(ExitInfo { code: None }));
        });

        let cfg = ServiceConfig::new("svc", "/bin/true");
        let ctx = StopContext {
            cfg: &cfg,
            service: &service,
            bus: &bus,
            status: &status,
        };
        let outcome = run(plan(u32::MAX), &mut exit, &ctx).await;
        reporter.await.unwrap();

        assert_eq!(outcome, StopOutcome::Graceful);
        assert!(status.borrow().checkpoint >= 2);
        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::GracefulStopSent);
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Checkpoint);
        assert_eq!(ev.checkpoint, Some(1));
        assert_eq!(ev.service.as_deref(), Some("svc"));
    }
}
