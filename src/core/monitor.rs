//! # Child monitor task.
//!
//! Owns the [`Child`] of one spawn generation. It reaps the process, then
//! waits for both drain tasks to hit EOF (bounded by [`DRAIN_GRACE`]), and
//! only then reports the exit:
//!
//! ```text
//! child.wait() ──► drains joined (≤ DRAIN_GRACE, then aborted)
//!                      ├─► exit watch  = Some(ExitInfo)   (stop escalation waits on this)
//!                      └─► exits queue ← Exited { generation }   (control loop)
//! ```
//!
//! A descendant that inherited the pipes can keep them open after the child
//! died; the grace bound keeps such a process from delaying exit handling.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Upper bound on waiting for pipe closure after the child was reaped.
pub(crate) const DRAIN_GRACE: Duration = Duration::from_secs(3);

/// How the child ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ExitInfo {
    /// Exit code; `None` when terminated by a signal or when reaping failed.
    pub(crate) code: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Exit notification for the control loop.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Exited {
    pub(crate) generation: u64,
    pub(crate) pid: u32,
    pub(crate) exit: ExitInfo,
}

pub(crate) async fn monitor(
    mut child: Child,
    pid: u32,
    generation: u64,
    drains: [JoinHandle<()>; 2],
    exit_tx: watch::Sender<Option<ExitInfo>>,
    exits: mpsc::UnboundedSender<Exited>,
) {
    let exit = match child.wait().await {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            tracing::warn!(pid, error = %e, "failed to reap child");
            ExitInfo { code: None }
        }
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    for mut drain in drains {
        if timeout_at(deadline, &mut drain).await.is_err() {
            tracing::debug!(pid, "output pipe still open after exit; abandoning drain");
            drain.abort();
        }
    }

    exit_tx.send_replace(Some(exit));
    let _ = exits.send(Exited {
        generation,
        pid,
        exit,
    });
}
