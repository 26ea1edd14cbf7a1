#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use servicevisor::{
    Event, EventKind, FailureAction, RotationPolicy, ServiceState, Subscribe, Supervisor,
};

use common::{read_lines, sh, wait_for};

#[derive(Default)]
struct Restarts {
    spawned: AtomicU32,
    exited: AtomicU32,
}

#[async_trait]
impl Subscribe for Restarts {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::ChildSpawned => {
                self.spawned.fetch_add(1, Ordering::SeqCst);
            }
            EventKind::ChildExited => {
                self.exited.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "restarts"
    }
}

fn crashing(dir: &std::path::Path, policy: RotationPolicy) -> servicevisor::ServiceConfig {
    sh("crashy", dir, "echo started; exit 3")
        .with_policy(policy)
        .with_failure_actions(vec![FailureAction::restart(Duration::ZERO)])
        .with_reset_failure_after(Duration::from_secs(60))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_restart_per_crash_with_append() {
    let dir = tempfile::tempdir().unwrap();
    let counter = Arc::new(Restarts::default());
    let sup = Supervisor::builder(crashing(dir.path(), RotationPolicy::Append))
        .with_subscribers(vec![counter.clone() as Arc<dyn Subscribe>])
        .build()
        .unwrap();

    sup.start().await.unwrap();
    let status = wait_for(&sup, |s| s.generation >= 3).await;
    assert!(status.failures >= 2);
    sup.shutdown().await.unwrap();
    assert_eq!(sup.state(), ServiceState::Stopped);

    // Every crashed generation wrote its line; the last one may have been stopped early.
    let generations = sup.status().generation;
    let lines = read_lines(&dir.path().join("crashy.out.log"));
    assert!(lines.len() as u64 >= generations - 1, "{lines:?}");
    assert!(lines.iter().all(|l| l == "started"));

    // shutdown() returns after the subscribers have drained their queues.
    let spawned = counter.spawned.load(Ordering::SeqCst);
    let exited = counter.exited.load(Ordering::SeqCst);
    assert_eq!(u64::from(spawned), generations);
    assert!(exited == spawned || exited + 1 == spawned);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_truncates_on_every_restart() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::builder(crashing(dir.path(), RotationPolicy::Reset))
        .build()
        .unwrap();

    sup.start().await.unwrap();
    wait_for(&sup, |s| s.generation >= 3).await;
    sup.shutdown().await.unwrap();

    let lines = read_lines(&dir.path().join("crashy.out.log"));
    assert!(lines.len() <= 1, "expected at most one line, got {lines:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_size_rotation_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh("chatty", dir.path(), "printf '%0100d\\n' 0; exit 1")
        .with_policy(RotationPolicy::RollBySize {
            size_threshold: 150,
            files_to_keep: 2,
        })
        .with_failure_actions(vec![FailureAction::restart(Duration::ZERO)]);
    let sup = Supervisor::builder(cfg).build().unwrap();

    sup.start().await.unwrap();
    wait_for(&sup, |s| s.generation >= 6).await;
    sup.shutdown().await.unwrap();

    let live = dir.path().join("chatty.out.log");
    assert!(std::fs::metadata(&live).unwrap().len() < 150 + 101);
    assert!(dir.path().join("chatty.1.out.log").exists());
    assert!(dir.path().join("chatty.2.out.log").exists());
    assert!(!dir.path().join("chatty.3.out.log").exists());
}
