#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use servicevisor::{ServiceConfig, Status, Supervisor};

/// `/bin/sh -c <script>` with logs and working directory in `dir`.
pub fn sh(id: &str, dir: &Path, script: &str) -> ServiceConfig {
    ServiceConfig::new(id, "/bin/sh")
        .with_arguments(["-c", script])
        .with_working_directory(dir)
        .with_log_directory(dir)
        .with_base_environment(std::env::vars())
        .with_checkpoints(Duration::from_secs(2), Duration::from_millis(100))
}

/// Waits (at most 10s) until the published status satisfies `pred`.
pub async fn wait_for(sup: &Supervisor, pred: impl Fn(&Status) -> bool) -> Status {
    let mut rx = sup.watch_status();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let status = rx.borrow_and_update();
                if pred(&status) {
                    return status.clone();
                }
            }
            rx.changed().await.expect("control loop ended");
        }
    })
    .await
    .expect("status condition not reached in time")
}

/// Whether `pid` is a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .map_or(false, |state| state != 'Z' && state != 'X')
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}
