//! Child process creation.

use std::io;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::config::{ProcessPriority, ServiceConfig};

/// A freshly spawned child with its output pipes.
pub(crate) struct Spawned {
    pub(crate) child: Child,
    pub(crate) pid: u32,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: ChildStderr,
}

/// Spawns the configured executable with its launch arguments.
///
/// The environment is exactly [`ServiceConfig::child_environment`]; stdin is
/// null and both output streams are piped. On Unix the child leads its own
/// process group and gets the configured priority.
pub(crate) fn spawn(cfg: &ServiceConfig) -> io::Result<Spawned> {
    let mut cmd = Command::new(&cfg.executable);
    cmd.args(cfg.launch_arguments())
        .current_dir(&cfg.working_directory)
        .env_clear()
        .envs(cfg.child_environment())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child exited before its pid was read"))?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(io::Error::new(io::ErrorKind::Other, "child pipes unavailable"));
    };
    apply_priority(&cfg.id, pid, cfg.priority);

    Ok(Spawned {
        child,
        pid,
        stdout,
        stderr,
    })
}

/// Spawns the configured stop command, if any.
///
/// Runs in the service's working directory with the child's environment and
/// no console; the caller keeps the handle alive until the stop completes.
pub(crate) fn spawn_stop_command(cfg: &ServiceConfig) -> Option<io::Result<Child>> {
    let (exe, args) = cfg.stop_command()?;
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .current_dir(&cfg.working_directory)
        .env_clear()
        .envs(cfg.child_environment())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    Some(cmd.spawn())
}

/// Best effort: raising priority needs privileges and failures only log.
#[cfg(unix)]
fn apply_priority(service: &str, pid: u32, priority: ProcessPriority) {
    use nix::libc;

    let Some(nice) = priority.niceness() else {
        return;
    };
    // SAFETY: setpriority only reads its integer arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, nice) };
    if rc != 0 {
        let error = io::Error::last_os_error();
        tracing::warn!(service, pid, ?priority, %error, "failed to set process priority");
    }
}

#[cfg(not(unix))]
fn apply_priority(service: &str, pid: u32, priority: ProcessPriority) {
    if priority.niceness().is_some() {
        tracing::debug!(service, pid, ?priority, "process priority unsupported on this platform");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_environment_is_explicit() {
        let cfg = ServiceConfig::new("svc", "/bin/sh")
            .with_arguments(["-c", "echo \"$SERVICE_ID:$MODE:${HOME:-unset}\""])
            .with_base_environment([("MODE", "base")])
            .with_env("MODE", "override");

        let mut spawned = spawn(&cfg).unwrap();
        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).await.unwrap();
        spawned.child.wait().await.unwrap();

        assert_eq!(out.trim(), "svc:override:unset");
    }

    #[tokio::test]
    async fn test_start_arguments_replace_arguments() {
        let cfg = ServiceConfig::new("svc", "/bin/sh")
            .with_arguments(["-c", "echo plain"])
            .with_start_arguments(["-c", "echo launched"]);

        let mut spawned = spawn(&cfg).unwrap();
        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).await.unwrap();
        spawned.child.wait().await.unwrap();

        assert_eq!(out.trim(), "launched");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_priority_is_applied() {
        let cfg = ServiceConfig::new("svc", "/bin/sleep")
            .with_arguments(["5"])
            .with_priority(ProcessPriority::BelowNormal);

        let mut spawned = spawn(&cfg).unwrap();
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", spawned.pid)).unwrap();
        spawned.child.kill().await.unwrap();

        // Fields after the parenthesised command name; niceness is field 19.
        let rest = &stat[stat.rfind(')').unwrap() + 2..];
        let nice: i32 = rest.split_whitespace().nth(16).unwrap().parse().unwrap();
        let expected = (10 + current_niceness()).min(19);
        assert_eq!(nice, expected);
    }

    #[cfg(target_os = "linux")]
    fn current_niceness() -> i32 {
        let stat = std::fs::read_to_string("/proc/self/stat").unwrap();
        let rest = &stat[stat.rfind(')').unwrap() + 2..];
        rest.split_whitespace().nth(16).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_stop_command_only_when_configured() {
        let cfg = ServiceConfig::new("svc", "/bin/sh");
        assert!(spawn_stop_command(&cfg).is_none());

        let cfg = cfg.with_stop_command(None, ["-c", "exit 3"]);
        let mut child = spawn_stop_command(&cfg).unwrap().unwrap();
        assert_eq!(child.wait().await.unwrap().code(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let cfg = ServiceConfig::new("svc", "/nonexistent/servicevisor-test-binary");
        assert!(spawn(&cfg).is_err());
    }
}
