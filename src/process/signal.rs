//! Termination requests.
//!
//! Unix delivers `SIGTERM` / `SIGKILL` through `nix`; other platforms go
//! through `sysinfo`, where a graceful request is best effort. A process
//! that is already gone is not an error.

use std::io;

#[cfg(unix)]
mod imp {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    pub(crate) fn terminate(pid: u32) -> io::Result<()> {
        send(pid, Signal::SIGTERM)
    }

    pub(crate) fn kill_now(pid: u32) -> io::Result<()> {
        send(pid, Signal::SIGKILL)
    }

    /// Kills the process group led by `pgid` (the child runs in its own group).
    pub(crate) fn kill_group(pgid: u32) -> io::Result<()> {
        let Ok(raw) = i32::try_from(pgid) else {
            return Ok(());
        };
        absent_ok(killpg(Pid::from_raw(raw), Signal::SIGKILL))
    }

    fn send(pid: u32, signal: Signal) -> io::Result<()> {
        let Ok(raw) = i32::try_from(pid) else {
            return Ok(());
        };
        absent_ok(kill(Pid::from_raw(raw), signal))
    }

    fn absent_ok(result: nix::Result<()>) -> io::Result<()> {
        match result {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;

    use sysinfo::{Pid, Signal, System};

    pub(crate) fn terminate(pid: u32) -> io::Result<()> {
        with_process(pid, |process| {
            if process.kill_with(Signal::Term).is_none() {
                tracing::debug!(pid, "graceful termination unsupported on this platform");
            }
        })
    }

    pub(crate) fn kill_now(pid: u32) -> io::Result<()> {
        with_process(pid, |process| {
            process.kill();
        })
    }

    pub(crate) fn kill_group(_pgid: u32) -> io::Result<()> {
        Ok(())
    }

    fn with_process(pid: u32, f: impl FnOnce(&sysinfo::Process)) -> io::Result<()> {
        let mut sys = System::new();
        sys.refresh_processes();
        if let Some(process) = sys.process(Pid::from_u32(pid)) {
            f(process);
        }
        Ok(())
    }
}

/// Asks `pid` to exit.
pub(crate) fn terminate(pid: u32) -> io::Result<()> {
    imp::terminate(pid)
}

/// Forcibly ends `pid`.
pub(crate) fn kill(pid: u32) -> io::Result<()> {
    imp::kill_now(pid)
}

/// Forcibly ends the process group led by `pgid`; a no-op without process groups.
pub(crate) fn kill_group(pgid: u32) -> io::Result<()> {
    imp::kill_group(pgid)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_process_is_not_an_error() {
        // Pids above the kernel maximum never exist.
        assert!(terminate(i32::MAX as u32).is_ok());
        assert!(kill(i32::MAX as u32).is_ok());
    }

    #[test]
    fn test_out_of_range_pid_is_ignored() {
        assert!(kill(u32::MAX).is_ok());
    }
}
