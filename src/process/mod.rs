//! Operating-system process plumbing used by the control loop.
//!
//! - [`spawn`] builds the child command from a [`ServiceConfig`](crate::ServiceConfig),
//!   [`spawn_stop_command`] the optional stop command
//! - [`ProcessTable`] snapshots the process tree (via `sysinfo`)
//! - [`signal`] delivers graceful and forced termination requests

pub(crate) mod signal;
mod spawn;
mod tree;

pub(crate) use spawn::{spawn, spawn_stop_command, Spawned};
pub(crate) use tree::ProcessTable;
