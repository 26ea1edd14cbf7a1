//! Runtime core: lifecycle of the supervised child.
//!
//! The only public API from this module is the [`Supervisor`] handle with its
//! builder, the status types and the [`Host`] hook.
//!
//! Internal modules:
//! - [`control`]: the control loop, single owner of all state transitions;
//! - [`monitor`]: reaps one child generation and waits for its pipes;
//! - [`stop`]: graceful-then-forced stop escalation over the process tree;
//! - [`supervisor`]: the public handle, commands and status reads;
//! - [`shutdown`]: cross-platform termination signal handling.
//!
//! ```text
//! Supervisor ──Command──► ControlLoop ──spawn──► process::spawn ─► Child
//!     ▲                        │                        │ stdout/stderr
//!     │ watch<Status>          │                        ▼
//!     └────────────────────────┤               logs::drain ×2 ─► StreamSink
//!                              │                        │ EOF
//!                              ◄──── Exited ──── monitor ◄┘
//! ```

mod builder;
mod control;
mod host;
mod monitor;
pub(crate) mod shutdown;
mod state;
mod stop;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use host::{Host, NoopHost};
pub use state::{ServiceState, Status, StopOutcome};
pub use supervisor::Supervisor;
