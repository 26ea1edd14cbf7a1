//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the control loop, the stop
//! escalation, the drain tasks and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ControlLoop`, `stop::run`, drain tasks (rotation, archive,
//!   write failures), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener spawned by `Supervisor::builder`
//!   (fans out to `SubscriberSet`) and any receiver from `Supervisor::subscribe`.
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
