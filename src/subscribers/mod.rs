//! # Event subscribers for the servicevisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling runtime events broadcast through
//! the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ControlLoop / stop / drains ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                                              │
//!                                                            ┌─────────────────┼──────────────┐
//!                                                            ▼                 ▼              ▼
//!                                                        LogWriter          Metrics        Custom ...
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** - observe and react to events (logging, metrics, alerts)
//! - **Stateful subscribers** - keep their own view of the service (crash counters, dashboards)

mod embedded;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
