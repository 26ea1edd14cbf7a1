//! # Console-mode service-control bridge.
//!
//! Drives a [`Supervisor`] from a foreground process: start, wait for a
//! termination signal, then shut down.
//!
//! ```text
//! run_until_signal(sup)
//!   ├─ start_mode == Disabled ─► Ok(AlreadyStopped), nothing spawned
//!   ├─► sup.start()
//!   ├─► wait_for_shutdown_signal()          (SIGINT / SIGTERM / SIGQUIT, Ctrl-C elsewhere)
//!   │      └─► Bus.publish(ShutdownRequested)
//!   └─► sup.shutdown() ─► StopOutcome
//! ```
//!
//! A failure action that stops the service for good (`None`, `Reboot`) does
//! not end the bridge; it keeps waiting for a signal, as a service manager would.

use crate::config::StartMode;
use crate::core::{shutdown, StopOutcome, Supervisor};
use crate::error::SupervisorError;
use crate::events::{Event, EventKind};

/// Runs `sup` until the wrapper receives a termination signal.
///
/// A start failure is returned immediately; the supervisor is shut down first.
pub async fn run_until_signal(sup: &Supervisor) -> Result<StopOutcome, SupervisorError> {
    let cfg = sup.config();
    if cfg.start_mode == StartMode::Disabled {
        tracing::warn!(service = %cfg.id, "service is disabled; not starting");
        return Ok(StopOutcome::AlreadyStopped);
    }

    if let Err(e) = sup.start().await {
        tracing::error!(service = %cfg.id, error = %e, label = e.as_label(), "service failed to start");
        let _ = sup.shutdown().await;
        return Err(e);
    }

    let signal = match shutdown::wait_for_shutdown_signal().await {
        Ok(name) => name,
        Err(e) => {
            tracing::error!(service = %cfg.id, error = %e, "cannot listen for termination signals; stopping");
            "signal-registration-failed"
        }
    };

    tracing::info!(service = %cfg.id, signal, "termination signal received");
    sup.bus().publish(
        Event::new(EventKind::ShutdownRequested)
            .with_service(cfg.id.as_str())
            .with_reason(signal),
    );
    sup.shutdown().await
}
