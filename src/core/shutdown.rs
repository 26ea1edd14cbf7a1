//! # OS termination signals for the console bridge.
//!
//! [`wait_for_shutdown_signal`] completes when the wrapper process itself is
//! asked to terminate and reports which signal did it.
//!
//! | Platform | Signals                                   |
//! |----------|-------------------------------------------|
//! | Unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`            |
//! | other    | `Ctrl-C` via [`tokio::signal::ctrl_c`]    |

/// Waits for a termination signal and returns its name.
///
/// Each call installs independent listeners. Fails only if a listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
///
/// Each call installs an independent listener. Fails only if it cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
