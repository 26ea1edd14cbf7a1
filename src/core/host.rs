//! Host hook for actions outside the supervisor's reach.

use async_trait::async_trait;

/// Receives requests only the host (service manager, init system) can carry out.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use servicevisor::Host;
///
/// struct Systemd;
///
/// #[async_trait]
/// impl Host for Systemd {
///     async fn request_reboot(&self, service: &str, reason: &str) {
///         eprintln!("{service} asks for a reboot: {reason}");
///         // e.g. call org.freedesktop.login1.Manager.Reboot over D-Bus
///     }
/// }
/// ```
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Called when a `Reboot` failure action comes due. The service stays stopped.
    async fn request_reboot(&self, service: &str, reason: &str);
}

/// Default host: logs reboot requests and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

#[async_trait]
impl Host for NoopHost {
    async fn request_reboot(&self, service: &str, reason: &str) {
        tracing::warn!(service, reason, "reboot requested but no host hook is installed");
    }
}
