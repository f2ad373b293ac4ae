//! Lifecycle control for the long-running services.
//!
//! formdrop runs up to two independent services, the HTTP front end and the
//! collector. Each one receives a [`ServiceHandle`] and stops once the handle
//! is signalled. A [`ServiceManager`] holds the handles so that one interrupt
//! can stop everything.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// The kind of long-running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// The HTTP front end.
    Http,

    /// The datagram-fed storage collector.
    Collector,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Collector => write!(f, "collector"),
        }
    }
}

/// A handle used to stop a service.
///
/// This is a lightweight, cloneable handle; all clones share one stop signal.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    kind: ServiceKind,
    stop_signal: Arc<watch::Sender<bool>>,
}

impl ServiceHandle {
    /// Create a new service handle.
    #[must_use]
    pub fn new(kind: ServiceKind) -> Self {
        let (stop_signal, _) = watch::channel(false);
        Self {
            kind,
            stop_signal: Arc::new(stop_signal),
        }
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        if !self.stop_signal.send_replace(true) {
            debug!("Stopping {} service", self.kind);
        }
    }

    /// Wait until the stop signal is sent.
    ///
    /// Resolves immediately if the service was already signalled.
    pub async fn stopped(&self) {
        let mut rx = self.stop_signal.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// A collection of service handles that can be stopped together.
#[derive(Debug, Clone, Default)]
pub struct ServiceManager {
    handles: Vec<ServiceHandle>,
}

impl ServiceManager {
    /// Create a new service manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle for a service of `kind` and start managing it.
    pub fn register(&mut self, kind: ServiceKind) -> ServiceHandle {
        let handle = ServiceHandle::new(kind);
        self.handles.push(handle.clone());
        handle
    }

    /// Stop all services.
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Get the number of managed services.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }
}
