use crate::bridge::BridgeTransport;
use crate::config::PanelConfig;
use crate::error::{PanelError, Result};
use crate::monitor::ConnectionMonitor;
use crate::types::{JoinId, JoinKind, JoinValue, SubscriptionHandle};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Callback invoked by a transport whenever the bus reports a new value
pub type StateCallback = Arc<dyn Fn(JoinValue) + Send + Sync>;

/// Transport lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection to the control processor established
    Connected { detail: String },
    /// Connection to the control processor lost
    Disconnected { detail: String },
    /// Transport reported an error
    Error { detail: String },
}

/// Signal transport consumed by the join primitives
///
/// Implemented by the live bus adapter ([`BridgeTransport`]) and by test
/// fakes. All operations are non-blocking: subscriptions are plain callback
/// registrations and publishes are fire-and-forget.
pub trait Transport: Send + Sync {
    /// Register `callback` for value changes of one join
    fn subscribe_state(
        &self,
        kind: JoinKind,
        id: JoinId,
        callback: StateCallback,
    ) -> Result<SubscriptionHandle>;

    /// Remove a registration made by [`Transport::subscribe_state`]
    ///
    /// Unknown handles are ignored.
    fn unsubscribe_state(&self, kind: JoinKind, id: JoinId, handle: SubscriptionHandle);

    /// Send a value to the bus
    fn publish_event(&self, kind: JoinKind, id: JoinId, value: JoinValue) -> Result<()>;

    /// Subscribe to connect/disconnect/error events
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Decides which transport, if any, the join primitives talk to
///
/// Absence of a transport is the normal offline mode, not a failure.
#[derive(Clone, Default)]
pub struct TransportResolver {
    transport: Option<Arc<dyn Transport>>,
}

impl TransportResolver {
    /// Resolver for offline operation
    pub fn none() -> Self {
        Self { transport: None }
    }

    /// Resolver bound to an existing transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Detect the available transport at startup
    ///
    /// Tries the configured bridge within its connect timeout. Any failure
    /// leaves the panel offline and marks the monitor unavailable.
    pub async fn detect(config: &PanelConfig, monitor: &ConnectionMonitor) -> Self {
        if config.offline {
            tracing::info!("Offline mode configured, skipping bridge connection");
            monitor.mark_unavailable("offline mode");
            return Self::none();
        }

        let Some(bridge) = &config.bridge else {
            tracing::info!("No bridge configured, running offline");
            monitor.mark_unavailable("no bridge configured");
            return Self::none();
        };

        match BridgeTransport::connect(bridge.clone()).await {
            Ok(transport) => {
                let transport: Arc<dyn Transport> = Arc::new(transport);
                // Subscribe before reporting so a drop right after connect is not lost
                let events = transport.events();
                monitor.apply(&TransportEvent::Connected {
                    detail: bridge.url(),
                });
                monitor.attach(events);
                Self::with_transport(transport)
            }
            Err(e) => {
                tracing::info!("Bridge at {} unavailable, running offline: {}", bridge.url(), e);
                monitor.mark_unavailable(e.to_string());
                Self::none()
            }
        }
    }

    /// Get the active transport, `None` when offline
    pub fn resolve(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    /// Get the active transport or fail with [`PanelError::TransportUnavailable`]
    pub fn require(&self) -> Result<Arc<dyn Transport>> {
        self.resolve().ok_or(PanelError::TransportUnavailable)
    }

    /// Whether a live transport was resolved
    pub fn is_live(&self) -> bool {
        self.transport.is_some()
    }
}
