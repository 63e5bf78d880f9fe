use crate::error::{PanelError, Result};
use crate::transport::TransportEvent;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Connection status of the control bus as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Startup, before any transport event
    Initializing,
    Connected,
    Disconnected,
    /// Transport reported an error; a later connect clears it
    Error { detail: String },
    /// No transport could be loaded; terminal
    Unavailable { reason: String },
}

impl ConnectionStatus {
    /// Whether the bus is currently reachable
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Unavailable { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Initializing => f.write_str("initializing"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Error { detail } => write!(f, "error: {}", detail),
            ConnectionStatus::Unavailable { reason } => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Tracks transport lifecycle events for display
///
/// Cloning is cheap; all clones share one status. The monitor only reflects
/// events, reconnecting is left to the transport.
#[derive(Clone)]
pub struct ConnectionMonitor {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionMonitor {
    /// Create a monitor in the `Initializing` state
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Initializing);
        Self { tx: Arc::new(tx) }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    /// Whether the bus is currently reachable
    pub fn is_connected(&self) -> bool {
        self.tx.borrow().is_connected()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> StatusReceiver {
        StatusReceiver::new(self.tx.subscribe())
    }

    /// Apply a transport event
    ///
    /// Returns whether the status changed. Events after `Unavailable` are
    /// ignored.
    pub fn apply(&self, event: &TransportEvent) -> bool {
        let next = match event {
            TransportEvent::Connected { detail } => {
                tracing::info!("Control processor connected: {}", detail);
                ConnectionStatus::Connected
            }
            TransportEvent::Disconnected { detail } => {
                tracing::warn!("Control processor disconnected: {}", detail);
                ConnectionStatus::Disconnected
            }
            TransportEvent::Error { detail } => {
                tracing::error!("Control processor connection error: {}", detail);
                ConnectionStatus::Error {
                    detail: detail.clone(),
                }
            }
        };
        self.transition(next)
    }

    /// Record that no transport could be loaded
    pub fn mark_unavailable(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        tracing::info!("Transport unavailable: {}", reason);
        self.transition(ConnectionStatus::Unavailable { reason })
    }

    /// Follow a transport's event stream in a background task
    ///
    /// The task ends when the stream closes. Must be called within a tokio
    /// runtime.
    pub fn attach(
        &self,
        mut events: broadcast::Receiver<TransportEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        monitor.apply(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Connection monitor lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Transport event stream closed");
                        break;
                    }
                }
            }
        })
    }

    fn transition(&self, next: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            tracing::debug!("Connection status {} -> {}", current, next);
            *current = next;
            true
        })
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for connection status changes
pub struct StatusReceiver {
    rx: watch::Receiver<ConnectionStatus>,
}

impl StatusReceiver {
    pub(crate) fn new(rx: watch::Receiver<ConnectionStatus>) -> Self {
        Self { rx }
    }

    /// Status as last seen by this receiver
    pub fn current(&mut self) -> ConnectionStatus {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next status change
    ///
    /// Fails with [`PanelError::ConnectionClosed`] once the monitor is gone.
    pub async fn changed(&mut self) -> Result<ConnectionStatus> {
        self.rx
            .changed()
            .await
            .map_err(|_| PanelError::ConnectionClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
