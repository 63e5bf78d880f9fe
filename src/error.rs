use crate::types::{JoinId, JoinKind};
use thiserror::Error;

/// Result type for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while synchronizing joins with the control bus
///
/// None of these are fatal to a panel. Join primitives catch and log them;
/// they only surface directly from configuration loading and transport setup.
#[derive(Error, Debug)]
pub enum PanelError {
    /// No bus client is reachable (offline mode)
    #[error("Transport unavailable")]
    TransportUnavailable,

    /// Registering a state callback with the transport failed
    #[error("Subscription to {kind} join {id} failed: {detail}")]
    Subscription {
        kind: JoinKind,
        id: JoinId,
        /// Diagnostic from the transport
        detail: String,
    },

    /// Sending a value to the transport failed
    #[error("Publish to {kind} join {id} failed: {detail}")]
    Publish {
        kind: JoinKind,
        id: JoinId,
        /// Diagnostic from the transport
        detail: String,
    },

    /// Symbolic join name missing from the join map
    #[error("Unknown {kind} join name: {name}")]
    UnknownJoin { kind: JoinKind, name: String },

    /// Join identifiers are positive integers
    #[error("Invalid join id: {0}")]
    InvalidJoinId(u32),

    /// Aggregate control could not be built
    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),

    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection to the bridge is closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Bridge connection timed out
    #[error("Connection timeout")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unexpected frame from the bridge
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
