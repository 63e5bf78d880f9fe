//! Rust library for synchronizing touch-panel controls with a Crestron control bus
//!
//! A control bus exposes three kinds of signal, each addressed by a numeric
//! join: digital (boolean), analog (numeric) and serial (string). This
//! library binds UI state to those joins:
//!
//! - Join primitives with optimistic local writes and fire-and-forget publishes
//! - Subscription lifetimes tied to the primitive (dropped means unsubscribed)
//! - Analog values fixed to a 0-100 percent unit with silent clamping
//! - Aggregate controls kept equal to the AND of their constituents
//! - Offline operation with a shared in-memory store and mock snapshots
//! - Connection status monitoring for display
//! - A WebSocket bridge transport for live operation
//!
//! # Quick Start
//!
//! ```
//! use crestron_panel::{JoinId, Panel};
//!
//! let id = |n| JoinId::new(n).unwrap();
//!
//! // No bus attached: everything runs against local state
//! let panel = Panel::offline();
//!
//! let volume = panel.analog(id(1), 50.0);
//! volume.set_analog(140.0);
//! assert_eq!(volume.value(), 100);
//!
//! let mics = panel.aggregate(id(20), [id(21), id(22), id(23)]).unwrap();
//! mics.toggle();
//! assert!(mics.constituents().iter().all(|mic| mic.value()));
//! ```
//!
//! # Live Operation
//!
//! ```no_run
//! use crestron_panel::{BridgeConfig, Panel, PanelConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PanelConfig {
//!         bridge: Some(BridgeConfig::new("192.168.1.50")),
//!         ..PanelConfig::default()
//!     };
//!     let panel = Panel::connect(config).await?;
//!
//!     let mut status = panel.connection().subscribe();
//!     while let Ok(update) = status.changed().await {
//!         println!("Bus: {}", update);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Panel**: hands out primitives bound to the resolved transport
//! - **Transport**: the contract a bus adapter implements, and its resolver
//! - **Join**: digital, analog and serial primitives over a shared core
//! - **Aggregate**: combined controls and their consistency rules
//! - **Monitor**: connection status state machine
//! - **Bridge**: WebSocket transport adapter and its JSON frames
//! - **Config**: panel, bridge, join map and mock snapshot settings

mod aggregate;
mod analog;
mod bridge;
mod config;
mod digital;
mod error;
mod join;
mod monitor;
mod offline;
mod panel;
mod protocol;
mod serial;
mod transport;
mod types;

// Public exports
pub use aggregate::AggregateControl;
pub use analog::{clamp_percent, AnalogJoin, LinearRange, PERCENT_MAX};
pub use bridge::BridgeTransport;
pub use config::{AnalogScale, BridgeConfig, JoinMap, MockSnapshot, PanelConfig, DEFAULT_BRIDGE_PORT};
pub use digital::DigitalJoin;
pub use error::{PanelError, Result};
pub use join::{Join, ListenerId, Signal};
pub use monitor::{ConnectionMonitor, ConnectionStatus, StatusReceiver};
pub use offline::OfflineStore;
pub use panel::Panel;
pub use protocol::Frame;
pub use serial::SerialJoin;
pub use transport::{StateCallback, Transport, TransportEvent, TransportResolver};
pub use types::{JoinId, JoinKind, JoinState, JoinValue, SubscriptionHandle};
