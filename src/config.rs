use crate::error::{PanelError, Result};
use crate::types::{JoinId, JoinKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default WebSocket port of the bridge
pub const DEFAULT_BRIDGE_PORT: u16 = 49200;

/// Panel configuration
///
/// Loaded from JSON, e.g.
///
/// ```json
/// {
///   "bridge": { "host": "192.168.1.50", "analog_scale": "native16" },
///   "mock_snapshot": "mock_joins.json",
///   "joins": { "digital": { "BOARDROOM_MIC": 21 }, "analog": { "SPEAKER_VOLUME": 1 } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Never try to reach the bus, even when a bridge is configured
    #[serde(default)]
    pub offline: bool,

    /// Live bridge to connect to
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,

    /// JSON file seeding offline values
    #[serde(default)]
    pub mock_snapshot: Option<PathBuf>,

    /// Symbolic join names
    #[serde(default)]
    pub joins: JoinMap,
}

impl PanelConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    ///
    /// A relative `mock_snapshot` path is resolved against the file's
    /// directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        if let (Some(snapshot), Some(dir)) = (&config.mock_snapshot, path.parent()) {
            if snapshot.is_relative() {
                config.mock_snapshot = Some(dir.join(snapshot));
            }
        }
        Ok(config)
    }

    /// Load the configured mock snapshot, or an empty one
    pub fn load_snapshot(&self) -> Result<MockSnapshot> {
        match &self.mock_snapshot {
            Some(path) => MockSnapshot::from_path(path),
            None => Ok(MockSnapshot::default()),
        }
    }
}

/// Connection settings for the WebSocket bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Give up on the bridge after this long at startup
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Native range of analog values on the bus
    #[serde(default)]
    pub analog_scale: AnalogScale,
}

fn default_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl BridgeConfig {
    /// Bridge at `host` with default settings
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_BRIDGE_PORT,
            connect_timeout_ms: default_connect_timeout_ms(),
            analog_scale: AnalogScale::default(),
        }
    }

    /// WebSocket URL of the bridge
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Startup connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Native range of analog joins on the bus
///
/// The panel always works in percent; the bridge converts at the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalogScale {
    /// Bus values are already 0-100
    #[default]
    Percent,
    /// Bus values are 0-65535
    Native16,
}

impl AnalogScale {
    /// Convert a percent value into the bus range
    pub fn to_wire(self, percent: u16) -> u16 {
        let percent = percent.min(100);
        match self {
            AnalogScale::Percent => percent,
            AnalogScale::Native16 => {
                (f64::from(percent) / 100.0 * f64::from(u16::MAX)).round() as u16
            }
        }
    }

    /// Convert a bus value into percent, clamping out-of-range input
    pub fn from_wire(self, raw: f64) -> u16 {
        let percent = match self {
            AnalogScale::Percent => raw,
            AnalogScale::Native16 => raw / f64::from(u16::MAX) * 100.0,
        };
        u16::from(crate::analog::clamp_percent(percent))
    }
}

/// Symbolic join names, per signal kind
///
/// The table belongs to the control system program; the panel only looks
/// names up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinMap {
    #[serde(default)]
    pub digital: BTreeMap<String, JoinId>,
    #[serde(default)]
    pub analog: BTreeMap<String, JoinId>,
    #[serde(default)]
    pub serial: BTreeMap<String, JoinId>,
}

impl JoinMap {
    /// Resolve a symbolic name
    pub fn lookup(&self, kind: JoinKind, name: &str) -> Result<JoinId> {
        let table = match kind {
            JoinKind::Digital => &self.digital,
            JoinKind::Analog => &self.analog,
            JoinKind::Serial => &self.serial,
        };
        table.get(name).copied().ok_or_else(|| PanelError::UnknownJoin {
            kind,
            name: name.to_string(),
        })
    }
}

/// Values used to seed joins when no bus is attached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockSnapshot {
    #[serde(default)]
    pub digital: BTreeMap<JoinId, bool>,
    /// Percent values; clamped when loaded
    #[serde(default)]
    pub analog: BTreeMap<JoinId, f64>,
    #[serde(default)]
    pub serial: BTreeMap<JoinId, String>,
}

impl MockSnapshot {
    /// Parse a snapshot from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a snapshot file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_runs_offline() {
        let config = PanelConfig::from_json_str("{}").unwrap();
        assert!(!config.offline);
        assert!(config.bridge.is_none());
        assert_eq!(config.load_snapshot().unwrap(), MockSnapshot::default());
    }

    #[test]
    fn bridge_defaults_apply() {
        let config =
            PanelConfig::from_json_str(r#"{"bridge": {"host": "10.0.0.5"}}"#).unwrap();
        let bridge = config.bridge.unwrap();
        assert_eq!(bridge.url(), "ws://10.0.0.5:49200");
        assert_eq!(bridge.connect_timeout(), Duration::from_secs(5));
        assert_eq!(bridge.analog_scale, AnalogScale::Percent);
    }

    #[test]
    fn join_names_resolve_per_kind() {
        let config = PanelConfig::from_json_str(
            r#"{"joins": {"digital": {"BOARDROOM_MIC": 21}, "analog": {"SPEAKER_VOLUME": 21}}}"#,
        )
        .unwrap();
        let mic = config.joins.lookup(JoinKind::Digital, "BOARDROOM_MIC").unwrap();
        assert_eq!(mic.get(), 21);
        assert!(matches!(
            config.joins.lookup(JoinKind::Serial, "BOARDROOM_MIC"),
            Err(PanelError::UnknownJoin { kind: JoinKind::Serial, .. })
        ));
    }

    #[test]
    fn zero_join_is_rejected() {
        assert!(PanelConfig::from_json_str(r#"{"joins": {"digital": {"BAD": 0}}}"#).is_err());
    }

    #[test]
    fn native_scale_round_trips_percent_points() {
        let scale = AnalogScale::Native16;
        assert_eq!(scale.to_wire(100), 65535);
        assert_eq!(scale.to_wire(0), 0);
        assert_eq!(scale.to_wire(50), 32768);
        assert_eq!(scale.from_wire(32768.0), 50);
        assert_eq!(scale.from_wire(70000.0), 100);
        assert_eq!(AnalogScale::Percent.from_wire(-3.0), 0);
    }
}
