use crate::config::AnalogScale;
use crate::error::{PanelError, Result};
use crate::types::{JoinId, JoinKind, JoinValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON text frame exchanged with the bridge
///
/// Join ids travel as strings, matching the bus library's own API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client asks for updates of one join
    Subscribe { kind: JoinKind, id: String },
    /// Client no longer needs updates of one join
    Unsubscribe { kind: JoinKind, id: String },
    /// Client sends a value
    Publish { kind: JoinKind, id: String, value: Value },
    /// Bridge reports a value
    State { kind: JoinKind, id: String, value: Value },
    /// Bridge reports a problem
    Error { detail: String },
}

impl Frame {
    pub fn subscribe(kind: JoinKind, id: JoinId) -> Self {
        Frame::Subscribe {
            kind,
            id: id.to_string(),
        }
    }

    pub fn unsubscribe(kind: JoinKind, id: JoinId) -> Self {
        Frame::Unsubscribe {
            kind,
            id: id.to_string(),
        }
    }

    /// Publish frame, with analog values converted to the bus range
    pub fn publish(id: JoinId, value: &JoinValue, scale: AnalogScale) -> Self {
        let wire = match value {
            JoinValue::Digital(on) => Value::Bool(*on),
            JoinValue::Analog(percent) => Value::from(scale.to_wire(*percent)),
            JoinValue::Serial(text) => Value::String(text.clone()),
        };
        Frame::Publish {
            kind: value.kind(),
            id: id.to_string(),
            value: wire,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Parse a join id received as text
pub fn parse_id(raw: &str) -> Result<JoinId> {
    let number: u32 = raw
        .trim()
        .parse()
        .map_err(|_| PanelError::InvalidResponse(format!("Bad join id: {}", raw)))?;
    JoinId::try_from(number)
}

/// Decode a reported value for `kind`, converting analog values to percent
///
/// Values of an unexpected JSON type are coerced the way the bus library
/// coerces them.
pub fn decode_value(kind: JoinKind, value: &Value, scale: AnalogScale) -> JoinValue {
    match kind {
        JoinKind::Digital => JoinValue::Digital(match value {
            Value::Bool(on) => *on,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            _ => true,
        }),
        JoinKind::Analog => {
            let raw = match value {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::Bool(on) => f64::from(u8::from(*on)),
                Value::String(s) => s.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            };
            JoinValue::Analog(scale.from_wire(raw))
        }
        JoinKind::Serial => JoinValue::Serial(match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }),
    }
}
