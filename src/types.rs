use crate::error::PanelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use uuid::Uuid;

/// Join identifier
///
/// A positive integer, scoped independently per [`JoinKind`]. Zero is not a
/// valid join on the control bus and is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct JoinId(NonZeroU32);

impl JoinId {
    /// Create a join identifier, returning `None` for zero
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Get the raw join number
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for JoinId {
    type Error = PanelError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(PanelError::InvalidJoinId(raw))
    }
}

impl From<JoinId> for u32 {
    fn from(id: JoinId) -> Self {
        id.get()
    }
}

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal kind of a join
///
/// Serialized with the single-letter tags the bus uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JoinKind {
    /// Boolean signal
    #[serde(rename = "b")]
    Digital,
    /// Numeric signal
    #[serde(rename = "n", alias = "a")]
    Analog,
    /// String signal
    #[serde(rename = "s")]
    Serial,
}

impl JoinKind {
    /// Single-letter tag used on the bus
    pub fn wire_tag(self) -> &'static str {
        match self {
            JoinKind::Digital => "b",
            JoinKind::Analog => "n",
            JoinKind::Serial => "s",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinKind::Digital => "digital",
            JoinKind::Analog => "analog",
            JoinKind::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// Value crossing the transport boundary
///
/// Analog values are in the panel's percent unit (0-100) unless a transport
/// adapter converts them to a native bus range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinValue {
    Digital(bool),
    Analog(u16),
    Serial(String),
}

impl JoinValue {
    /// Kind of signal this value belongs to
    pub fn kind(&self) -> JoinKind {
        match self {
            JoinValue::Digital(_) => JoinKind::Digital,
            JoinValue::Analog(_) => JoinKind::Analog,
            JoinValue::Serial(_) => JoinKind::Serial,
        }
    }

    /// Coerce to a boolean (non-zero numbers and non-empty strings are true)
    pub fn as_bool(&self) -> bool {
        match self {
            JoinValue::Digital(value) => *value,
            JoinValue::Analog(value) => *value != 0,
            JoinValue::Serial(text) => !text.is_empty(),
        }
    }

    /// Coerce to a number (unparseable text is NaN)
    pub fn as_number(&self) -> f64 {
        match self {
            JoinValue::Digital(value) => f64::from(u8::from(*value)),
            JoinValue::Analog(value) => f64::from(*value),
            JoinValue::Serial(text) => text.trim().parse().unwrap_or(f64::NAN),
        }
    }

    /// Coerce to text
    pub fn as_text(&self) -> String {
        match self {
            JoinValue::Serial(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for JoinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinValue::Digital(value) => write!(f, "{}", value),
            JoinValue::Analog(value) => write!(f, "{}", value),
            JoinValue::Serial(text) => f.write_str(text),
        }
    }
}

/// Snapshot of one join primitive
#[derive(Debug, Clone, PartialEq)]
pub struct JoinState<T> {
    pub id: JoinId,
    pub kind: JoinKind,
    pub value: T,
    /// Whether a live subscription is currently held
    pub subscribed: bool,
}

/// Handle identifying one callback registration with a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    /// Create a fresh, unique handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}
