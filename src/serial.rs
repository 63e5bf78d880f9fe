use crate::join::{Join, Signal};
use crate::types::{JoinKind, JoinValue};

/// String join: status text and alerts
pub type SerialJoin = Join<String>;

impl Signal for String {
    const KIND: JoinKind = JoinKind::Serial;

    fn from_value(value: &JoinValue) -> Self {
        value.as_text()
    }

    fn to_value(&self) -> JoinValue {
        JoinValue::Serial(self.clone())
    }
}

impl Join<String> {
    /// Apply text locally and publish it; any string is accepted, including empty
    pub fn send_text(&self, text: impl Into<String>) {
        self.write(text.into());
    }
}
