use crate::join::{Join, Signal};
use crate::types::{JoinKind, JoinValue};

/// Boolean join: toggles, buttons and feedback lamps
pub type DigitalJoin = Join<bool>;

impl Signal for bool {
    const KIND: JoinKind = JoinKind::Digital;

    fn from_value(value: &JoinValue) -> Self {
        value.as_bool()
    }

    fn to_value(&self) -> JoinValue {
        JoinValue::Digital(*self)
    }
}

impl Join<bool> {
    /// Negate the local value and publish it
    ///
    /// Returns the new value. Offline this is a purely local toggle.
    ///
    /// # Example
    ///
    /// ```
    /// use crestron_panel::{JoinId, Panel};
    ///
    /// let panel = Panel::offline();
    /// let mic = panel.digital(JoinId::new(21).unwrap());
    /// assert!(mic.toggle());
    /// assert!(!mic.toggle());
    /// ```
    pub fn toggle(&self) -> bool {
        self.write_with(|current| !current)
    }

    /// Set an explicit value and publish it
    pub fn set_digital(&self, value: bool) {
        self.write(value);
    }

    /// Momentary press: drive the join high
    pub fn press(&self) {
        self.set_digital(true);
    }

    /// Momentary release: drive the join low
    pub fn release(&self) {
        self.set_digital(false);
    }

    /// Press and release in one go, as a tap on a momentary button
    pub fn pulse(&self) {
        self.press();
        self.release();
    }
}
