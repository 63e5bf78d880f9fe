use crate::join::{Join, Signal};
use crate::types::{JoinKind, JoinValue};
use serde::{Deserialize, Serialize};

/// Upper bound of the panel's analog unit
pub const PERCENT_MAX: u8 = 100;

/// Numeric join in percent (0-100): sliders, volume, brightness, positions
pub type AnalogJoin = Join<u8>;

/// Clamp any number into the percent range
///
/// Rounds half away from zero, so 57.5 becomes 58. NaN becomes 0.
pub fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(PERCENT_MAX)) as u8
}

impl Signal for u8 {
    const KIND: JoinKind = JoinKind::Analog;

    fn from_value(value: &JoinValue) -> Self {
        clamp_percent(value.as_number())
    }

    fn to_value(&self) -> JoinValue {
        JoinValue::Analog(u16::from(*self))
    }
}

impl Join<u8> {
    /// Clamp to 0-100, apply locally and publish
    ///
    /// Out-of-range input is clamped, never rejected. Returns the stored
    /// value.
    ///
    /// # Example
    ///
    /// ```
    /// use crestron_panel::{JoinId, Panel};
    ///
    /// let panel = Panel::offline();
    /// let volume = panel.analog(JoinId::new(1).unwrap(), 50.0);
    /// assert_eq!(volume.set_analog(142.0), 100);
    /// assert_eq!(volume.set_analog(-15.0), 0);
    /// assert_eq!(volume.set_analog(57.6), 58);
    /// ```
    pub fn set_analog(&self, value: f64) -> u8 {
        self.write(clamp_percent(value))
    }

    /// Step the value by `delta` percent, clamping at the ends
    pub fn adjust(&self, delta: i16) -> u8 {
        self.write_with(|current| clamp_percent(f64::from(*current) + f64::from(delta)))
    }

    /// Current value mapped into a physical range
    pub fn value_in(&self, range: LinearRange) -> f64 {
        range.from_percent(self.value())
    }

    /// Set the value from a physical quantity in `range`
    pub fn set_in(&self, range: LinearRange, value: f64) -> u8 {
        self.set_analog(range.to_percent(value))
    }
}

/// Linear mapping between a physical range and the percent unit
///
/// Climate set points use 16-30 °C, for example: 23 °C is 50%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRange {
    pub min: f64,
    pub max: f64,
}

impl LinearRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map a physical value to percent (unclamped)
    pub fn to_percent(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            return 0.0;
        }
        (value - self.min) / span * f64::from(PERCENT_MAX)
    }

    /// Map a percent value back into the physical range
    pub fn from_percent(&self, percent: u8) -> f64 {
        self.min + f64::from(percent) / f64::from(PERCENT_MAX) * (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_rounds() {
        assert_eq!(clamp_percent(-15.0), 0);
        assert_eq!(clamp_percent(142.0), 100);
        assert_eq!(clamp_percent(57.6), 58);
        assert_eq!(clamp_percent(57.5), 58);
        assert_eq!(clamp_percent(57.4), 57);
        assert_eq!(clamp_percent(-0.4), 0);
        assert_eq!(clamp_percent(f64::NAN), 0);
        assert_eq!(clamp_percent(f64::INFINITY), 100);
        assert_eq!(clamp_percent(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn clamp_holds_over_a_sweep() {
        let mut x: f64 = -250.0;
        while x <= 250.0 {
            let expected = x.round().clamp(0.0, 100.0) as u8;
            assert_eq!(clamp_percent(x), expected, "input {}", x);
            x += 0.25;
        }
    }

    #[test]
    fn bus_values_are_clamped_on_receipt() {
        assert_eq!(u8::from_value(&JoinValue::Analog(65535)), 100);
        assert_eq!(u8::from_value(&JoinValue::Serial("33.5".into())), 34);
        assert_eq!(u8::from_value(&JoinValue::Digital(true)), 1);
    }

    #[test]
    fn temperature_range_maps_through_percent() {
        let climate = LinearRange::new(16.0, 30.0);
        assert_eq!(climate.from_percent(50), 23.0);
        assert_eq!(climate.to_percent(30.0), 100.0);
        assert_eq!(clamp_percent(climate.to_percent(24.0)), 57);
        assert_eq!(LinearRange::new(5.0, 5.0).to_percent(5.0), 0.0);
    }
}
