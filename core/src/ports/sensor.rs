//! Sensor acquisition port.
//!
//! The cycle never sees bus-level timing or register maps; drivers and
//! their interrupt callbacks live entirely behind this trait.

/// One-shot environmental sensor.
pub trait SensorSource {
    /// Sample temperature (Celsius) and relative humidity (percent) in one
    /// shot. A value exactly equal to [`crate::reading::SENSOR_FAULT`] on
    /// either channel signals a transient read failure; no other value is
    /// ever rejected. The sensor needs its settle delay between calls;
    /// the cycle guarantees that spacing.
    fn read_temperature_humidity(&mut self) -> (f32, f32);

    /// Barometric pressure, hPa. Boards without a pressure channel keep
    /// the default.
    fn read_pressure(&mut self) -> Option<f32> {
        None
    }
}
