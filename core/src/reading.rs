//! Sensor reading domain types.

/// Sentinel reported on a channel that could not be read.
///
/// Inherited from the sensor library convention: the error code shares the
/// value space of legitimate readings, so fault detection is exact float
/// equality and a genuine -4.0 reading would be misclassified as a fault.
/// Reproduced as-is; see DESIGN.md for the risk note.
pub const SENSOR_FAULT: f32 = -4.0;

/// Returns true when `value` is the sensor fault sentinel.
///
/// Only this exact value is ever rejected; everything else is a reading.
#[inline]
#[allow(clippy::float_cmp)]
pub fn is_fault(value: f32) -> bool {
    value == SENSOR_FAULT
}

/// One environmental sample. Produced fresh each cycle, never retained.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Temperature, degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
    /// Barometric pressure, hPa. Sampled only on nodes that carry the
    /// pressure channel.
    pub pressure: Option<f32>,
    /// Wall-clock time of the sample, Unix epoch seconds.
    pub timestamp: u64,
}

impl Reading {
    /// True when both mandatory channels hold real values.
    pub fn channels_valid(&self) -> bool {
        !is_fault(self.temperature) && !is_fault(self.humidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_exact_sentinel_is_a_fault() {
        assert!(is_fault(-4.0));
        assert!(!is_fault(-3.9999));
        assert!(!is_fault(-4.0001));
        assert!(!is_fault(0.0));
    }

    #[test]
    fn channel_validity_tracks_the_sentinel() {
        let mut r = Reading {
            temperature: 21.5,
            humidity: 55.2,
            pressure: None,
            timestamp: 0,
        };
        assert!(r.channels_valid());
        r.humidity = SENSOR_FAULT;
        assert!(!r.channels_valid());
    }
}
