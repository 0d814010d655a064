//! Wire payload rendering.
//!
//! Two formats exist across the node fleet: the original tab-separated
//! channel payload and the JSON shape used by the MQTT nodes. Both are
//! rendered into a stack buffer; float fields use the shortest
//! round-tripping decimal form.

use core::fmt::Write;

use heapless::String;

use crate::reading::Reading;

/// Maximum rendered payload length, bytes.
pub const MAX_PAYLOAD: usize = 128;

/// Wire format of the published payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadFormat {
    /// `timestamp:<secs>\ttemp:<f>\thumidity:<f>[\tpressure:<f>]`
    Plain,
    /// `{"location":"<name>","timestamp":<secs>,"temperature":<f>,"humidity":<f>}`
    Structured,
}

/// Render `reading` in the given format.
///
/// `location` is only used by [`PayloadFormat::Structured`]; the plain
/// format identifies the device by its channel instead. Errors only if the
/// rendered payload would exceed [`MAX_PAYLOAD`].
pub fn render(
    format: PayloadFormat,
    reading: &Reading,
    location: &str,
) -> Result<String<MAX_PAYLOAD>, core::fmt::Error> {
    let mut out = String::new();
    match format {
        PayloadFormat::Plain => {
            write!(
                out,
                "timestamp:{}\ttemp:{}\thumidity:{}",
                reading.timestamp, reading.temperature, reading.humidity
            )?;
            if let Some(pressure) = reading.pressure {
                write!(out, "\tpressure:{}", pressure)?;
            }
        }
        PayloadFormat::Structured => {
            write!(
                out,
                "{{\"location\":\"{}\",\"timestamp\":{},\"temperature\":{},\"humidity\":{}}}",
                location, reading.timestamp, reading.temperature, reading.humidity
            )?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_reading() -> Reading {
        Reading {
            temperature: 21.5,
            humidity: 55.2,
            pressure: None,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn plain_payload_matches_the_reference_bytes() {
        let payload = render(PayloadFormat::Plain, &reference_reading(), "").unwrap();
        assert_eq!(
            payload.as_str(),
            "timestamp:1700000000\ttemp:21.5\thumidity:55.2"
        );
    }

    #[test]
    fn plain_payload_appends_pressure_when_sampled() {
        let mut reading = reference_reading();
        reading.pressure = Some(1013.4);
        let payload = render(PayloadFormat::Plain, &reading, "").unwrap();
        assert_eq!(
            payload.as_str(),
            "timestamp:1700000000\ttemp:21.5\thumidity:55.2\tpressure:1013.4"
        );
    }

    #[test]
    fn structured_payload_matches_the_reference_bytes() {
        let payload = render(PayloadFormat::Structured, &reference_reading(), "office").unwrap();
        assert_eq!(
            payload.as_str(),
            "{\"location\":\"office\",\"timestamp\":1700000000,\"temperature\":21.5,\"humidity\":55.2}"
        );
    }

    #[test]
    fn structured_payload_ignores_pressure() {
        let mut reading = reference_reading();
        reading.pressure = Some(1013.4);
        let payload = render(PayloadFormat::Structured, &reading, "office").unwrap();
        assert!(!payload.as_str().contains("pressure"));
    }
}
