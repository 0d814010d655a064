#![deny(unsafe_code)]
#![deny(warnings)]
//! Device identifier utilities
//!
//! Wraps the factory-programmed 96-bit STM32 unique ID, which is stable
//! across reboots and unique per chip, into the identifiers the backend
//! sees: the MQTT client ID and the registration announcement.

use heapless::String;

/// "weather-" (8 chars) + 24 hex chars = 32 chars total
pub const CLIENT_ID_MAX_LEN: usize = 32;

/// The unique device ID as a 24-character hex string.
pub fn uid_hex() -> &'static str {
    embassy_stm32::uid::uid_hex()
}

/// MQTT client ID in the format `weather-{24_hex_chars}`.
pub fn client_id() -> String<CLIENT_ID_MAX_LEN> {
    let mut id = String::<CLIENT_ID_MAX_LEN>::new();

    // Cannot fail: 8 prefix bytes + 24 UID bytes exactly fill the buffer.
    id.push_str("weather-").expect("prefix should fit");
    id.push_str(uid_hex()).expect("UID should fit");

    id
}
