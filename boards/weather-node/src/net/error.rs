#![deny(unsafe_code)]
#![deny(warnings)]
//! Network error types

use defmt::Format;

/// Network operation errors
#[derive(Debug, Clone, Copy, Format)]
pub enum NetworkError {
    /// DNS resolution failed
    DnsError,
    /// Socket bind/connect error
    SocketError,
    /// Request timeout
    Timeout,
    /// Invalid response from server
    InvalidResponse,
    /// Server error (e.g., invalid stratum for NTP)
    ServerError,
    /// All configured servers failed
    AllServersFailed,
    /// MQTT connection failed
    MqttConnectionFailed,
    /// MQTT publish failed
    MqttPublishFailed,
    /// MQTT protocol error
    MqttProtocolError,
    /// The outbound message queue was dropped
    ChannelClosed,
}
