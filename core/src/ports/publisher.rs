//! Outbound message port.

/// Fire-and-forget message send.
///
/// No acknowledgement is awaited and no failure is reported back; the
/// underlying transport owns delivery semantics. On the reference board
/// this is a bounded queue into the MQTT session task.
pub trait Publisher {
    fn publish(&mut self, channel: &str, payload: &str);
}
