//! Connectivity readiness port.

/// One cycle's snapshot of the connectivity preconditions.
///
/// Recomputed every cycle and compared against the previous snapshot only
/// to decide whether a transition log line is emitted; nothing else ties
/// it to the reading produced in the same cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectivityState {
    /// Physical/link layer is up.
    pub link_ready: bool,
    /// The cloud session (IP configuration on the reference board) is up.
    pub cloud_session_ready: bool,
    /// The messaging session (MQTT) is established.
    pub messaging_ready: bool,
}

impl ConnectivityState {
    /// The readiness AND-gate: acquisition and publish may proceed only
    /// when every precondition holds.
    pub fn all_ready(&self) -> bool {
        self.link_ready && self.cloud_session_ready && self.messaging_ready
    }
}

/// Link/session/messaging readiness, owned by the platform.
pub trait Connectivity {
    fn link_ready(&mut self) -> bool;

    fn cloud_session_ready(&mut self) -> bool;

    fn messaging_ready(&mut self) -> bool;

    /// Attempt to re-establish the messaging session. Called only when
    /// [`Connectivity::messaging_ready`] is false; returns the messaging
    /// state after the attempt. Implementations that reconnect in the
    /// background may simply request the reconnect and return false.
    fn reconnect_messaging(&mut self) -> bool;
}
