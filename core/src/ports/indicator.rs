//! Activity indicator port.

/// Binary visible-state output (an LED on the reference board).
///
/// Side-effect only: held on while a sample is acquired and published,
/// toggled while the node waits for connectivity.
pub trait Indicator {
    fn set_active(&mut self, on: bool);
}
