//! Collaborator ports consumed by the sample cycle.
//!
//! The cycle never touches hardware or a network stack directly; it talks
//! to these traits. Board crates implement them over real transports (GPIO,
//! embassy-net, an MQTT session task), tests implement them as fakes driven
//! tick-by-tick.

mod clock;
mod connectivity;
mod indicator;
mod provisioning;
mod publisher;
mod sensor;

pub use clock::Clock;
pub use connectivity::{Connectivity, ConnectivityState};
pub use indicator::Indicator;
pub use provisioning::{FixedName, Provisioning};
pub use publisher::Publisher;
pub use sensor::SensorSource;
