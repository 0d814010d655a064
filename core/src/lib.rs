//! Platform-agnostic control logic for the weathermod sensor nodes.
//!
//! The nodes poll a temperature/humidity(/pressure) sensor on a fixed
//! interval and publish each reading to a messaging channel. This crate
//! holds everything about that loop which is not hardware: the readiness
//! gate, the bounded sensor retry, payload rendering, and the fixed-budget
//! pacing that keeps the publish cadence near the target interval.
//!
//! The cycle is tick-driven rather than blocking: [`SampleCycle::tick`]
//! performs the work of the current phase and returns how long the driver
//! must wait before calling it again. Board crates own every wait (an RTIC
//! monotonic on hardware, a fake clock in tests), so the whole state
//! machine runs deterministically on the host with no real time elapsing.
//!
//! Hardware is reached only through the traits in [`ports`]; this crate has
//! NO hardware dependencies.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

#[cfg(test)]
extern crate std;

pub mod cycle;
pub mod limiter;
pub mod message;
pub mod ports;
pub mod reading;

pub use cycle::{CycleConfig, CycleIo, SampleCycle};
pub use message::PayloadFormat;
pub use reading::{Reading, SENSOR_FAULT};
