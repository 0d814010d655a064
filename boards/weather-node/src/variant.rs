#![deny(unsafe_code)]
#![deny(warnings)]
//! Node variant selection
//!
//! The two deployed variants share one binary crate and differ only in
//! payload shape and whether the pressure channel is sampled. The variant
//! is fixed at build time through cargo features.

use weathermod_core::{CycleConfig, PayloadFormat};

#[cfg(all(feature = "indoor", feature = "outdoor"))]
compile_error!("features `indoor` and `outdoor` are mutually exclusive");

#[cfg(not(any(feature = "indoor", feature = "outdoor")))]
compile_error!("select a node variant: feature `indoor` or `outdoor`");

/// Node name; doubles as the `location` field of structured payloads.
#[cfg(feature = "indoor")]
pub const NODE_NAME: &str = "indoor";
#[cfg(all(feature = "outdoor", not(feature = "indoor")))]
pub const NODE_NAME: &str = "outdoor";

/// Cycle tuning for the selected variant.
pub fn cycle_config() -> CycleConfig {
    #[cfg(feature = "indoor")]
    let config = CycleConfig {
        format: PayloadFormat::Structured,
        ..CycleConfig::default()
    };
    #[cfg(all(feature = "outdoor", not(feature = "indoor")))]
    let config = CycleConfig {
        format: PayloadFormat::Plain,
        sample_pressure: true,
        ..CycleConfig::default()
    };
    config
}
