//! # Telemetry Module
//!
//! Vehicle state as it flows through the engine.
//!
//! This module handles:
//! - Raw wire slices returned by the snapshot endpoints ([`raw`])
//! - Conversion of wire units into display units ([`units`])
//! - The normalized [`TelemetrySnapshot`] exposed to the view model ([`types`])

pub mod raw;
pub mod types;
pub mod units;

pub use raw::RawFrame;
pub use types::{
    AngularRates, Attitude, DataSource, PortDescriptor, Position, SystemHealth, TelemetrySnapshot,
    Velocity,
};
