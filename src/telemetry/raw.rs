//! # Raw Snapshot Slices
//!
//! Wire-level shapes of the four snapshot endpoints, in the units the
//! autopilot reports them. Real poll cycles and simulator ticks both produce a
//! [`RawFrame`], so one normalization path serves both.

use serde::{Deserialize, Serialize};

use super::types::SystemHealth;

/// `LOCAL_POSITION_NED`: meters and meters/second, z positive down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPositionNed {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// `ATTITUDE`: radians and radians/second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    #[serde(default)]
    pub rollspeed: f64,
    #[serde(default)]
    pub pitchspeed: f64,
    #[serde(default)]
    pub yawspeed: f64,
}

/// `BATTERY_STATUS`: percent and per-cell millivolts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub battery_remaining: f64,
    #[serde(default)]
    pub voltages: Vec<f64>,
}

/// Centidegree value the autopilot sends when the heading is unknown.
pub const HEADING_UNKNOWN: f64 = 65535.0;

/// `GLOBAL_POSITION_INT`: relative altitude in tenths of a millimeter,
/// velocity in centimeters/second, heading in centidegrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalPositionInt {
    pub relative_alt: f64,
    pub vx: f64,
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default = "unknown_heading")]
    pub hdg: f64,
}

fn unknown_heading() -> f64 {
    HEADING_UNKNOWN
}

impl Default for GlobalPositionInt {
    fn default() -> Self {
        Self {
            relative_alt: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            hdg: HEADING_UNKNOWN,
        }
    }
}

/// Every slice of one cycle, still in wire units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub local_position: LocalPositionNed,
    pub attitude: AttitudeSample,
    pub battery: BatteryStatus,
    pub global_position: GlobalPositionInt,
    /// Only the simulator reports system health; polled cycles leave it empty
    pub system_health: Option<SystemHealth>,
}

/// Slices of one cycle collected so far; `None` marks a degraded source.
#[derive(Debug, Clone, Default)]
pub struct PartialFrame {
    pub local_position: Option<LocalPositionNed>,
    pub attitude: Option<AttitudeSample>,
    pub battery: Option<BatteryStatus>,
    pub global_position: Option<GlobalPositionInt>,
}

impl PartialFrame {
    /// The full frame, if no slice is missing.
    pub fn complete(self) -> Option<RawFrame> {
        Some(RawFrame {
            local_position: self.local_position?,
            attitude: self.attitude?,
            battery: self.battery?,
            global_position: self.global_position?,
            system_health: None,
        })
    }

    /// Fill the missing slices from `fallback`.
    pub fn fill_from(self, fallback: RawFrame) -> RawFrame {
        RawFrame {
            local_position: self.local_position.unwrap_or(fallback.local_position),
            attitude: self.attitude.unwrap_or(fallback.attitude),
            battery: self.battery.unwrap_or(fallback.battery),
            global_position: self.global_position.unwrap_or(fallback.global_position),
            system_health: fallback.system_health,
        }
    }
}
