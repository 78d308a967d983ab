//! # Telemetry Types
//!
//! Normalized vehicle state. Every value held here is in display units:
//! degrees, degrees/second, meters, meters/second, volts and percent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vehicle orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Body angular rates in degrees/second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AngularRates {
    pub omega_x: f64,
    pub omega_y: f64,
    pub omega_z: f64,
}

/// Local NED position in meters (z positive down).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Local NED velocity in meters/second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// Companion computer load, both in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub cpu_load: f64,
    pub memory_usage: f64,
}

/// One normalized telemetry sample.
///
/// Immutable once produced. Samples from one source are ordered by
/// non-decreasing `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    pub attitude: Attitude,
    pub angular_rates: AngularRates,
    pub position: Position,
    pub velocity: Velocity,
    /// Height above home in meters (positive up)
    pub altitude: f64,
    /// Heading in degrees, 0..360
    pub heading: f64,
    pub battery_voltage: f64,
    /// Remaining charge in percent, when the source reports it
    pub battery_remaining: Option<f64>,
    pub system_health: SystemHealth,
}

impl TelemetrySnapshot {
    /// Horizontal speed over ground in m/s.
    pub fn ground_speed(&self) -> f64 {
        self.velocity.vx.hypot(self.velocity.vy)
    }

    /// Euclidean norm of roll, pitch and yaw in degrees.
    pub fn attitude_magnitude(&self) -> f64 {
        let a = &self.attitude;
        (a.roll * a.roll + a.pitch * a.pitch + a.yaw * a.yaw).sqrt()
    }
}

/// Which producer wrote the parameters snapshot of the view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// All snapshot endpoints answered
    Polled,
    /// The whole cycle came from the flight data simulator
    Simulated,
    /// Real slices with simulated stand-ins for degraded ones
    Mixed,
}

/// Serial port offered by the backend for the vehicle link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortDescriptor {
    pub device: String,
    #[serde(default)]
    pub description: String,
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS[.fff]` and
/// `YYYY-MM-DDTHH:MM:SS[.fff]` forms, which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            attitude: Attitude { roll: 3.0, pitch: 4.0, yaw: 12.0 },
            angular_rates: AngularRates::default(),
            position: Position::default(),
            velocity: Velocity { vx: 3.0, vy: -4.0, vz: 1.0 },
            altitude: 0.0,
            heading: 0.0,
            battery_voltage: 0.0,
            battery_remaining: None,
            system_health: SystemHealth::default(),
        }
    }

    #[test]
    fn test_ground_speed_ignores_vertical() {
        assert!((snapshot().ground_speed() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_attitude_magnitude() {
        assert!((snapshot().attitude_magnitude() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2025-06-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_backend_format() {
        let ts = parse_timestamp("2025-06-01 12:00:05").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 5).unwrap());
    }

    #[test]
    fn test_parse_naive_iso_with_fraction() {
        let ts = parse_timestamp("2025-06-01T12:00:05.250").unwrap();
        assert_eq!(ts.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_port_descriptor_without_description() {
        let port: PortDescriptor = serde_json::from_str(r#"{"device": "COM3"}"#).unwrap();
        assert_eq!(port.device, "COM3");
        assert!(port.description.is_empty());
    }
}
