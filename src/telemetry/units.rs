//! # Unit Normalizer
//!
//! Pure conversions from wire units to display units.
//!
//! | Wire unit | Display unit | Used for |
//! |-----------|--------------|----------|
//! | rad, rad/s | deg, deg/s | attitude, angular rates |
//! | mV | V | battery cell voltage |
//! | cm/s | m/s | global velocity |
//! | 0.1 mm | m | relative altitude |
//! | cdeg | deg | heading |
//!
//! ## Altitude sign
//!
//! The backend reports `relative_alt` with the NED sign, so height above home
//! is its negation. The simulator writes `relative_alt` from the same NED `z`
//! it integrates, which keeps altitude and `-position.z` in agreement.

use chrono::{DateTime, Utc};

use super::raw::{RawFrame, HEADING_UNKNOWN};
use super::types::{
    AngularRates, Attitude, Position, SystemHealth, TelemetrySnapshot, Velocity,
};

/// Tenths of a millimeter per meter.
pub const RELATIVE_ALT_PER_METER: f64 = 10_000.0;

/// Radians to degrees.
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Degrees to radians.
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Millivolts to volts.
#[inline]
pub fn millivolts_to_volts(mv: f64) -> f64 {
    mv / 1000.0
}

/// Centimeters/second to meters/second.
#[inline]
pub fn cm_per_s_to_m_per_s(cms: f64) -> f64 {
    cms / 100.0
}

/// `relative_alt` (tenths of mm, NED sign) to height above home in meters.
#[inline]
pub fn relative_alt_to_height(relative_alt: f64) -> f64 {
    -relative_alt / RELATIVE_ALT_PER_METER
}

/// Centidegrees to degrees.
#[inline]
pub fn centidegrees_to_degrees(cdeg: f64) -> f64 {
    cdeg / 100.0
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Normalize one frame of raw slices into a [`TelemetrySnapshot`].
///
/// Position and vertical velocity come from `LOCAL_POSITION_NED`, attitude and
/// rates from `ATTITUDE`, altitude from `GLOBAL_POSITION_INT`. The heading
/// falls back to the attitude yaw when the autopilot reports it unknown.
pub fn normalize_frame(frame: &RawFrame, timestamp: DateTime<Utc>) -> TelemetrySnapshot {
    let lp = &frame.local_position;
    let att = &frame.attitude;
    let gp = &frame.global_position;

    let heading = if gp.hdg >= HEADING_UNKNOWN {
        wrap_degrees(rad_to_deg(att.yaw))
    } else {
        wrap_degrees(centidegrees_to_degrees(gp.hdg))
    };

    TelemetrySnapshot {
        timestamp,
        attitude: Attitude {
            roll: rad_to_deg(att.roll),
            pitch: rad_to_deg(att.pitch),
            yaw: rad_to_deg(att.yaw),
        },
        angular_rates: AngularRates {
            omega_x: rad_to_deg(att.rollspeed),
            omega_y: rad_to_deg(att.pitchspeed),
            omega_z: rad_to_deg(att.yawspeed),
        },
        position: Position { x: lp.x, y: lp.y, z: lp.z },
        velocity: Velocity { vx: lp.vx, vy: lp.vy, vz: lp.vz },
        altitude: relative_alt_to_height(gp.relative_alt),
        heading,
        battery_voltage: frame
            .battery
            .voltages
            .first()
            .copied()
            .map(millivolts_to_volts)
            .unwrap_or(0.0),
        battery_remaining: Some(frame.battery.battery_remaining),
        system_health: frame.system_health.unwrap_or(SystemHealth::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::raw::{AttitudeSample, BatteryStatus, GlobalPositionInt, LocalPositionNed};
    use chrono::TimeZone;

    #[test]
    fn test_quarter_turn_roll() {
        let deg = rad_to_deg(1.5708);
        assert!((deg - 90.0).abs() < 0.1, "got {}", deg);
        assert!((deg_to_rad(deg) - 1.5708).abs() < 1e-9);
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(millivolts_to_volts(15_800.0), 15.8);
        assert_eq!(cm_per_s_to_m_per_s(250.0), 2.5);
        assert_eq!(centidegrees_to_degrees(9000.0), 90.0);
        assert_eq!(relative_alt_to_height(-120_000.0), 12.0);
        assert_eq!(relative_alt_to_height(0.0), 0.0);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(370.0), 10.0);
        assert_eq!(wrap_degrees(-90.0), 270.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        let tiny = wrap_degrees(-1e-14);
        assert!((0.0..360.0).contains(&tiny));
    }

    fn frame() -> RawFrame {
        RawFrame {
            local_position: LocalPositionNed { x: 1.0, y: 2.0, z: -12.0, vx: 3.0, vy: 4.0, vz: -0.5 },
            attitude: AttitudeSample {
                roll: 1.5708,
                pitch: -0.1,
                yaw: std::f64::consts::PI,
                rollspeed: 0.2,
                pitchspeed: 0.0,
                yawspeed: -0.2,
            },
            battery: BatteryStatus { battery_remaining: 76.0, voltages: vec![15_800.0, 3950.0] },
            global_position: GlobalPositionInt { relative_alt: -120_000.0, vx: 300.0, vy: 400.0, vz: 50.0, hdg: 27_000.0 },
            system_health: None,
        }
    }

    #[test]
    fn test_normalize_frame() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let snap = normalize_frame(&frame(), ts);

        assert_eq!(snap.timestamp, ts);
        assert!((snap.attitude.roll - 90.0).abs() < 0.1);
        assert!((snap.attitude.yaw - 180.0).abs() < 1e-9);
        assert!((snap.angular_rates.omega_z + rad_to_deg(0.2)).abs() < 1e-9);
        assert_eq!(snap.position.z, -12.0);
        assert_eq!(snap.altitude, 12.0);
        assert_eq!(snap.heading, 270.0);
        assert_eq!(snap.battery_voltage, 15.8);
        assert_eq!(snap.battery_remaining, Some(76.0));
        assert!((snap.ground_speed() - 5.0).abs() < 1e-9);
        assert_eq!(snap.system_health, SystemHealth::default());
    }

    #[test]
    fn test_unknown_heading_falls_back_to_yaw() {
        let mut raw = frame();
        raw.global_position.hdg = HEADING_UNKNOWN;
        raw.attitude.yaw = -std::f64::consts::FRAC_PI_2;

        let snap = normalize_frame(&raw, Utc::now());
        assert!((snap.heading - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_cell_voltage() {
        let mut raw = frame();
        raw.battery.voltages.clear();
        assert_eq!(normalize_frame(&raw, Utc::now()).battery_voltage, 0.0);
    }
}
