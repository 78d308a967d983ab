//! # Flight Data Simulator
//!
//! Seeded discrete-time integrator that stands in for the snapshot endpoints
//! while they are unavailable.
//!
//! ## Model
//!
//! - Velocity follows a bounded random walk, `|v| <= max_speed`
//! - Position integrates velocity (NED, z positive down) with a weak pull
//!   back towards home so the vehicle stays over the field
//! - Height above home stays between [`MIN_HEIGHT_M`] and [`MAX_HEIGHT_M`]
//! - Roll and pitch oscillate within `±max_tilt_deg`; yaw follows the
//!   direction of travel
//! - Battery charge drains monotonically towards a floor
//!
//! Every tick emits a [`RawFrame`] in wire units. All slices are written from
//! the same state, so the normalized altitude equals `-position.z`, the
//! ground speed matches the local velocity and the heading matches the yaw.
//!
//! ## Usage
//!
//! ```
//! use skysync_gcs::simulator::{FlightDataSimulator, SimulatorParams};
//!
//! let mut sim = FlightDataSimulator::new(SimulatorParams::default());
//! let frame = sim.tick();
//! assert!(frame.battery.battery_remaining <= 100.0);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::config::SimulatorConfig;
use crate::telemetry::raw::{AttitudeSample, BatteryStatus, GlobalPositionInt, LocalPositionNed};
use crate::telemetry::units::{deg_to_rad, RELATIVE_ALT_PER_METER};
use crate::telemetry::{RawFrame, SystemHealth};

/// Lowest simulated height above home in meters.
pub const MIN_HEIGHT_M: f64 = 2.0;
/// Highest simulated height above home in meters.
pub const MAX_HEIGHT_M: f64 = 30.0;
/// Height the simulated flight starts at.
const START_HEIGHT_M: f64 = 10.0;
/// Distance from the band edges at which the climb rate is reversed.
const HEIGHT_MARGIN_M: f64 = 0.5;

/// Largest velocity change per axis and tick, m/s.
const MAX_ACCEL_STEP: f64 = 0.6;
/// Spring constant of the pull back towards home, 1/s².
const HOME_PULL: f64 = 0.002;

/// 4S pack: per-cell voltage at empty and full charge, in millivolts.
const CELL_COUNT: f64 = 4.0;
const CELL_EMPTY_MV: f64 = 3300.0;
const CELL_FULL_MV: f64 = 4200.0;

/// Tuning of the simulated flight.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorParams {
    pub seed: u64,
    pub max_speed: f64,
    pub max_tilt_deg: f64,
    pub battery_floor_percent: f64,
    pub battery_drain_per_tick: f64,
    /// Integration step in seconds (one poll period)
    pub time_step: f64,
}

impl Default for SimulatorParams {
    fn default() -> Self {
        Self {
            seed: 42,
            max_speed: 5.0,
            max_tilt_deg: 15.0,
            battery_floor_percent: 10.0,
            battery_drain_per_tick: 0.02,
            time_step: 1.0,
        }
    }
}

impl SimulatorParams {
    /// Build parameters from configuration and the poll period.
    pub fn from_config(config: &SimulatorConfig, time_step: f64) -> Self {
        Self {
            seed: config.seed,
            max_speed: config.max_speed,
            max_tilt_deg: config.max_tilt_deg,
            battery_floor_percent: config.battery_floor_percent,
            battery_drain_per_tick: config.battery_drain_per_tick,
            time_step,
        }
    }
}

/// Stateful synthetic flight. Lives for the process only.
#[derive(Debug)]
pub struct FlightDataSimulator {
    params: SimulatorParams,
    rng: StdRng,
    /// Simulated time in seconds
    t: f64,
    /// NED position, meters
    position: [f64; 3],
    /// NED velocity, m/s
    velocity: [f64; 3],
    yaw: f64,
    battery_percent: f64,
    memory_usage: f64,
    ticks: u64,
}

impl FlightDataSimulator {
    /// Create a simulator hovering at the start height with a full battery.
    #[must_use]
    pub fn new(params: SimulatorParams) -> Self {
        Self {
            rng: StdRng::seed_from_u64(params.seed),
            params,
            t: 0.0,
            position: [0.0, 0.0, -START_HEIGHT_M],
            velocity: [0.0; 3],
            yaw: 0.0,
            battery_percent: 100.0,
            memory_usage: 38.0,
            ticks: 0,
        }
    }

    /// Number of ticks produced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance by one time step and emit the resulting slices.
    pub fn tick(&mut self) -> RawFrame {
        let dt = self.params.time_step;
        self.t += dt;
        self.ticks += 1;

        self.step_velocity(dt);
        for axis in 0..3 {
            self.position[axis] += self.velocity[axis] * dt;
        }
        self.keep_height_in_bounds();

        let previous_yaw = self.yaw;
        let [vx, vy, _] = self.velocity;
        if vx.hypot(vy) > 0.1 {
            self.yaw = vy.atan2(vx);
        }
        let yaw_rate = wrap_pi(self.yaw - previous_yaw) / dt;

        let tilt = deg_to_rad(self.params.max_tilt_deg);
        let (roll_w, pitch_w) = (0.5, 0.3);
        let roll = tilt * (roll_w * self.t).sin();
        let pitch = tilt * (pitch_w * self.t + 0.7).sin();
        let roll_rate = tilt * roll_w * (roll_w * self.t).cos();
        let pitch_rate = tilt * pitch_w * (pitch_w * self.t + 0.7).cos();

        self.battery_percent = (self.battery_percent - self.params.battery_drain_per_tick)
            .max(self.params.battery_floor_percent);
        let cell_mv = CELL_EMPTY_MV + (CELL_FULL_MV - CELL_EMPTY_MV) * self.battery_percent / 100.0;

        let cpu_load = (35.0 + 10.0 * (0.1 * self.t).sin() + self.rng.gen_range(-3.0_f64..3.0))
            .clamp(0.0, 100.0);
        self.memory_usage = (self.memory_usage + self.rng.gen_range(-0.2_f64..0.2)).clamp(30.0, 60.0);

        let [x, y, z] = self.position;
        let [vx, vy, vz] = self.velocity;

        RawFrame {
            local_position: LocalPositionNed { x, y, z, vx, vy, vz },
            attitude: AttitudeSample {
                roll,
                pitch,
                yaw: self.yaw,
                rollspeed: roll_rate,
                pitchspeed: pitch_rate,
                yawspeed: yaw_rate,
            },
            battery: BatteryStatus {
                battery_remaining: self.battery_percent,
                voltages: vec![cell_mv * CELL_COUNT],
            },
            global_position: GlobalPositionInt {
                relative_alt: z * RELATIVE_ALT_PER_METER,
                vx: vx * 100.0,
                vy: vy * 100.0,
                vz: vz * 100.0,
                hdg: (self.yaw.to_degrees().rem_euclid(360.0) * 100.0).round() % 36000.0,
            },
            system_health: Some(SystemHealth { cpu_load, memory_usage: self.memory_usage }),
        }
    }

    fn step_velocity(&mut self, dt: f64) {
        for axis in 0..3 {
            let kick = self.rng.gen_range(-MAX_ACCEL_STEP..MAX_ACCEL_STEP);
            let pull = if axis < 2 { -HOME_PULL * self.position[axis] * dt } else { 0.0 };
            self.velocity[axis] += kick + pull;
        }

        // Steer back into the height band; flipping the sign keeps |v|
        let height = -self.position[2];
        if height <= MIN_HEIGHT_M + HEIGHT_MARGIN_M {
            self.velocity[2] = -self.velocity[2].abs();
        } else if height >= MAX_HEIGHT_M - HEIGHT_MARGIN_M {
            self.velocity[2] = self.velocity[2].abs();
        }

        let speed = norm(&self.velocity);
        if speed > self.params.max_speed {
            let scale = self.params.max_speed / speed;
            for v in &mut self.velocity {
                *v *= scale;
            }
        }
    }

    fn keep_height_in_bounds(&mut self) {
        self.position[2] = self.position[2].clamp(-MAX_HEIGHT_M, -MIN_HEIGHT_M);
    }
}

fn norm(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Wrap an angle in radians into `(-π, π]`.
fn wrap_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}
