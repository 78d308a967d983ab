//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SkySyncError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub poller: PollerConfig,
    pub simulator: SimulatorConfig,
    pub auto_collect: AutoCollectConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

/// Backend service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_live_path")]
    pub live_path: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Ping period on the live channel
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Live channel silence, pongs included, after which the backend is lost
    #[serde(default = "default_keepalive_timeout_ms")]
    pub keepalive_timeout_ms: u64,

    /// Port to connect the vehicle to once the backend is reachable (empty = manual)
    #[serde(default)]
    pub auto_connect_port: String,
}

/// How a poll cycle with degraded sources is resolved
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Any degraded source replaces the whole cycle with one simulator tick
    #[default]
    WholeCycle,
    /// Only degraded sources are replaced, real slices are kept
    PerEndpoint,
}

/// Snapshot poller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poll_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_snapshot_base")]
    pub snapshot_base: String,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

/// Flight data simulator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    #[serde(default = "default_max_tilt_deg")]
    pub max_tilt_deg: f64,

    #[serde(default = "default_battery_floor_percent")]
    pub battery_floor_percent: f64,

    #[serde(default = "default_battery_drain_per_tick")]
    pub battery_drain_per_tick: f64,
}

/// Auto-collect scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AutoCollectConfig {
    #[serde(default = "default_collect_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub start_enabled: bool,
}

/// History trend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,

    #[serde(default = "default_history_days")]
    pub days: u32,

    #[serde(default = "default_window_s")]
    pub window_s: f64,

    #[serde(default = "default_max_points")]
    pub max_points: usize,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files (empty = stdout only)
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:5001".to_string() }
fn default_live_path() -> String { "/ws".to_string() }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_reconnect_interval_ms() -> u64 { 800 }
fn default_keepalive_interval_ms() -> u64 { 5000 }
fn default_keepalive_timeout_ms() -> u64 { 15000 }

fn default_poll_period_ms() -> u64 { 1000 }
fn default_poll_timeout_ms() -> u64 { 800 }
fn default_snapshot_base() -> String { "/params".to_string() }

fn default_seed() -> u64 { 42 }
fn default_max_speed() -> f64 { 5.0 }
fn default_max_tilt_deg() -> f64 { 15.0 }
fn default_battery_floor_percent() -> f64 { 10.0 }
fn default_battery_drain_per_tick() -> f64 { 0.02 }

fn default_collect_interval_ms() -> u64 { 5000 }

fn default_history_path() -> String { "/api/history-data".to_string() }
fn default_history_days() -> u32 { 1 }
fn default_window_s() -> f64 { 300.0 }
fn default_max_points() -> usize { 150 }
fn default_refresh_interval_ms() -> u64 { 10000 }

fn invalid(msg: impl std::fmt::Display) -> SkySyncError {
    SkySyncError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use skysync_gcs::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Poll period as a [`Duration`]
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poller.period_ms)
    }

    /// Per-request poll timeout as a [`Duration`]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poller.timeout_ms)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if !(self.server.base_url.starts_with("http://") || self.server.base_url.starts_with("https://")) {
            return Err(invalid("base_url must start with http:// or https://"));
        }

        if !self.server.live_path.starts_with('/') {
            return Err(invalid("live_path must start with '/'"));
        }

        if self.server.request_timeout_ms == 0 || self.server.request_timeout_ms > 60000 {
            return Err(invalid("request_timeout_ms must be between 1 and 60000"));
        }

        if self.server.reconnect_interval_ms == 0 || self.server.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.server.keepalive_interval_ms == 0 || self.server.keepalive_interval_ms > 60000 {
            return Err(invalid("keepalive_interval_ms must be between 1 and 60000"));
        }

        if self.server.keepalive_timeout_ms <= self.server.keepalive_interval_ms {
            return Err(invalid("keepalive_timeout_ms must be greater than keepalive_interval_ms"));
        }

        if self.poller.period_ms < 100 || self.poller.period_ms > 60000 {
            return Err(invalid("poller period_ms must be between 100 and 60000"));
        }

        // A stalled endpoint must never stall the cycle
        if self.poller.timeout_ms == 0 || self.poller.timeout_ms >= self.poller.period_ms {
            return Err(invalid("poller timeout_ms must be at least 1 and strictly less than period_ms"));
        }

        if !self.poller.snapshot_base.starts_with('/') {
            return Err(invalid("snapshot_base must start with '/'"));
        }

        if self.simulator.max_speed <= 0.0 || self.simulator.max_speed > 50.0 {
            return Err(invalid("simulator max_speed must be in (0.0, 50.0]"));
        }

        if self.simulator.max_tilt_deg <= 0.0 || self.simulator.max_tilt_deg > 45.0 {
            return Err(invalid("simulator max_tilt_deg must be in (0.0, 45.0]"));
        }

        if !(0.0..100.0).contains(&self.simulator.battery_floor_percent) {
            return Err(invalid("battery_floor_percent must be between 0.0 and 100.0"));
        }

        if self.simulator.battery_drain_per_tick < 0.0 || self.simulator.battery_drain_per_tick > 10.0 {
            return Err(invalid("battery_drain_per_tick must be between 0.0 and 10.0"));
        }

        if self.auto_collect.interval_ms < 100 || self.auto_collect.interval_ms > 3_600_000 {
            return Err(invalid("auto_collect interval_ms must be between 100 and 3600000"));
        }

        if !self.history.path.starts_with('/') {
            return Err(invalid("history path must start with '/'"));
        }

        if self.history.days == 0 || self.history.days > 365 {
            return Err(invalid("history days must be between 1 and 365"));
        }

        if self.history.window_s <= 0.0 {
            return Err(invalid("history window_s must be greater than 0"));
        }

        if self.history.max_points < 2 {
            return Err(invalid("history max_points must be at least 2"));
        }

        if self.history.refresh_interval_ms == 0 {
            return Err(invalid("history refresh_interval_ms must be greater than 0"));
        }

        Ok(())
    }
}
