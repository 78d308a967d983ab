//! # History Windowing & Downsampler
//!
//! Turns the stored snapshot history into the height-over-time trend.
//!
//! ## Transform
//!
//! 1. Elapsed seconds relative to the first record
//! 2. Height above ground is the inverted NED `z` (missing counts as 0)
//! 3. Keep the trailing `window_s` seconds before the latest record, with the
//!    lower bound clamped at 0
//! 4. Optionally average into at most `max_points` equal-width buckets
//!
//! The window slides with the newest record; it is not a calendar window.

pub mod store_trait;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::error::{Result, SkySyncError};
use crate::telemetry::types::parse_timestamp;
use store_trait::HistoryStore;

/// `position` as stored in a history record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPosition {
    #[serde(default)]
    pub z: Option<f64>,
}

/// One stored snapshot. Only the fields the trend needs are decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub position: Option<HistoryPosition>,
}

impl HistoryRecord {
    fn height(&self) -> f64 {
        -self.position.as_ref().and_then(|p| p.z).unwrap_or(0.0)
    }
}

/// Body of a history query response.
#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Vec<HistoryRecord>,
}

impl HistoryResponse {
    /// The records, if the backend reported success.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` for any status other than `"success"`.
    pub fn into_records(self) -> Result<Vec<HistoryRecord>> {
        if self.status == "success" {
            Ok(self.data)
        } else {
            Err(SkySyncError::unavailable(
                "history",
                format!("status {}", self.status),
            ))
        }
    }
}

/// Point of the height trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Seconds since the first record
    pub seconds: f64,
    /// Meters above ground
    pub height: f64,
}

/// Visible part of the trend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryWindow {
    points: Vec<TrendPoint>,
    min_second: f64,
    latest_second: f64,
}

impl HistoryWindow {
    /// Build the trailing window of `window_s` seconds from `records`.
    ///
    /// Records are expected oldest first. Records without a parseable
    /// timestamp are skipped.
    pub fn from_records(records: &[HistoryRecord], window_s: f64) -> Self {
        let mut start: Option<DateTime<Utc>> = None;
        let mut series = Vec::with_capacity(records.len());

        for record in records {
            let Some(ts) = record.timestamp.as_deref().and_then(parse_timestamp) else {
                warn!("Skipped history record with timestamp {:?}", record.timestamp);
                continue;
            };
            let start = *start.get_or_insert(ts);
            let seconds = (ts - start).num_milliseconds() as f64 / 1000.0;
            series.push(TrendPoint {
                seconds,
                height: record.height(),
            });
        }

        let latest_second = series.last().map_or(0.0, |p| p.seconds);
        let min_second = (latest_second - window_s).max(0.0);
        let points: Vec<_> = series.into_iter().filter(|p| p.seconds >= min_second).collect();

        debug!(
            "History window [{}, {}] with {} of {} records",
            min_second,
            latest_second,
            points.len(),
            records.len()
        );
        Self {
            points,
            min_second,
            latest_second,
        }
    }

    pub fn points(&self) -> &[TrendPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis domain `(min, latest)` in seconds.
    pub fn domain(&self) -> (f64, f64) {
        (self.min_second, self.latest_second)
    }

    /// Average the window into at most `max_points` equal-width buckets.
    ///
    /// Empty buckets produce no point, so gaps in the history stay visible.
    pub fn downsample(&self, max_points: usize) -> Vec<TrendPoint> {
        if max_points == 0 {
            return Vec::new();
        }
        if self.points.len() <= max_points {
            return self.points.clone();
        }

        let span = self.latest_second - self.min_second;
        let width = span / max_points as f64;
        let mut buckets = vec![(0.0, 0.0, 0usize); max_points];

        for p in &self.points {
            let idx = if width > 0.0 {
                (((p.seconds - self.min_second) / width) as usize).min(max_points - 1)
            } else {
                0
            };
            let bucket = &mut buckets[idx];
            bucket.0 += p.seconds;
            bucket.1 += p.height;
            bucket.2 += 1;
        }

        buckets
            .into_iter()
            .filter(|(_, _, n)| *n > 0)
            .map(|(s, h, n)| TrendPoint {
                seconds: s / n as f64,
                height: h / n as f64,
            })
            .collect()
    }
}

/// Axis label for `seconds`: `45s`, `2m`, `2m5s`.
pub fn format_time_label(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (m, s) = (total / 60, total % 60);
    match (m, s) {
        (0, s) => format!("{}s", s),
        (m, 0) => format!("{}m", m),
        (m, s) => format!("{}m{}s", m, s),
    }
}

/// Query the last `days` days and build the trailing window.
///
/// # Errors
///
/// Propagates the store's query error.
pub async fn load_window(
    store: &dyn HistoryStore,
    days: u32,
    window_s: f64,
) -> Result<HistoryWindow> {
    let records = store.query(days).await?;
    Ok(HistoryWindow::from_records(&records, window_s))
}

/// Reload and log the trend every `refresh_interval_ms`, in its own task.
pub fn spawn_trend_refresh(store: Arc<dyn HistoryStore>, config: HistoryConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(Duration::from_millis(config.refresh_interval_ms));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            match load_window(&*store, config.days, config.window_s).await {
                Ok(window) if window.is_empty() => info!("History trend: no data"),
                Ok(window) => {
                    let points = window.downsample(config.max_points);
                    let (from, to) = window.domain();
                    let height = points.last().map_or(0.0, |p| p.height);
                    info!(
                        "History trend {}..{}: {} points, latest height {:.2} m",
                        format_time_label(from),
                        format_time_label(to),
                        points.len(),
                        height
                    );
                }
                Err(e) => warn!("History refresh failed: {}", e),
            }
        }
    })
}
