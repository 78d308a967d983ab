//! # Multi-Source Poller
//!
//! Polls the named snapshot endpoints once per period and commits one
//! normalized snapshot per cycle to the store.
//!
//! This module handles:
//! - Concurrent fan-out to every endpoint, each bounded by a timeout shorter
//!   than the period
//! - Fallback to the flight data simulator for degraded sources
//! - Cycle sequencing, so the store can drop cycles that resolve late
//!
//! ## Fallback policies
//!
//! | Policy | Degraded cycle becomes |
//! |--------|------------------------|
//! | `WholeCycle` | one full simulator tick (`Simulated`) |
//! | `PerEndpoint` | real slices plus simulated stand-ins (`Mixed`) |

pub mod source_trait;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{FallbackPolicy, PollerConfig};
use crate::error::{Result, SkySyncError};
use crate::simulator::FlightDataSimulator;
use crate::store::{CycleOutcome, StoreHandle, StoreUpdate};
use crate::telemetry::raw::PartialFrame;
use crate::telemetry::units::normalize_frame;
use crate::telemetry::DataSource;
use source_trait::SnapshotSource;

/// Named snapshot endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    LocalPositionNed,
    Attitude,
    BatteryStatus,
    GlobalPositionInt,
}

impl Endpoint {
    /// Every endpoint polled in a cycle.
    pub const ALL: [Endpoint; 4] = [
        Endpoint::LocalPositionNed,
        Endpoint::Attitude,
        Endpoint::BatteryStatus,
        Endpoint::GlobalPositionInt,
    ];

    /// Name used in the endpoint path.
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::LocalPositionNed => "LOCAL_POSITION_NED",
            Endpoint::Attitude => "ATTITUDE",
            Endpoint::BatteryStatus => "BATTERY_STATUS",
            Endpoint::GlobalPositionInt => "GLOBAL_POSITION_INT",
        }
    }

    /// Decode a response body into this endpoint's slice of `frame`.
    fn decode_into(self, body: Value, frame: &mut PartialFrame) -> Result<()> {
        match self {
            Endpoint::LocalPositionNed => frame.local_position = Some(serde_json::from_value(body)?),
            Endpoint::Attitude => frame.attitude = Some(serde_json::from_value(body)?),
            Endpoint::BatteryStatus => frame.battery = Some(serde_json::from_value(body)?),
            Endpoint::GlobalPositionInt => frame.global_position = Some(serde_json::from_value(body)?),
        }
        Ok(())
    }
}

/// One resolved cycle plus the sources that failed in it.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub degraded: Vec<Endpoint>,
}

/// Fan-out poller with simulator fallback.
pub struct MultiSourcePoller {
    source: Arc<dyn SnapshotSource>,
    simulator: Mutex<FlightDataSimulator>,
    period: Duration,
    timeout: Duration,
    policy: FallbackPolicy,
    next_seq: AtomicU64,
}

impl MultiSourcePoller {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        simulator: FlightDataSimulator,
        config: &PollerConfig,
    ) -> Self {
        Self {
            source,
            simulator: Mutex::new(simulator),
            period: Duration::from_millis(config.period_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            policy: config.fallback,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Run one cycle now.
    pub async fn poll_cycle(&self) -> CycleReport {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.execute(seq, Utc::now()).await
    }

    /// Poll every period until the store goes away.
    ///
    /// Each cycle runs in its own task so a slow cycle never delays the next
    /// start. Sequence numbers are assigned here, in start order. Cycle tasks
    /// belong to this future and are aborted with it.
    pub async fn run(self: Arc<Self>, store: StoreHandle) {
        info!(
            "Polling {} endpoints every {:?} (timeout {:?}, {:?} fallback)",
            Endpoint::ALL.len(),
            self.period,
            self.timeout,
            self.policy
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cycles = JoinSet::new();
        while !store.is_closed() {
            ticker.tick().await;
            while cycles.try_join_next().is_some() {}

            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let started_at = Utc::now();
            let poller = Arc::clone(&self);
            let store = store.clone();

            cycles.spawn(async move {
                let report = poller.execute(seq, started_at).await;
                if store.send(StoreUpdate::Cycle(report.outcome)).await.is_err() {
                    debug!("Store closed, cycle #{} discarded", seq);
                }
            });
        }
        info!("Poller stopped");
    }

    async fn execute(&self, seq: u64, started_at: DateTime<Utc>) -> CycleReport {
        let results = join_all(Endpoint::ALL.iter().map(|&endpoint| self.fetch(endpoint))).await;

        let mut partial = PartialFrame::default();
        let mut degraded = Vec::new();
        for (endpoint, result) in Endpoint::ALL.into_iter().zip(results) {
            if let Err(e) = result.and_then(|body| endpoint.decode_into(body, &mut partial)) {
                warn!("Cycle #{}: {}", seq, e);
                degraded.push(endpoint);
            }
        }

        let (frame, source) = match partial.clone().complete() {
            Some(frame) => (frame, DataSource::Polled),
            None => {
                let failure = SkySyncError::PartialCycleFailure {
                    degraded: degraded.iter().map(|e| e.name().to_string()).collect(),
                };
                warn!("Cycle #{}: {}", seq, failure);

                let tick = self.simulator.lock().await.tick();
                match self.policy {
                    FallbackPolicy::PerEndpoint if degraded.len() < Endpoint::ALL.len() => {
                        (partial.fill_from(tick), DataSource::Mixed)
                    }
                    _ => (tick, DataSource::Simulated),
                }
            }
        };

        debug!("Cycle #{} resolved as {:?}", seq, source);
        CycleReport {
            outcome: CycleOutcome {
                seq,
                snapshot: normalize_frame(&frame, started_at),
                source,
            },
            degraded,
        }
    }

    async fn fetch(&self, endpoint: Endpoint) -> Result<Value> {
        match tokio::time::timeout(self.timeout, self.source.fetch(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(SkySyncError::unavailable(
                endpoint.name(),
                format!("no answer within {:?}", self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::source_trait::mocks::MockSnapshotSource;
    use super::*;
    use crate::simulator::SimulatorParams;
    use crate::store::TelemetryStore;

    fn poller_config(fallback: FallbackPolicy) -> PollerConfig {
        PollerConfig {
            period_ms: 1000,
            timeout_ms: 800,
            snapshot_base: "/params".to_string(),
            fallback,
        }
    }

    fn poller(source: &MockSnapshotSource, fallback: FallbackPolicy) -> MultiSourcePoller {
        MultiSourcePoller::new(
            Arc::new(source.clone()),
            FlightDataSimulator::new(SimulatorParams::default()),
            &poller_config(fallback),
        )
    }

    #[test]
    fn test_endpoint_names() {
        let names: Vec<_> = Endpoint::ALL.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            ["LOCAL_POSITION_NED", "ATTITUDE", "BATTERY_STATUS", "GLOBAL_POSITION_INT"]
        );
    }

    #[tokio::test]
    async fn test_all_sources_healthy() {
        let source = MockSnapshotSource::healthy();
        let report = poller(&source, FallbackPolicy::WholeCycle).poll_cycle().await;

        assert!(report.degraded.is_empty());
        assert_eq!(report.outcome.source, DataSource::Polled);
        assert_eq!(report.outcome.seq, 1);

        let snap = &report.outcome.snapshot;
        assert!((snap.attitude.roll - 90.0).abs() < 0.1);
        assert_eq!(snap.altitude, 12.0);
        assert_eq!(snap.heading, 90.0);
        assert_eq!(snap.battery_voltage, 15.8);
        assert_eq!(snap.battery_remaining, Some(81.0));
        assert_eq!(source.get_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_one_failure_replaces_whole_cycle() {
        let source = MockSnapshotSource::healthy();
        source.set_failing(Endpoint::BatteryStatus);

        let report = poller(&source, FallbackPolicy::WholeCycle).poll_cycle().await;

        assert_eq!(report.degraded, vec![Endpoint::BatteryStatus]);
        assert_eq!(report.outcome.source, DataSource::Simulated);

        // Exactly one full simulator tick, none of the three real slices
        let mut reference = FlightDataSimulator::new(SimulatorParams::default());
        let expected = normalize_frame(&reference.tick(), report.outcome.snapshot.timestamp);
        assert_eq!(report.outcome.snapshot, expected);
        assert_ne!(report.outcome.snapshot.altitude, 12.0);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_degraded() {
        let source = MockSnapshotSource::healthy();
        source.set_response(Endpoint::Attitude, serde_json::json!({"status": "error"}));

        let report = poller(&source, FallbackPolicy::WholeCycle).poll_cycle().await;
        assert_eq!(report.degraded, vec![Endpoint::Attitude]);
        assert_eq!(report.outcome.source, DataSource::Simulated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_endpoint_times_out() {
        let source = MockSnapshotSource::healthy();
        source.set_stalled(Endpoint::GlobalPositionInt);

        let started = tokio::time::Instant::now();
        let report = poller(&source, FallbackPolicy::WholeCycle).poll_cycle().await;

        assert_eq!(report.degraded, vec![Endpoint::GlobalPositionInt]);
        assert_eq!(report.outcome.source, DataSource::Simulated);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_per_endpoint_keeps_real_slices() {
        let source = MockSnapshotSource::healthy();
        source.set_failing(Endpoint::BatteryStatus);

        let report = poller(&source, FallbackPolicy::PerEndpoint).poll_cycle().await;
        assert_eq!(report.outcome.source, DataSource::Mixed);

        let snap = &report.outcome.snapshot;
        assert!((snap.attitude.roll - 90.0).abs() < 0.1);
        assert_eq!(snap.altitude, 12.0);
        assert_ne!(snap.battery_remaining, Some(81.0));
    }

    #[tokio::test]
    async fn test_per_endpoint_with_every_source_down() {
        let source = MockSnapshotSource::default();
        let report = poller(&source, FallbackPolicy::PerEndpoint).poll_cycle().await;

        assert_eq!(report.degraded.len(), 4);
        assert_eq!(report.outcome.source, DataSource::Simulated);
    }

    #[tokio::test]
    async fn test_simulator_advances_once_per_fallback_cycle() {
        let source = MockSnapshotSource::default();
        let poller = poller(&source, FallbackPolicy::WholeCycle);

        let first = poller.poll_cycle().await;
        let second = poller.poll_cycle().await;

        let mut reference = FlightDataSimulator::new(SimulatorParams::default());
        reference.tick();
        let expected = normalize_frame(&reference.tick(), second.outcome.snapshot.timestamp);

        assert_eq!(first.outcome.seq + 1, second.outcome.seq);
        assert_eq!(second.outcome.snapshot, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_commits_cycles_in_order() {
        let (store, _task) = TelemetryStore::spawn();
        let source = MockSnapshotSource::healthy();
        let poller = Arc::new(poller(&source, FallbackPolicy::WholeCycle));

        let runner = tokio::spawn(Arc::clone(&poller).run(store.clone()));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        runner.abort();

        let view = store.snapshot();
        assert!(view.cycle.unwrap() >= 2);
        assert_eq!(view.parameters_source, Some(DataSource::Polled));
        assert!((view.parameters.unwrap().attitude.roll - 90.0).abs() < 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborting_run_cancels_in_flight_cycles() {
        let (store, _task) = TelemetryStore::spawn();
        let source = MockSnapshotSource::healthy();
        source.set_stalled(Endpoint::Attitude);
        let poller = Arc::new(poller(&source, FallbackPolicy::WholeCycle));

        let runner = tokio::spawn(Arc::clone(&poller).run(store.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.get_calls().len(), 4);
        runner.abort();

        // The stalled cycle would have timed out into a simulated commit
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(store.snapshot().cycle.is_none());
        assert_eq!(source.get_calls().len(), 4);
    }
}
