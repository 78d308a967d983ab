//! # Auto-Collect Scheduler
//!
//! Periodically asks the backend to append its current telemetry to the
//! history store.
//!
//! This module handles:
//! - Start/stop via [`AutoCollectScheduler::toggle`], with one immediate capture
//!   on start
//! - Single-shot captures that coalesce while one is outstanding
//! - Cancelling the pending repeat on stop and on drop
//!
//! A capture that already started when the schedule is stopped runs to
//! completion; its only effect is a log line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SkySyncError;
use crate::history::store_trait::HistoryStore;

/// Clears the in-flight flag when the capture ends, however it ends.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    /// Take the flag, or `None` if a capture is already outstanding.
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: Arc::clone(flag) })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Captures shared by the ticker and manual triggers.
#[derive(Clone)]
struct Collector {
    store: Arc<dyn HistoryStore>,
    in_flight: Arc<AtomicBool>,
}

impl Collector {
    /// Start a capture unless one is outstanding.
    ///
    /// The flag is taken before the first await, so two triggers in the same
    /// turn can never both start a capture.
    fn trigger(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("{}", SkySyncError::SchedulerOverlap);
            return None;
        };

        let store = Arc::clone(&self.store);
        Some(tokio::spawn(async move {
            let _guard = guard;
            match store.collect().await {
                Ok(()) => debug!("History snapshot captured"),
                Err(e) => warn!("History capture failed: {}", e),
            }
        }))
    }
}

/// Cancellable periodic capture.
pub struct AutoCollectScheduler {
    collector: Collector,
    interval: Duration,
    running: Arc<Mutex<bool>>,
    ticker: Option<JoinHandle<()>>,
}

impl AutoCollectScheduler {
    pub fn new(store: Arc<dyn HistoryStore>, interval: Duration) -> Self {
        Self {
            collector: Collector {
                store,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
            interval,
            running: Arc::new(Mutex::new(false)),
            ticker: None,
        }
    }

    fn set_running(&self, running: bool) {
        *self.running.lock().unwrap_or_else(|e| e.into_inner()) = running;
    }

    /// Clear the running flag, then abort the ticker. The ticker triggers
    /// only while holding the flag, so no capture starts once this returns.
    fn halt(&mut self) -> bool {
        self.set_running(false);
        match self.ticker.take() {
            Some(ticker) => {
                ticker.abort();
                true
            }
            None => false,
        }
    }

    /// Switch between stopped and running.
    ///
    /// # Returns
    ///
    /// `true` if the schedule is running afterwards
    pub fn toggle(&mut self) -> bool {
        if self.halt() {
            info!("Auto-collect stopped");
            return false;
        }

        self.set_running(true);
        self.collector.trigger();

        let collector = self.collector.clone();
        let running = Arc::clone(&self.running);
        let period = self.interval;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let still_running = running.lock().unwrap_or_else(|e| e.into_inner());
                if !*still_running {
                    break;
                }
                collector.trigger();
            }
        }));
        info!("Auto-collect started, every {:?}", self.interval);
        true
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Whether a capture is outstanding.
    pub fn is_collecting(&self) -> bool {
        self.collector.in_flight.load(Ordering::Acquire)
    }

    /// Capture once now.
    ///
    /// # Returns
    ///
    /// `false` if the call was coalesced into an outstanding capture
    pub fn collect_now(&self) -> bool {
        self.collector.trigger().is_some()
    }
}

impl Drop for AutoCollectScheduler {
    fn drop(&mut self) {
        self.halt();
    }
}
