//! # SkySync GCS
//!
//! Headless ground-station telemetry engine.
//!
//! Connects to the backend's live channel, polls the snapshot endpoints (with
//! simulated fallback), optionally links the vehicle and captures history,
//! and logs the resulting view model until Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use skysync_gcs::backend::BackendClient;
use skysync_gcs::config::{Config, LoggingConfig};
use skysync_gcs::connection::controller::ConnectionController;
use skysync_gcs::connection::LinkState;
use skysync_gcs::history::spawn_trend_refresh;
use skysync_gcs::live::LiveChannelSubscriber;
use skysync_gcs::poller::MultiSourcePoller;
use skysync_gcs::scheduler::AutoCollectScheduler;
use skysync_gcs::simulator::{FlightDataSimulator, SimulatorParams};
use skysync_gcs::store::{TelemetryStore, ViewModel};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Initialize logging: stdout always, plus a daily rolling file when a log
/// directory is configured.
///
/// The returned guard must live as long as the application so buffered file
/// output is flushed on exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    if config.directory.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, "skysync-gcs.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Some(guard)
}

/// Log what changed between two published view models.
fn log_view(previous: &ViewModel, current: &ViewModel) {
    if previous.link != current.link {
        info!(
            "Link {:?} (server: {}, vehicle: {})",
            current.link,
            current.connection.server_connected(),
            current.connection.vehicle_connected()
        );
    }
    if current.last_error.is_some() && previous.last_error != current.last_error {
        warn!("Link error: {}", current.last_error.as_deref().unwrap_or_default());
    }
    if previous.cycle != current.cycle {
        if let Some(params) = &current.parameters {
            debug!(
                "Cycle #{} {:?}: alt {:.2} m, hdg {:.1}°, gs {:.2} m/s, batt {:.2} V",
                current.cycle.unwrap_or_default(),
                current.parameters_source,
                params.altitude,
                params.heading,
                params.ground_speed(),
                params.battery_voltage
            );
        }
    }
    if previous.live.as_ref().map(|s| s.timestamp) != current.live.as_ref().map(|s| s.timestamp) {
        if let Some(live) = &current.live {
            debug!(
                "Live {}: roll {:.1}°, pitch {:.1}°, yaw {:.1}°, alt {:.2} m",
                live.timestamp, live.attitude.roll, live.attitude.pitch, live.attitude.yaw, live.altitude
            );
        }
    }
}

/// Main entry point for SkySync GCS
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument or `config/default.toml`)
///    - Set up logging
///    - Spawn the telemetry store, live channel subscriber and poller
///    - Start auto-collect if enabled
///    - Spawn the history trend refresh
///
/// 2. **Main Loop**
///    - Log view-model changes
///    - Link the vehicle on `server.auto_connect_port` once the backend is up
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or the HTTP client
/// cannot be created. Runtime failures degrade instead of exiting.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("SkySync GCS v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", config.server.base_url);

    let backend = Arc::new(BackendClient::new(&config)?);
    let (store, store_task) = TelemetryStore::spawn();

    let live = tokio::spawn(LiveChannelSubscriber::new(&config.server, store.clone()).run());

    let params = SimulatorParams::from_config(&config.simulator, config.poll_period().as_secs_f64());
    let poller = Arc::new(MultiSourcePoller::new(
        backend.clone(),
        FlightDataSimulator::new(params),
        &config.poller,
    ));
    let polling = tokio::spawn(poller.run(store.clone()));

    let controller = ConnectionController::new(backend.clone(), store.clone());
    let mut auto_connect = Some(config.server.auto_connect_port.clone()).filter(|p| !p.is_empty());

    let mut scheduler = AutoCollectScheduler::new(
        backend.clone(),
        Duration::from_millis(config.auto_collect.interval_ms),
    );
    if config.auto_collect.start_enabled {
        scheduler.toggle();
    }

    let trend = spawn_trend_refresh(backend.clone(), config.history.clone());
    let mut view = store.subscribe();
    let mut previous = ViewModel::default();

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    error!("Telemetry store stopped unexpectedly");
                    break;
                }
                let current = view.borrow_and_update().clone();
                log_view(&previous, &current);

                if current.link == LinkState::ServerConnected {
                    if let Some(port) = auto_connect.take() {
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            match controller.list_ports().await {
                                Ok(ports) => info!("Backend offers {} port(s)", ports.len()),
                                Err(e) => warn!("Port enumeration failed: {}", e),
                            }
                            if let Err(e) = controller.connect(&port).await {
                                warn!("Auto-connect to {} refused: {}", port, e);
                            }
                        });
                    }
                }
                previous = current;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    drop(scheduler);
    live.abort();
    polling.abort();
    trend.abort();
    drop(controller);
    drop(store);
    store_task.abort();

    info!("SkySync GCS stopped");
    Ok(())
}
