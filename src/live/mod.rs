//! # Live Channel Subscriber
//!
//! Keeps a WebSocket to the backend open and forwards every pushed payload to
//! the store. The backend emits the current telemetry plus a `connected` flag
//! roughly twice a second, either bare or wrapped as
//! `["telemetry_data", {...}]`.
//!
//! This module handles:
//! - Connection lifecycle (`ServerConnecting`, `ServerUp`, `ServerLost`)
//! - Reconnecting after a fixed pause, forever
//! - Liveness: a bounded handshake, periodic pings, and a silence deadline
//! - Decoding payloads into normalized snapshots (attitude arrives in radians)

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{interval_at, sleep_until, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::LinkEvent;
use crate::error::{Result, SkySyncError};
use crate::store::{StoreHandle, StoreUpdate};
use crate::telemetry::types::parse_timestamp;
use crate::telemetry::units::{rad_to_deg, wrap_degrees};
use crate::telemetry::{
    AngularRates, Attitude, Position, SystemHealth, TelemetrySnapshot, Velocity,
};

/// Event name of telemetry pushes.
pub const TELEMETRY_EVENT: &str = "telemetry_data";

/// WebSocket URL for `path` on the backend at `base_url`.
pub fn ws_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let origin = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", origin, path)
}

/// One nested object of the payload (`attitude`, `position`, ...).
type Group = HashMap<String, Option<f64>>;

fn field(group: &Option<Group>, key: &str) -> f64 {
    group
        .as_ref()
        .and_then(|g| g.get(key).copied().flatten())
        .unwrap_or(0.0)
}

/// Payload pushed on the live channel. Any field may be null.
#[derive(Debug, Default, Deserialize)]
struct LivePayload {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    attitude: Option<Group>,
    #[serde(default)]
    angular_rates: Option<Group>,
    #[serde(default)]
    position: Option<Group>,
    #[serde(default)]
    velocity: Option<Group>,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
    #[serde(default)]
    battery_voltage: Option<f64>,
    #[serde(default)]
    connected: bool,
}

impl LivePayload {
    /// Normalized snapshot, if the payload carries a usable timestamp.
    fn snapshot(&self) -> Option<TelemetrySnapshot> {
        let timestamp = parse_timestamp(self.timestamp.as_deref()?)?;
        let att = &self.attitude;
        let rates = &self.angular_rates;

        Some(TelemetrySnapshot {
            timestamp,
            attitude: Attitude {
                roll: rad_to_deg(field(att, "roll")),
                pitch: rad_to_deg(field(att, "pitch")),
                yaw: rad_to_deg(field(att, "yaw")),
            },
            angular_rates: AngularRates {
                omega_x: rad_to_deg(field(rates, "omega_x")),
                omega_y: rad_to_deg(field(rates, "omega_y")),
                omega_z: rad_to_deg(field(rates, "omega_z")),
            },
            position: Position {
                x: field(&self.position, "x"),
                y: field(&self.position, "y"),
                z: field(&self.position, "z"),
            },
            velocity: Velocity {
                vx: field(&self.velocity, "vx"),
                vy: field(&self.velocity, "vy"),
                vz: field(&self.velocity, "vz"),
            },
            altitude: self.altitude.unwrap_or(0.0),
            heading: wrap_degrees(self.heading.unwrap_or(0.0)),
            battery_voltage: self.battery_voltage.unwrap_or(0.0),
            battery_remaining: None,
            system_health: SystemHealth::default(),
        })
    }
}

/// Decode one text frame into a store update.
///
/// Returns `None` for frames that are not telemetry (other events, malformed
/// JSON). A telemetry frame without a timestamp still reports the vehicle flag.
pub fn decode_frame(text: &str) -> Option<StoreUpdate> {
    let value: Value = serde_json::from_str(text).ok()?;

    let body = match value {
        Value::Array(mut items) => {
            if items.len() != 2 || items[0].as_str() != Some(TELEMETRY_EVENT) {
                return None;
            }
            items.pop()?
        }
        object @ Value::Object(_) => object,
        _ => return None,
    };

    let payload: LivePayload = serde_json::from_value(body).ok()?;
    Some(StoreUpdate::Live {
        snapshot: payload.snapshot(),
        vehicle_connected: payload.connected,
    })
}

/// Reconnecting consumer of the backend's push channel.
pub struct LiveChannelSubscriber {
    url: String,
    handshake_timeout: Duration,
    reconnect_interval: Duration,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    store: StoreHandle,
}

impl LiveChannelSubscriber {
    pub fn new(config: &ServerConfig, store: StoreHandle) -> Self {
        Self {
            url: ws_url(&config.base_url, &config.live_path),
            handshake_timeout: Duration::from_millis(config.request_timeout_ms),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            keepalive_interval: Duration::from_millis(config.keepalive_interval_ms),
            keepalive_timeout: Duration::from_millis(config.keepalive_timeout_ms),
            store,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, forward frames, and reconnect until the store goes away.
    pub async fn run(self) {
        info!("Live channel subscriber for {}", self.url);

        while !self.store.is_closed() {
            if self.store.send(StoreUpdate::Link(LinkEvent::ServerConnecting)).await.is_err() {
                break;
            }

            match self.session().await {
                Ok(()) => info!("Live channel closed by backend"),
                Err(e) => warn!("Live channel: {}", e),
            }

            if self.store.send(StoreUpdate::Link(LinkEvent::ServerLost)).await.is_err() {
                break;
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
        info!("Live channel subscriber stopped");
    }

    /// One connection, until the backend closes it, errors or goes silent.
    async fn session(&self) -> Result<()> {
        let (ws, _) = timeout(self.handshake_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                SkySyncError::unavailable(
                    "live channel",
                    format!("no handshake within {:?}", self.handshake_timeout),
                )
            })??;
        info!("Live channel connected to {}", self.url);
        self.store.send(StoreUpdate::Link(LinkEvent::ServerUp)).await?;

        let (mut sink, mut stream) = ws.split();
        let mut pings = interval_at(Instant::now() + self.keepalive_interval, self.keepalive_interval);
        let mut deadline = Instant::now() + self.keepalive_timeout;

        loop {
            tokio::select! {
                _ = pings.tick() => sink.send(Message::Ping(Vec::new())).await?,

                _ = sleep_until(deadline) => {
                    return Err(SkySyncError::unavailable(
                        "live channel",
                        format!("silent for {:?}", self.keepalive_timeout),
                    ));
                }

                message = stream.next() => {
                    let Some(message) = message else {
                        return Ok(());
                    };
                    let message = message?;
                    deadline = Instant::now() + self.keepalive_timeout;

                    if message.is_close() {
                        return Ok(());
                    }
                    if !message.is_text() {
                        continue;
                    }
                    match decode_frame(message.to_text()?) {
                        Some(update) => self.store.send(update).await?,
                        None => debug!("Ignored live frame"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LinkState;
    use crate::store::TelemetryStore;
    use tokio::net::TcpListener;

    fn server_config(addr: std::net::SocketAddr) -> ServerConfig {
        ServerConfig {
            base_url: format!("http://{}", addr),
            live_path: "/".to_string(),
            request_timeout_ms: 2000,
            reconnect_interval_ms: 60_000,
            keepalive_interval_ms: 100,
            keepalive_timeout_ms: 300,
            auto_connect_port: String::new(),
        }
    }

    const FRAME: &str = r#"{
        "timestamp": "2025-06-01 12:00:00",
        "attitude": {"roll": 1.5708, "pitch": 0.0, "yaw": -1.5708},
        "angular_rates": {"omega_x": 0.1, "omega_y": null, "omega_z": 0.0},
        "position": {"x": 1.5, "y": -2.0, "z": -10.0},
        "velocity": {"vx": 1.0, "vy": 0.5, "vz": 0.0},
        "altitude": 10.2,
        "heading": 271.0,
        "battery_voltage": 15.9,
        "connected": true
    }"#;

    #[test]
    fn test_ws_url() {
        assert_eq!(ws_url("http://localhost:5001", "/ws"), "ws://localhost:5001/ws");
        assert_eq!(ws_url("https://gcs.example.org/", "/live"), "wss://gcs.example.org/live");
    }

    #[test]
    fn test_decode_bare_payload() {
        let Some(StoreUpdate::Live { snapshot, vehicle_connected }) = decode_frame(FRAME) else {
            panic!("expected a live update");
        };
        assert!(vehicle_connected);

        let snap = snapshot.unwrap();
        assert!((snap.attitude.roll - 90.0).abs() < 0.1);
        assert!((snap.attitude.yaw + 90.0).abs() < 0.1);
        assert_eq!(snap.angular_rates.omega_y, 0.0);
        assert_eq!(snap.position.z, -10.0);
        assert_eq!(snap.altitude, 10.2);
        assert_eq!(snap.heading, 271.0);
        assert_eq!(snap.battery_voltage, 15.9);
        assert!(snap.battery_remaining.is_none());
    }

    #[test]
    fn test_decode_event_envelope() {
        let text = format!(r#"["telemetry_data", {}]"#, FRAME);
        assert!(matches!(
            decode_frame(&text),
            Some(StoreUpdate::Live { snapshot: Some(_), vehicle_connected: true })
        ));
    }

    #[test]
    fn test_decode_ignores_other_events() {
        let text = format!(r#"["status", {}]"#, FRAME);
        assert!(decode_frame(&text).is_none());
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame("42").is_none());
    }

    #[test]
    fn test_decode_idle_payload() {
        // Sent before the vehicle ever reported: every field null
        let text = r#"{"timestamp": null, "attitude": {"roll": null, "pitch": null, "yaw": null},
                      "altitude": null, "connected": false}"#;
        assert!(matches!(
            decode_frame(text),
            Some(StoreUpdate::Live { snapshot: None, vehicle_connected: false })
        ));
    }

    #[tokio::test]
    async fn test_subscriber_forwards_frames_and_reports_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(FRAME.into())).await.unwrap();
            let _ = ws.close(None).await;
        });

        let (store, _task) = TelemetryStore::spawn();
        let subscriber = LiveChannelSubscriber::new(&server_config(addr), store.clone());
        assert_eq!(subscriber.url(), format!("ws://{}/", addr));
        let client = tokio::spawn(subscriber.run());

        let mut view = store.subscribe();
        let frozen = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                view.changed().await.unwrap();
                let current = view.borrow().clone();
                if current.live.is_some() && current.link == LinkState::Idle {
                    return current;
                }
            }
        })
        .await
        .expect("live sample then backend loss");

        // Lost backend: both flags down, last sample kept
        assert!(!frozen.connection.server_connected());
        assert!((frozen.live.unwrap().attitude.roll - 90.0).abs() < 0.1);

        server.await.unwrap();
        client.abort();
    }

    #[tokio::test]
    async fn test_silent_backend_is_reported_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Completes the handshake, then never reads or writes again
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let (store, _task) = TelemetryStore::spawn();
        let client = tokio::spawn(LiveChannelSubscriber::new(&server_config(addr), store.clone()).run());

        let mut view = store.subscribe();
        let mut seen_up = false;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                view.changed().await.unwrap();
                let link = view.borrow().link;
                if link == LinkState::ServerConnected {
                    seen_up = true;
                } else if seen_up && link == LinkState::Idle {
                    return;
                }
            }
        })
        .await
        .expect("backend reported lost after going silent");

        assert!(!store.snapshot().connection.server_connected());
        client.abort();
        server.abort();
    }

    #[tokio::test]
    async fn test_handshake_is_bounded() {
        // Accepts TCP but never answers the upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let (store, _task) = TelemetryStore::spawn();
        let mut config = server_config(addr);
        config.request_timeout_ms = 200;
        let subscriber = LiveChannelSubscriber::new(&config, store);

        let result = tokio::time::timeout(Duration::from_secs(5), subscriber.session())
            .await
            .expect("handshake gave up");
        assert!(matches!(result, Err(SkySyncError::SourceUnavailable { .. })));
        server.abort();
    }
}
