//! # Connection Module
//!
//! Backend-link and vehicle-link status.
//!
//! This module handles:
//! - The link state machine ([`ConnectionStateMachine`])
//! - The remote vehicle-link capability ([`link_trait::VehicleLink`])
//! - Operator-facing connect/disconnect ([`controller::ConnectionController`])
//!
//! ## States
//!
//! ```text
//! Idle ─► ServerConnecting ─► ServerConnected ─► VehicleConnecting ─► VehicleConnected
//!   ▲                               ▲   ▲                │                 │
//!   │                               │   └── failure ─────┘                 ▼
//!   │                               └────────────────────────── VehicleDisconnecting
//!   └──────────── backend lost (from any state)
//! ```
//!
//! [`ConnectionState`] is derived from [`LinkState`], so a vehicle link can
//! never be reported without a backend link.

pub mod controller;
pub mod link_trait;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SkySyncError};

/// Position in the link lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No backend link (never connected or lost)
    #[default]
    Idle,
    ServerConnecting,
    ServerConnected,
    VehicleConnecting,
    VehicleConnected,
    VehicleDisconnecting,
}

impl LinkState {
    /// The two operator-visible link flags.
    pub fn connection(self) -> ConnectionState {
        let server_connected = !matches!(self, LinkState::Idle | LinkState::ServerConnecting);
        let vehicle_connected =
            matches!(self, LinkState::VehicleConnected | LinkState::VehicleDisconnecting);
        ConnectionState {
            server_connected,
            vehicle_connected,
        }
    }
}

/// Backend and vehicle link flags. `vehicle_connected` implies `server_connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    server_connected: bool,
    vehicle_connected: bool,
}

impl ConnectionState {
    pub fn server_connected(&self) -> bool {
        self.server_connected
    }

    pub fn vehicle_connected(&self) -> bool {
        self.vehicle_connected
    }
}

/// Inputs to the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Live channel connection attempt started
    ServerConnecting,
    /// Live channel is up
    ServerUp,
    /// Live channel dropped
    ServerLost,
    /// Vehicle flag carried by a live payload
    VehicleReported(bool),
    /// Operator asked to link the vehicle on this port
    ConnectRequested(String),
    ConnectSucceeded,
    ConnectFailed(String),
    /// Operator asked to unlink the vehicle
    DisconnectRequested,
    DisconnectSucceeded,
    DisconnectFailed(String),
}

/// Link state plus the last operator-visible failure.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: LinkState,
    last_error: Option<String>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one event and return the resulting state.
    ///
    /// Results that arrive for a request no longer pending (for example a
    /// connect success after the backend was lost) leave the state unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SkySyncError::ConnectionRejected`] when a connect is requested
    /// without a backend link, with an empty port or while the vehicle link is
    /// busy, and when a disconnect is requested without a vehicle link.
    pub fn apply(&mut self, event: LinkEvent) -> Result<LinkState> {
        use LinkState::*;

        let next = match (&event, self.state) {
            (LinkEvent::ServerConnecting, Idle) => ServerConnecting,
            (LinkEvent::ServerUp, Idle | ServerConnecting) => ServerConnected,
            (LinkEvent::ServerLost, _) => Idle,

            (LinkEvent::VehicleReported(true), ServerConnected) => VehicleConnected,
            (LinkEvent::VehicleReported(false), VehicleConnected) => ServerConnected,

            (LinkEvent::ConnectRequested(port), state) => {
                if !state.connection().server_connected() {
                    return Err(SkySyncError::ConnectionRejected(
                        "backend is not connected".to_string(),
                    ));
                }
                if port.trim().is_empty() {
                    return Err(SkySyncError::ConnectionRejected(
                        "port name required".to_string(),
                    ));
                }
                if state != ServerConnected {
                    return Err(SkySyncError::ConnectionRejected(format!(
                        "vehicle link busy ({:?})",
                        state
                    )));
                }
                self.last_error = None;
                VehicleConnecting
            }
            (LinkEvent::ConnectSucceeded, VehicleConnecting) => VehicleConnected,
            (LinkEvent::ConnectFailed(reason), VehicleConnecting) => {
                self.last_error = Some(reason.clone());
                ServerConnected
            }

            (LinkEvent::DisconnectRequested, VehicleConnected) => {
                self.last_error = None;
                VehicleDisconnecting
            }
            (LinkEvent::DisconnectRequested, _) => {
                return Err(SkySyncError::ConnectionRejected(
                    "vehicle is not connected".to_string(),
                ));
            }
            (LinkEvent::DisconnectSucceeded, VehicleDisconnecting) => ServerConnected,
            (LinkEvent::DisconnectFailed(reason), VehicleDisconnecting) => {
                self.last_error = Some(reason.clone());
                VehicleConnected
            }

            (_, unchanged) => unchanged,
        };

        if next != self.state {
            debug!("Link state {:?} -> {:?} on {:?}", self.state, next, event);
        }
        self.state = next;
        Ok(next)
    }
}
