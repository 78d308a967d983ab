//! # SkySync GCS Library
//!
//! Telemetry sync engine for a drone ground-control station.
//!
//! This library keeps a view model of the vehicle link and its telemetry in
//! sync with a ground-station backend: live pushes over a WebSocket, polled
//! snapshot endpoints with a simulated fallback, periodic history capture and
//! a windowed height trend.

pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod live;
pub mod poller;
pub mod scheduler;
pub mod simulator;
pub mod store;
pub mod telemetry;
