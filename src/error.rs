//! # Error Types
//!
//! Custom error types for SkySync GCS using `thiserror`.
//!
//! Source-level variants (`Transport`, `WebSocket`, `SourceUnavailable`,
//! `PartialCycleFailure`) are caught at the poller and live-channel boundary
//! and never reach the view model. `ConnectionRejected` is the only variant
//! surfaced to the operator.

use thiserror::Error;

/// Main error type for SkySync GCS
#[derive(Debug, Error)]
pub enum SkySyncError {
    /// HTTP transport errors (connection refused, timeout, bad body)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Live channel transport errors
    #[error("Live channel error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A single snapshot source answered with a non-success status or timed out
    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// At least one source of a poll cycle was degraded
    #[error("Poll cycle degraded ({} sources): {}", degraded.len(), degraded.join(", "))]
    PartialCycleFailure { degraded: Vec<String> },

    /// Connect/disconnect refused, locally or by the backend
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// A capture was requested while another one was still in flight
    #[error("Capture already in flight")]
    SchedulerOverlap,

    /// The telemetry store task is gone
    #[error("Telemetry store is closed")]
    StoreClosed,

    /// Payload decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkySyncError {
    /// Shorthand for [`SkySyncError::SourceUnavailable`].
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for SkySync GCS
pub type Result<T> = std::result::Result<T, SkySyncError>;
