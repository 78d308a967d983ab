//! # Backend Client
//!
//! HTTP adapter for the ground-station backend. One `reqwest::Client` serves
//! the vehicle link, the snapshot endpoints and the history store.
//!
//! | Capability | Request |
//! |------------|---------|
//! | list ports | `GET /api/ports` |
//! | connect | `POST /api/connect` `{port}` |
//! | disconnect | `POST /api/disconnect` |
//! | snapshot | `GET {snapshot_base}/{NAME}.json?t=<ms>` |
//! | history | `GET {history_path}?action=collect` / `?days=N` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::connection::link_trait::VehicleLink;
use crate::error::{Result, SkySyncError};
use crate::history::store_trait::HistoryStore;
use crate::history::{HistoryRecord, HistoryResponse};
use crate::poller::source_trait::SnapshotSource;
use crate::poller::Endpoint;
use crate::telemetry::PortDescriptor;

/// `{success, error?}` answer of the link endpoints.
#[derive(Debug, Deserialize)]
struct LinkResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ports: Vec<PortDescriptor>,
}

impl LinkResponse {
    fn reason(self, fallback: &str) -> String {
        self.error.unwrap_or_else(|| fallback.to_string())
    }
}

/// REST client for the backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    snapshot_base: String,
    history_path: String,
}

impl BackendClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.server.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            snapshot_base: config.poller.snapshot_base.trim_end_matches('/').to_string(),
            history_path: config.history.path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cache-busted URL of a snapshot endpoint.
    fn snapshot_url(&self, endpoint: Endpoint, now_ms: i64) -> String {
        format!(
            "{}{}/{}.json?t={}",
            self.base_url,
            self.snapshot_base,
            endpoint.name(),
            now_ms
        )
    }

    fn history_url(&self, query: &str) -> String {
        format!("{}{}?{}", self.base_url, self.history_path, query)
    }

    /// Send a link request and decode the `{success}` body whatever the status.
    async fn link_request(&self, request: reqwest::RequestBuilder) -> Result<LinkResponse> {
        let response = request.send().await?;
        let status = response.status();
        let body: LinkResponse = response.json().await?;
        debug!("Link request answered {} (success: {})", status, body.success);
        Ok(body)
    }
}

#[async_trait]
impl VehicleLink for BackendClient {
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let body = self.link_request(self.http.get(self.url("/api/ports"))).await?;
        if body.success {
            Ok(body.ports)
        } else {
            Err(SkySyncError::unavailable("ports", body.reason("port enumeration failed")))
        }
    }

    async fn connect(&self, port: &str) -> Result<()> {
        let request = self
            .http
            .post(self.url("/api/connect"))
            .json(&serde_json::json!({ "port": port }));
        let body = self.link_request(request).await?;
        if body.success {
            Ok(())
        } else {
            Err(SkySyncError::ConnectionRejected(body.reason("Failed to connect")))
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let body = self.link_request(self.http.post(self.url("/api/disconnect"))).await?;
        if body.success {
            Ok(())
        } else {
            Err(SkySyncError::ConnectionRejected(body.reason("Failed to disconnect")))
        }
    }
}

#[async_trait]
impl SnapshotSource for BackendClient {
    async fn fetch(&self, endpoint: Endpoint) -> Result<Value> {
        let url = self.snapshot_url(endpoint, Utc::now().timestamp_millis());
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SkySyncError::unavailable(
                endpoint.name(),
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl HistoryStore for BackendClient {
    async fn collect(&self) -> Result<()> {
        let response = self.http.get(self.history_url("action=collect")).send().await?;
        if !response.status().is_success() {
            return Err(SkySyncError::unavailable(
                "history",
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn query(&self, days: u32) -> Result<Vec<HistoryRecord>> {
        let response = self
            .http
            .get(self.history_url(&format!("days={}", days)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SkySyncError::unavailable(
                "history",
                format!("HTTP {}", response.status()),
            ));
        }
        let body: HistoryResponse = response.json().await?;
        body.into_records()
    }
}
