//! Trait abstraction for the snapshot endpoints to enable testing

use async_trait::async_trait;
use serde_json::Value;

use super::Endpoint;
use crate::error::Result;

/// Request/response access to the named snapshot endpoints.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current slice of `endpoint` as raw JSON
    async fn fetch(&self, endpoint: Endpoint) -> Result<Value>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::SkySyncError;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// Mock snapshot source for testing
    #[derive(Clone, Default)]
    pub struct MockSnapshotSource {
        pub responses: Arc<Mutex<HashMap<Endpoint, Value>>>,
        pub failing: Arc<Mutex<HashSet<Endpoint>>>,
        pub stalled: Arc<Mutex<HashSet<Endpoint>>>,
        pub calls: Arc<Mutex<Vec<Endpoint>>>,
    }

    impl MockSnapshotSource {
        /// Source answering every endpoint with a plausible slice
        pub fn healthy() -> Self {
            let source = Self::default();
            source.set_response(
                Endpoint::LocalPositionNed,
                serde_json::json!({"x": 1.0, "y": 2.0, "z": -12.0, "vx": 3.0, "vy": 4.0, "vz": -0.5}),
            );
            source.set_response(
                Endpoint::Attitude,
                serde_json::json!({
                    "roll": 1.5708, "pitch": 0.0, "yaw": 0.5,
                    "rollspeed": 0.0, "pitchspeed": 0.0, "yawspeed": 0.0
                }),
            );
            source.set_response(
                Endpoint::BatteryStatus,
                serde_json::json!({"battery_remaining": 81, "voltages": [15800, 65535]}),
            );
            source.set_response(
                Endpoint::GlobalPositionInt,
                serde_json::json!({"relative_alt": -120000, "vx": 300, "vy": 400, "vz": 50, "hdg": 9000}),
            );
            source
        }

        pub fn set_response(&self, endpoint: Endpoint, value: Value) {
            self.responses.lock().unwrap().insert(endpoint, value);
        }

        pub fn set_failing(&self, endpoint: Endpoint) {
            self.failing.lock().unwrap().insert(endpoint);
        }

        pub fn set_stalled(&self, endpoint: Endpoint) {
            self.stalled.lock().unwrap().insert(endpoint);
        }

        pub fn get_calls(&self) -> Vec<Endpoint> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SnapshotSource for MockSnapshotSource {
        async fn fetch(&self, endpoint: Endpoint) -> Result<Value> {
            self.calls.lock().unwrap().push(endpoint);

            let stalled = self.stalled.lock().unwrap().contains(&endpoint);
            if stalled {
                std::future::pending::<()>().await;
            }
            let failing = self.failing.lock().unwrap().contains(&endpoint);
            if failing {
                return Err(SkySyncError::unavailable(endpoint.name(), "HTTP 503"));
            }

            self.responses
                .lock()
                .unwrap()
                .get(&endpoint)
                .cloned()
                .ok_or_else(|| SkySyncError::unavailable(endpoint.name(), "HTTP 404"))
        }
    }
}
