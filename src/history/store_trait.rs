//! Trait abstraction for the history store to enable testing

use async_trait::async_trait;

use super::HistoryRecord;
use crate::error::Result;

/// Append/query access to the backend's snapshot history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ask the backend to append its current telemetry to the history
    async fn collect(&self) -> Result<()>;

    /// Records of the last `days` days, oldest first
    async fn query(&self, days: u32) -> Result<Vec<HistoryRecord>>;
}
