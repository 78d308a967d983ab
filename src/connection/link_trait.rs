//! Trait abstraction for the backend's vehicle-link capability to enable testing

use async_trait::async_trait;

use crate::error::Result;
use crate::telemetry::PortDescriptor;

/// Port enumeration and vehicle link management, performed by the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// List the serial ports the backend can open
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Link the vehicle on `port`
    async fn connect(&self, port: &str) -> Result<()>;

    /// Unlink the vehicle
    async fn disconnect(&self) -> Result<()>;
}
