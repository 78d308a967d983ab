//! Operator-facing connect/disconnect.
//!
//! Every request is validated by the store first; the backend is only called
//! once the state machine has accepted the transition.

use std::sync::Arc;

use tracing::{error, info};

use super::link_trait::VehicleLink;
use super::{LinkEvent, LinkState};
use crate::error::Result;
use crate::store::StoreHandle;
use crate::telemetry::PortDescriptor;

/// Drives vehicle link requests against the backend.
#[derive(Clone)]
pub struct ConnectionController {
    link: Arc<dyn VehicleLink>,
    store: StoreHandle,
}

impl ConnectionController {
    pub fn new(link: Arc<dyn VehicleLink>, store: StoreHandle) -> Self {
        Self { link, store }
    }

    /// Ports the backend can open.
    pub async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.link.list_ports().await
    }

    /// Link the vehicle on `port`.
    ///
    /// # Returns
    ///
    /// The link state after the backend answered. A backend failure is not an
    /// error here: it returns the state machine to `ServerConnected` and is
    /// surfaced through the view model's `last_error`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionRejected` without contacting the backend when there
    /// is no backend link, the port is blank, or a request is already pending.
    pub async fn connect(&self, port: &str) -> Result<LinkState> {
        self.store
            .request(LinkEvent::ConnectRequested(port.to_string()))
            .await?;

        let event = match self.link.connect(port).await {
            Ok(()) => {
                info!("Vehicle linked on {}", port);
                LinkEvent::ConnectSucceeded
            }
            Err(e) => {
                error!("Vehicle link on {} failed: {}", port, e);
                LinkEvent::ConnectFailed(e.to_string())
            }
        };
        self.store.request(event).await
    }

    /// Unlink the vehicle.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionRejected` without contacting the backend when no
    /// vehicle is linked.
    pub async fn disconnect(&self) -> Result<LinkState> {
        self.store.request(LinkEvent::DisconnectRequested).await?;

        let event = match self.link.disconnect().await {
            Ok(()) => {
                info!("Vehicle unlinked");
                LinkEvent::DisconnectSucceeded
            }
            Err(e) => {
                error!("Vehicle unlink failed: {}", e);
                LinkEvent::DisconnectFailed(e.to_string())
            }
        };
        self.store.request(event).await
    }
}
