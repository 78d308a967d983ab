//! # Telemetry Store
//!
//! Single owner of the connection and telemetry state.
//!
//! Producers (live channel, poller, connection controller) never mutate state
//! directly. They send a [`StoreUpdate`] over one mpsc queue; a single task
//! applies updates in arrival order and publishes the resulting [`ViewModel`]
//! through a `watch` channel that views subscribe to.
//!
//! ## Ordering rules
//!
//! - Live snapshots older than the current live snapshot are dropped
//! - Poll cycles commit only if their start sequence is newer than the last
//!   committed cycle, regardless of completion order
//! - Live snapshots are accepted only while the vehicle is linked

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionState, ConnectionStateMachine, LinkEvent, LinkState};
use crate::error::{Result, SkySyncError};
use crate::telemetry::{DataSource, TelemetrySnapshot};

/// Capacity of the update queue.
pub const UPDATE_QUEUE_CAPACITY: usize = 256;

/// Everything a view binds to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewModel {
    pub link: LinkState,
    pub connection: ConnectionState,
    /// Last sample pushed by the live channel; frozen while the backend is lost
    pub live: Option<TelemetrySnapshot>,
    /// Last committed poll cycle (real or simulated)
    pub parameters: Option<TelemetrySnapshot>,
    pub parameters_source: Option<DataSource>,
    /// Operator-visible failure of the last connect/disconnect
    pub last_error: Option<String>,
    /// Sequence number of the last committed poll cycle
    pub cycle: Option<u64>,
}

/// Result of one poll cycle, tagged with the order it started in.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub seq: u64,
    pub snapshot: TelemetrySnapshot,
    pub source: DataSource,
}

/// One queued write.
#[derive(Debug)]
pub enum StoreUpdate {
    /// Fire-and-forget link event
    Link(LinkEvent),
    /// Link event whose validation result the sender waits for
    LinkRequest {
        event: LinkEvent,
        reply: oneshot::Sender<Result<LinkState>>,
    },
    /// Payload received on the live channel
    Live {
        snapshot: Option<TelemetrySnapshot>,
        vehicle_connected: bool,
    },
    /// Finished poll cycle
    Cycle(CycleOutcome),
}

/// Cloneable producer/consumer handle to the store task.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreUpdate>,
    view: watch::Receiver<ViewModel>,
}

impl StoreHandle {
    /// Queue an update.
    ///
    /// # Errors
    ///
    /// Returns [`SkySyncError::StoreClosed`] if the store task has stopped.
    pub async fn send(&self, update: StoreUpdate) -> Result<()> {
        self.tx.send(update).await.map_err(|_| SkySyncError::StoreClosed)
    }

    /// Queue a link event and wait until the store has validated it.
    ///
    /// # Errors
    ///
    /// Returns the state machine's rejection, or [`SkySyncError::StoreClosed`].
    pub async fn request(&self, event: LinkEvent) -> Result<LinkState> {
        let (reply, response) = oneshot::channel();
        self.send(StoreUpdate::LinkRequest { event, reply }).await?;
        response.await.map_err(|_| SkySyncError::StoreClosed)?
    }

    /// Whether the store task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Current view model.
    pub fn snapshot(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published view model.
    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }
}

/// State owned by the store task.
#[derive(Debug)]
pub struct TelemetryStore {
    view: ViewModel,
    machine: ConnectionStateMachine,
    publisher: watch::Sender<ViewModel>,
}

impl TelemetryStore {
    /// Spawn the store task.
    ///
    /// The task ends once every [`StoreHandle`] has been dropped.
    pub fn spawn() -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let (publisher, view) = watch::channel(ViewModel::default());
        let store = Self {
            view: ViewModel::default(),
            machine: ConnectionStateMachine::new(),
            publisher,
        };
        let task = tokio::spawn(store.run(rx));
        (StoreHandle { tx, view }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<StoreUpdate>) {
        while let Some(update) = rx.recv().await {
            self.apply(update);
        }
        debug!("Telemetry store stopped");
    }

    fn publish(&self) {
        self.publisher.send_replace(self.view.clone());
    }

    fn apply(&mut self, update: StoreUpdate) {
        match update {
            StoreUpdate::Link(event) => {
                if let Err(e) = self.apply_link(event) {
                    warn!("Ignored link event: {}", e);
                }
            }
            StoreUpdate::LinkRequest { event, reply } => {
                let result = self.apply_link(event);
                // Published before replying so the requester reads its own write
                self.publish();
                // The requester may have given up; the transition stands either way
                let _ = reply.send(result);
                return;
            }
            StoreUpdate::Live { snapshot, vehicle_connected } => {
                self.apply_live(snapshot, vehicle_connected);
            }
            StoreUpdate::Cycle(outcome) => self.apply_cycle(outcome),
        }
        self.publish();
    }

    fn apply_link(&mut self, event: LinkEvent) -> Result<LinkState> {
        let clears_live = event == LinkEvent::DisconnectSucceeded
            && self.machine.state() == LinkState::VehicleDisconnecting;

        let state = self.machine.apply(event)?;

        if clears_live {
            self.view.live = None;
        }
        self.view.link = state;
        self.view.connection = self.machine.connection();
        self.view.last_error = self.machine.last_error().map(str::to_string);
        Ok(state)
    }

    fn apply_live(&mut self, snapshot: Option<TelemetrySnapshot>, vehicle_connected: bool) {
        // A frame on the live channel proves the backend is up
        if !self.machine.connection().server_connected() {
            let _ = self.apply_link(LinkEvent::ServerUp);
        }
        let _ = self.apply_link(LinkEvent::VehicleReported(vehicle_connected));

        let Some(snapshot) = snapshot else { return };
        if !self.machine.connection().vehicle_connected() {
            return;
        }

        match &self.view.live {
            Some(current) if snapshot.timestamp < current.timestamp => {
                debug!(
                    "Dropped stale live sample {} (current {})",
                    snapshot.timestamp, current.timestamp
                );
            }
            _ => self.view.live = Some(snapshot),
        }
    }

    fn apply_cycle(&mut self, outcome: CycleOutcome) {
        if let Some(committed) = self.view.cycle {
            if outcome.seq <= committed {
                debug!("Dropped stale cycle #{} (committed #{})", outcome.seq, committed);
                return;
            }
        }

        if self.view.parameters_source != Some(outcome.source) {
            info!("Parameters source is now {:?}", outcome.source);
        }
        self.view.cycle = Some(outcome.seq);
        self.view.parameters = Some(outcome.snapshot);
        self.view.parameters_source = Some(outcome.source);
    }
}
