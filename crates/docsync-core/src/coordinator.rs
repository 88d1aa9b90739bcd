//! Coordinator - the single consumer of every inbound event
//!
//! Connections never touch the [`Hub`] directly. They send [`Inbound`]
//! events through a [`HubHandle`]; one task drains the channel and applies
//! events in arrival order, then pushes the resulting notices into each
//! connection's outbox. No locks are needed because nothing else can reach
//! the hub.

use crate::error::{Error, Result};
use crate::event::{Dispatch, Notice, Request};
use crate::hub::{Hub, HubStats};
use crate::session::ConnectionId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Per-connection channel of notices
pub type Outbox = mpsc::UnboundedReceiver<Notice>;

/// An event for the coordinator
#[derive(Debug)]
pub enum Inbound {
    /// A transport accepted a connection
    Connect {
        connection_id: ConnectionId,
        outbox: mpsc::UnboundedSender<Notice>,
    },
    Request {
        connection_id: ConnectionId,
        request: Request,
    },
    /// The connection closed; implicit leave
    Disconnect { connection_id: ConnectionId },
    /// Periodic checkpoint tick
    Checkpoint,
    /// Snapshot of hub counters
    Stats { reply: oneshot::Sender<HubStats> },
    /// Stop processing; remaining handles see `CoordinatorClosed`
    Shutdown,
}

/// Cloneable sender side of the coordinator's queue
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl HubHandle {
    /// Register a connection and get its outbox
    pub fn connect(&self, connection_id: ConnectionId) -> Result<Outbox> {
        let (outbox, rx) = mpsc::unbounded_channel();
        self.send(Inbound::Connect { connection_id, outbox })?;
        Ok(rx)
    }

    pub fn submit(&self, connection_id: ConnectionId, request: Request) -> Result<()> {
        self.send(Inbound::Request { connection_id, request })
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        self.send(Inbound::Disconnect { connection_id })
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.send(Inbound::Checkpoint)
    }

    /// Ask the coordinator to stop after the events already queued
    pub fn shutdown(&self) -> Result<()> {
        self.send(Inbound::Shutdown)
    }

    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbound::Stats { reply })?;
        rx.await.map_err(|_| Error::CoordinatorClosed)
    }

    /// Send a checkpoint tick every `period` until the coordinator stops.
    ///
    /// The timer holds only a weak reference, so it never keeps the
    /// coordinator alive on its own.
    pub fn spawn_checkpoint_timer(&self, period: Duration) -> JoinHandle<()> {
        let weak = self.tx.downgrade();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = weak.upgrade() else {
                    break;
                };
                if tx.send(Inbound::Checkpoint).is_err() {
                    break;
                }
            }
            debug!("Checkpoint timer stopped");
        })
    }

    fn send(&self, event: Inbound) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::CoordinatorClosed)
    }
}

/// Owns the hub and every connection's outbox
pub struct Coordinator {
    hub: Hub,
    outboxes: HashMap<ConnectionId, mpsc::UnboundedSender<Notice>>,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl Coordinator {
    pub fn new(hub: Hub) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            hub,
            outboxes: HashMap::new(),
            rx,
        };
        (coordinator, HubHandle { tx })
    }

    /// Run the coordinator on its own task
    pub fn spawn(hub: Hub) -> (HubHandle, JoinHandle<Hub>) {
        let (coordinator, handle) = Self::new(hub);
        (handle, tokio::spawn(coordinator.run()))
    }

    /// Process events until every handle is dropped or a shutdown
    /// arrives.
    ///
    /// Dirty documents get a final checkpoint and the hub is handed back.
    /// Dropping the outboxes ends every connection's notice stream.
    pub async fn run(mut self) -> Hub {
        info!("Coordinator started");

        while let Some(event) = self.rx.recv().await {
            if let Inbound::Shutdown = event {
                break;
            }
            self.process(event);
        }

        let flushed = self.hub.checkpoint_tick();
        info!(flushed, "Coordinator stopped");
        self.hub
    }

    fn process(&mut self, event: Inbound) {
        match event {
            Inbound::Connect { connection_id, outbox } => {
                debug!(client = %connection_id, "Connection registered");
                self.outboxes.insert(connection_id, outbox);
            }
            Inbound::Request { connection_id, request } => {
                let dispatches = self.hub.handle(&connection_id, request);
                self.deliver(dispatches);
            }
            Inbound::Disconnect { connection_id } => {
                self.outboxes.remove(&connection_id);
                let dispatches = self.hub.disconnect(&connection_id);
                self.deliver(dispatches);
            }
            Inbound::Checkpoint => {
                self.hub.checkpoint_tick();
            }
            Inbound::Stats { reply } => {
                let _ = reply.send(self.hub.stats());
            }
            Inbound::Shutdown => {}
        }
    }

    fn deliver(&self, dispatches: Vec<Dispatch>) {
        for Dispatch { to, notice } in dispatches {
            match self.outboxes.get(&to) {
                Some(outbox) => {
                    // A closed outbox means the disconnect is already on its way
                    if outbox.send(notice).is_err() {
                        trace!(client = %to, "Outbox closed, notice dropped");
                    }
                }
                None => trace!(client = %to, "No outbox for connection"),
            }
        }
    }
}
