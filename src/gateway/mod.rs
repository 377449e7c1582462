//! Client multiplexer.
//!
//! [`Gateway`] lets any number of clients share the one connection pool.
//! Each client [`attach`](Gateway::attach)es to get a [`ClientSession`],
//! sends [`ClientCommand`]s through [`Gateway::dispatch`], and reads its
//! results from the session. Status is broadcast to every session; every
//! other result only reaches the client whose command produced it.
//!
//! ```text
//! client ─► dispatch ─► EventBus (commands) ─► ConnectionPool
//! client ◄─ session  ◄─ EventBus (results)  ◄─ forwarders
//! ```

pub mod clients;

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{ClientId, EventBus, PoolCommand, PoolEvent, PoolOp};
use crate::error::GatewayError;
use crate::ws::messages::{ClientCommand, GatewayMessage};

pub use clients::ClientRegistry;

/// Entry point for clients of the pool.
#[derive(Debug, Clone)]
pub struct Gateway {
    bus: EventBus,
    clients: Arc<RwLock<ClientRegistry>>,
}

impl Gateway {
    /// Creates a gateway queuing commands on `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            clients: Arc::new(RwLock::new(ClientRegistry::new())),
        }
    }

    /// Attaches a new client.
    ///
    /// The session's channels are open before the id is published, so
    /// nothing produced for the client can be missed.
    pub async fn attach(&self) -> ClientSession {
        let status = self.bus.subscribe();
        let (client_id, detached, results) = {
            let mut clients = self.clients.write().await;
            let (client_id, detached) = clients.register();
            (client_id, detached, self.bus.register_client(client_id))
        };
        info!(%client_id, "client attached");
        ClientSession {
            client_id,
            results,
            status,
            detached,
            greeted: false,
        }
    }

    /// Queues `command` on behalf of `client_id`.
    ///
    /// `CLOSE_CLIENT` detaches the client.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotConnected`] if the client is not attached.
    /// - [`GatewayError::BusClosed`] if the pool has stopped.
    pub async fn dispatch(&self, client_id: ClientId, command: ClientCommand) -> Result<(), GatewayError> {
        if !self.clients.read().await.is_attached(client_id) {
            return Err(GatewayError::NotConnected(format!("client {client_id} is not attached")));
        }
        if command == ClientCommand::CloseClient {
            self.detach(client_id).await;
            return Ok(());
        }
        debug!(%client_id, kind = ?command.kind(), "dispatching command");
        self.bus
            .send_command(PoolCommand::new(client_id, command.into()))
            .await
    }

    /// Parses a JSON envelope and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns the parse error for unknown or malformed commands (which are
    /// dropped), or any error of [`dispatch`](Self::dispatch).
    pub async fn dispatch_json(&self, client_id: ClientId, text: &str) -> Result<(), GatewayError> {
        let command = ClientCommand::from_json(text).inspect_err(|e| {
            warn!(%client_id, error = %e, "dropping client command");
        })?;
        self.dispatch(client_id, command).await
    }

    /// Detaches `client_id` and closes everything it left open on the
    /// relays. Returns `false` if it was not attached.
    pub async fn detach(&self, client_id: ClientId) -> bool {
        if !self.clients.write().await.release(client_id) {
            return false;
        }
        self.bus.unregister_client(client_id);
        info!(%client_id, "client detached");
        if let Err(e) = self
            .bus
            .send_command(PoolCommand::new(client_id, PoolOp::CloseClient))
            .await
        {
            warn!(%client_id, error = %e, "could not release client subscriptions");
        }
        true
    }

    /// Returns `true` while `client_id` is attached.
    pub async fn is_attached(&self, client_id: ClientId) -> bool {
        self.clients.read().await.is_attached(client_id)
    }

    /// Returns the number of attached clients.
    pub async fn attached_count(&self) -> usize {
        self.clients.read().await.attached_count()
    }
}

/// One client's view of the pool's results.
#[derive(Debug)]
pub struct ClientSession {
    client_id: ClientId,
    results: mpsc::UnboundedReceiver<PoolEvent>,
    status: broadcast::Receiver<PoolEvent>,
    detached: watch::Receiver<bool>,
    greeted: bool,
}

impl ClientSession {
    /// Id assigned to this client.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.client_id
    }

    /// Returns `true` once the client was detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        *self.detached.borrow()
    }

    /// Waits for the next message addressed to this client.
    ///
    /// The first message is always [`GatewayMessage::ClientId`]. Returns
    /// `None` once the client is detached or the pool has stopped.
    pub async fn recv(&mut self) -> Option<GatewayMessage> {
        if !self.greeted {
            self.greeted = true;
            return Some(GatewayMessage::ClientId {
                client_id: self.client_id,
            });
        }

        loop {
            if self.is_detached() {
                return None;
            }
            tokio::select! {
                biased;
                changed = self.detached.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                result = self.results.recv() => match result {
                    Some(event) => {
                        if let Some(message) = self.deliverable(&event) {
                            return Some(message);
                        }
                    }
                    None => return None,
                },
                status = self.status.recv() => match status {
                    Ok(event) => {
                        if let Some(message) = self.deliverable(&event) {
                            return Some(message);
                        }
                    }
                    // The ring keeps the newest snapshots, so the latest
                    // status still arrives.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(client_id = %self.client_id, skipped, "skipped stale status snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    fn deliverable(&self, event: &PoolEvent) -> Option<GatewayMessage> {
        if self.is_detached() {
            return None;
        }
        GatewayMessage::route(self.client_id, event)
    }
}
