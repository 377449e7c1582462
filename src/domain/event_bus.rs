//! Internal bus between the gateway and the connection pool.
//!
//! [`EventBus`] carries traffic in both directions:
//!
//! - commands: a bounded [`tokio::sync::mpsc`] queue with exactly one
//!   consumer, the pool actor, which keeps pool state single-writer;
//! - status: a [`tokio::sync::broadcast`] channel every client session
//!   subscribes to. A lagging receiver skips older snapshots but always
//!   sees the newest one;
//! - targeted results: one unbounded [`tokio::sync::mpsc`] channel per
//!   attached client, so one client's traffic can never push another
//!   client's results out of a shared buffer.
//!
//! The bus is constructed once at startup and cloned into whoever needs it;
//! it holds no state beyond the channel endpoints.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use super::{ClientId, PoolCommand, PoolEvent};
use crate::error::GatewayError;

type ClientChannels = HashMap<ClientId, mpsc::UnboundedSender<PoolEvent>>;

/// Bidirectional bus between client-facing code and the pool.
#[derive(Debug, Clone)]
pub struct EventBus {
    commands: mpsc::Sender<PoolCommand>,
    status: broadcast::Sender<PoolEvent>,
    clients: Arc<RwLock<ClientChannels>>,
}

impl EventBus {
    /// Creates a bus and returns the receiving end of the command queue.
    ///
    /// `command_capacity` bounds the pending command queue;
    /// `status_capacity` sizes the status ring buffer.
    #[must_use]
    pub fn new(command_capacity: usize, status_capacity: usize) -> (Self, mpsc::Receiver<PoolCommand>) {
        let (commands, command_rx) = mpsc::channel(command_capacity.max(1));
        let (status, _) = broadcast::channel(status_capacity.max(1));
        let bus = Self {
            commands,
            status,
            clients: Arc::new(RwLock::new(HashMap::new())),
        };
        (bus, command_rx)
    }

    /// Queues a command for the pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusClosed`] if the pool actor has stopped.
    pub async fn send_command(&self, command: PoolCommand) -> Result<(), GatewayError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GatewayError::BusClosed)
    }

    /// Publishes a result.
    ///
    /// Status goes to every subscriber; anything else goes to the client
    /// named by [`PoolEvent::target`] only. Returns the number of receivers
    /// that got the result. Results for detached clients are dropped.
    pub fn publish(&self, event: PoolEvent) -> usize {
        let Some(client_id) = event.target() else {
            return self.status.send(event).unwrap_or(0);
        };
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        match clients.get(&client_id) {
            Some(channel) => usize::from(channel.send(event).is_ok()),
            None => {
                trace!(%client_id, "result for detached client dropped");
                0
            }
        }
    }

    /// Creates a receiver for every future status broadcast.
    ///
    /// Each client session calls this once on attach.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.status.subscribe()
    }

    /// Opens the channel carrying results addressed to `client_id`.
    /// Registering an id again replaces its previous channel.
    #[must_use]
    pub fn register_client(&self, client_id: ClientId) -> mpsc::UnboundedReceiver<PoolEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id, tx);
        rx
    }

    /// Closes the result channel of `client_id`. Returns `false` if it had
    /// none.
    pub fn unregister_client(&self, client_id: ClientId) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client_id)
            .is_some()
    }
}
