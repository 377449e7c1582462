//! Attached-client bookkeeping.
//!
//! Client ids are slot indices: they start at 0, grow by one per attach,
//! and are never reused. Detaching nulls the slot.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::ClientId;

/// One attached client.
#[derive(Debug)]
struct ClientSlot {
    detached: watch::Sender<bool>,
    attached_at: DateTime<Utc>,
}

/// Slot table of every client that ever attached.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    slots: Vec<Option<ClientSlot>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id. The returned receiver flips to `true` when
    /// the client is detached.
    pub fn register(&mut self) -> (ClientId, watch::Receiver<bool>) {
        let client_id = ClientId::new(self.slots.len() as u64);
        let (detached, detached_rx) = watch::channel(false);
        self.slots.push(Some(ClientSlot {
            detached,
            attached_at: Utc::now(),
        }));
        (client_id, detached_rx)
    }

    /// Nulls the slot of `client_id`. Returns `false` if it was already
    /// empty or never allocated.
    pub fn release(&mut self, client_id: ClientId) -> bool {
        let Some(slot) = self.slot_mut(client_id).and_then(Option::take) else {
            return false;
        };
        slot.detached.send_replace(true);
        true
    }

    /// Returns `true` while `client_id` is attached.
    #[must_use]
    pub fn is_attached(&self, client_id: ClientId) -> bool {
        self.attached_at(client_id).is_some()
    }

    /// Returns when `client_id` attached, if it still is.
    #[must_use]
    pub fn attached_at(&self, client_id: ClientId) -> Option<DateTime<Utc>> {
        usize::try_from(client_id.get())
            .ok()
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_ref)
            .map(|slot| slot.attached_at)
    }

    /// Returns the number of attached clients.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn slot_mut(&mut self, client_id: ClientId) -> Option<&mut Option<ClientSlot>> {
        let index = usize::try_from(client_id.get()).ok()?;
        self.slots.get_mut(index)
    }
}
