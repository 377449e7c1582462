//! Results emitted by the connection pool.
//!
//! Every result the pool produces goes through the [`super::EventBus`].
//! Status changes are addressed to everyone; everything else carries the
//! [`ClientId`] of the client whose command produced it.

use serde::{Deserialize, Serialize};

use super::{ClientId, NostrEvent, RelayUrl, StatusSnapshot, SubscriptionId};

/// Outcome of publishing one event to one relay.
///
/// Results are independent per relay; no aggregate verdict is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    /// Relay that answered.
    pub relay_url: RelayUrl,
    /// Id of the published event.
    pub event_id: String,
    /// Whether the relay accepted the event.
    pub success: bool,
    /// Relay-supplied reason (may be empty).
    pub reason: String,
}

/// Operation whose deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedOperation {
    /// A relay never acknowledged a published event.
    Publish,
    /// A relay never signalled end-of-stored-events.
    Subscribe,
}

/// Result produced by the pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// The relay configuration or a relay's status changed, or a client
    /// pulled the status. Broadcast to every client.
    StatusChanged(StatusSnapshot),

    /// A relay delivered an event for a subscription.
    Event {
        /// Owner of the subscription.
        client_id: ClientId,
        /// Subscription the event matched.
        subscription_id: SubscriptionId,
        /// Relay that delivered it.
        relay_url: RelayUrl,
        /// The event.
        event: NostrEvent,
    },

    /// A relay finished sending stored events for a subscription.
    Eose {
        /// Owner of the subscription.
        client_id: ClientId,
        /// Subscription concerned.
        subscription_id: SubscriptionId,
        /// Relay that sent the signal.
        relay_url: RelayUrl,
    },

    /// A relay acknowledged a published event.
    PublishResult {
        /// Client that published.
        client_id: ClientId,
        /// Per-relay outcome.
        result: PublishResult,
    },

    /// A relay missed its deadline; the stream was closed.
    Timeout {
        /// Client that issued the operation.
        client_id: ClientId,
        /// Relay that did not answer in time.
        relay_url: RelayUrl,
        /// Which operation timed out.
        operation: TimedOperation,
        /// Event id (publish) or subscription id (subscribe).
        id: String,
    },
}

impl PoolEvent {
    /// Returns the client this result is addressed to, or `None` for
    /// results broadcast to every client.
    #[must_use]
    pub const fn target(&self) -> Option<ClientId> {
        match self {
            Self::StatusChanged(_) => None,
            Self::Event { client_id, .. }
            | Self::Eose { client_id, .. }
            | Self::PublishResult { client_id, .. }
            | Self::Timeout { client_id, .. } => Some(*client_id),
        }
    }

    /// Returns `true` if `client_id` should receive this result.
    #[must_use]
    pub fn is_for(&self, client_id: ClientId) -> bool {
        self.target().is_none_or(|target| target == client_id)
    }
}
