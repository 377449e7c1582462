//! Commands flowing from the gateway into the connection pool.
//!
//! Every command is tagged with the [`ClientId`] it originated from so the
//! pool can attribute subscriptions and route results.

use super::{ClientId, Filter, NostrEvent, RelaySet, RelayUrl, SubscriptionId};

/// A pool operation issued on behalf of one client.
#[derive(Debug, Clone)]
pub struct PoolCommand {
    /// Client that issued the command.
    pub client_id: ClientId,
    /// Operation to perform.
    pub op: PoolOp,
}

impl PoolCommand {
    /// Creates a command for `client_id`.
    #[must_use]
    pub const fn new(client_id: ClientId, op: PoolOp) -> Self {
        Self { client_id, op }
    }
}

/// The closed set of operations the pool understands.
#[derive(Debug, Clone)]
pub enum PoolOp {
    /// Add relays that are not configured yet.
    AddRelays(Vec<RelayUrl>),
    /// Replace the configured relay set.
    SwitchRelays(RelaySwitch),
    /// Broadcast the current status snapshot.
    PullStatus,
    /// Fan a filter out to every connected relay.
    Subscribe(SubscribeRequest),
    /// Close one of the client's subscriptions.
    Unsubscribe(SubscriptionId),
    /// Fan an event out to every connected relay.
    Publish(NostrEvent),
    /// Close every relay socket once it is idle.
    Disconnect,
    /// Tear down all of the client's subscriptions.
    CloseClient,
}

/// Parameters of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Events to ask for.
    pub filter: Filter,
    /// Keep the subscription open after end-of-stored-events.
    pub keep_alive: bool,
    /// Id shared by every per-relay subscription.
    pub subscription_id: SubscriptionId,
}

impl SubscribeRequest {
    /// Creates a request, generating an id when none is supplied.
    #[must_use]
    pub fn new(filter: Filter, keep_alive: bool, subscription_id: Option<SubscriptionId>) -> Self {
        Self {
            filter,
            keep_alive,
            subscription_id: subscription_id.unwrap_or_else(SubscriptionId::generate),
        }
    }
}

/// Target configuration for a relay switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySwitch {
    /// Identifier of the relay set being switched to.
    pub id: Option<String>,
    /// Relays that make up the new configuration.
    pub relays: Vec<RelayUrl>,
}

impl From<RelaySet> for RelaySwitch {
    fn from(set: RelaySet) -> Self {
        Self {
            id: Some(set.id),
            relays: set.relays,
        }
    }
}
