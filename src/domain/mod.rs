//! Domain layer: identifiers, relay payloads, status, and the internal bus.
//!
//! This module contains the server-side domain model: relay and client
//! identity, the Nostr payloads routed through the pool, the connection
//! status map, per-client subscription ownership, and the bus connecting
//! the gateway to the pool.

pub mod client_id;
pub mod connect_status;
pub mod event_bus;
pub mod nostr;
pub mod pool_command;
pub mod pool_event;
pub mod port_index;
pub mod relay_set;
pub mod relay_url;
pub mod subscription_id;

pub use client_id::ClientId;
pub use connect_status::{ConnectStatus, StatusSnapshot};
pub use event_bus::EventBus;
pub use nostr::{Filter, NostrEvent};
pub use pool_command::{PoolCommand, PoolOp, RelaySwitch, SubscribeRequest};
pub use pool_event::{PoolEvent, PublishResult, TimedOperation};
pub use port_index::PortSubscriptionIndex;
pub use relay_set::{RELAY_SET_KIND, RelaySet};
pub use relay_url::RelayUrl;
pub use subscription_id::SubscriptionId;
