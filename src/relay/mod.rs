//! Upstream relay connections.
//!
//! A [`RelaySocket`] owns one WebSocket connection to one relay and hands
//! out [`SubscriptionStream`]s and [`AckStream`]s for the work routed to it.

pub mod message;
pub mod socket;
pub mod stream;

pub use message::{ClientMessage, RelayMessage};
pub use socket::{RelaySocket, SocketSignal, SocketState};
pub use stream::{AckStream, PublishAck, SubscriptionItem, SubscriptionStream};
