//! Service layer: the connection pool actor.
//!
//! [`ConnectionPool`] owns every relay socket and executes the commands
//! clients queue on the [`super::domain::EventBus`]. Results flow back on
//! the same bus through per-stream forwarders.

pub mod connection_pool;
mod forward;

pub use connection_pool::{ConnectionPool, PoolInbox, PoolSettings};
