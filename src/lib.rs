//! # relay-gateway
//!
//! One shared pool of Nostr relay connections behind a multiplexing
//! gateway.
//!
//! Many clients (browser tabs, local tools, other processes) attach to the
//! gateway over WebSocket or in-process. The gateway owns one socket per
//! configured relay, fans subscriptions and publishes out to every connected
//! relay, and routes results back only to the client that asked for them.
//! Relay status changes are broadcast to everyone.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket /ws, in-process ClientSession)
//!     │
//!     ├── WS Handler (ws/)          REST Handlers (api/)
//!     │
//!     ├── Gateway (gateway/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── ConnectionPool actor (service/)
//!     │
//!     └── RelaySocket per relay (relay/) ──► relays
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod server;
pub mod service;
pub mod ws;
