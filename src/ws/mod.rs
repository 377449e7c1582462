//! WebSocket layer: the `/ws` endpoint and the client message protocol.
//!
//! Each WebSocket connection is one gateway client. The first frame the
//! server sends is `CLIENT_ID`; after that the client sends commands and
//! receives its results and every status broadcast.

pub mod connection;
pub mod handler;
pub mod messages;
