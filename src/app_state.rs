//! Shared application state injected into all Axum handlers.

use tokio::sync::watch;

use crate::domain::StatusSnapshot;
use crate::gateway::Gateway;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway every WebSocket client attaches to.
    pub gateway: Gateway,
    /// Latest relay status published by the pool.
    pub status: watch::Receiver<StatusSnapshot>,
}
