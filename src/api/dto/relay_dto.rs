//! Relay status DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::StatusSnapshot;

/// Label used for the status summary when no relay set is active.
pub const DEFAULT_LABEL: &str = "Global";

/// Connection state of one configured relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RelayStatusDto {
    /// Normalized relay URL.
    pub url: String,
    /// Whether the pool's socket to this relay is open.
    pub connected: bool,
}

/// Response for `GET /api/v1/relays`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RelayListResponse {
    /// Active relay set, if one was switched to.
    pub id: Option<String>,
    /// Summary such as `"Global (2/3)"`.
    pub label: String,
    /// Configured relays in configuration order.
    pub relays: Vec<RelayStatusDto>,
    /// Number of connected relays.
    pub connected: usize,
    /// Number of configured relays.
    pub total: usize,
}

impl From<&StatusSnapshot> for RelayListResponse {
    fn from(snapshot: &StatusSnapshot) -> Self {
        let relays = snapshot
            .relays
            .iter()
            .map(|url| RelayStatusDto {
                url: url.to_string(),
                connected: snapshot.status.is_connected(url),
            })
            .collect();
        let label = snapshot.id.as_deref().unwrap_or(DEFAULT_LABEL);
        Self {
            id: snapshot.id.clone(),
            label: snapshot.status.summary(label),
            relays,
            connected: snapshot.connected_count(),
            total: snapshot.total(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ConnectStatus, RelayUrl};

    #[test]
    fn summarizes_snapshot() {
        let (Ok(a), Ok(b)) = (RelayUrl::parse("wss://a.com"), RelayUrl::parse("wss://b.com")) else {
            panic!("valid urls");
        };
        let mut status = ConnectStatus::new();
        status.register(a.clone());
        status.register(b.clone());
        status.set(&b, true);
        let snapshot = StatusSnapshot {
            id: None,
            relays: vec![a, b],
            status,
        };

        let response = RelayListResponse::from(&snapshot);
        assert_eq!(response.label, "Global (1/2)");
        assert_eq!(response.connected, 1);
        assert_eq!(response.total, 2);
        assert_eq!(
            response.relays.last(),
            Some(&RelayStatusDto {
                url: "wss://b.com".into(),
                connected: true
            })
        );
    }
}
