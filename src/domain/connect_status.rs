//! Relay connection status map and the snapshot clients pull.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RelayUrl;

/// Last observed connection state per configured relay.
///
/// An entry is created (as `false`) when a relay is first configured,
/// flipped on every socket transition, and removed only when the relay is
/// dropped from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectStatus(BTreeMap<RelayUrl, bool>);

impl ConnectStatus {
    /// Creates an empty status map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `url` as disconnected if it is not already present.
    ///
    /// Returns `true` if a new entry was created.
    pub fn register(&mut self, url: RelayUrl) -> bool {
        if self.0.contains_key(&url) {
            return false;
        }
        self.0.insert(url, false);
        true
    }

    /// Records a transition for a configured relay.
    ///
    /// Unknown URLs are ignored. Returns `true` if the stored value changed.
    pub fn set(&mut self, url: &RelayUrl, connected: bool) -> bool {
        match self.0.get_mut(url) {
            Some(current) if *current != connected => {
                *current = connected;
                true
            }
            _ => false,
        }
    }

    /// Drops a relay from the map.
    pub fn remove(&mut self, url: &RelayUrl) -> bool {
        self.0.remove(url).is_some()
    }

    /// Returns the state of `url`, or `None` if it is not configured.
    #[must_use]
    pub fn get(&self, url: &RelayUrl) -> Option<bool> {
        self.0.get(url).copied()
    }

    /// Returns `true` if `url` is configured and connected.
    #[must_use]
    pub fn is_connected(&self, url: &RelayUrl) -> bool {
        self.get(url).unwrap_or(false)
    }

    /// Returns the number of connected relays.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.0.values().filter(|connected| **connected).count()
    }

    /// Returns `true` if `url` has an entry.
    #[must_use]
    pub fn contains(&self, url: &RelayUrl) -> bool {
        self.0.contains_key(url)
    }

    /// Returns the number of configured relays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no relay is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Formats a `label (connected/total)` summary, e.g. `"Global (2/3)"`.
    #[must_use]
    pub fn summary(&self, label: &str) -> String {
        format!("{label} ({}/{})", self.connected_count(), self.len())
    }
}

/// Point-in-time view of the pool configuration and relay status.
///
/// Broadcast on every status transition and in answer to `PULL_STATUS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Identifier of the active relay set, if one was switched to.
    pub id: Option<String>,
    /// Configured relays, in configuration order.
    pub relays: Vec<RelayUrl>,
    /// Connection status per configured relay.
    pub status: ConnectStatus,
}

impl StatusSnapshot {
    /// Returns the number of connected relays.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.status.connected_count()
    }

    /// Returns the number of configured relays.
    #[must_use]
    pub fn total(&self) -> usize {
        self.relays.len()
    }
}
