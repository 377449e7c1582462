//! Type-safe client identifier.
//!
//! [`ClientId`] is a newtype around the sequential integer the gateway hands
//! out when a client attaches, so client ids cannot be confused with other
//! counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one attached client (a browser tab, a local task, ...).
///
/// Assigned sequentially starting at `0` and stable for the lifetime of the
/// client's connection. Ids are never reassigned after a client detaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a `ClientId` from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
