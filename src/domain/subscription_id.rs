//! Subscription identifiers.
//!
//! Clients may pick their own subscription id (so they can close it later by
//! name) or let the gateway generate one.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ClientId;

/// Identifier of one logical subscription.
///
/// The same id is used for every per-relay physical subscription a logical
/// subscription fans out into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wraps a client-supplied id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random id: 8 random bytes, hex encoded.
    #[must_use]
    pub fn generate() -> Self {
        let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
        Self(format!("{high:016x}"))
    }

    /// Id used on the relay wire for `client_id`'s subscription.
    ///
    /// Clients pick their ids independently, so two clients may reuse the
    /// same one; prefixing the owner keeps their relay subscriptions apart.
    #[must_use]
    pub fn scoped(&self, client_id: ClientId) -> Self {
        Self(format!("{client_id}:{}", self.0))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
