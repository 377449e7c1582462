//! Nostr payload types carried through the pool.
//!
//! The gateway does not interpret events or filters beyond routing them, so
//! these mirror the NIP-01 JSON shapes and nothing more. Signatures are not
//! verified here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A signed Nostr event (NIP-01).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    /// Hex-encoded event id (sha256 of the serialized event).
    pub id: String,
    /// Hex-encoded author public key.
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u32,
    /// Event tags.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Event content.
    #[serde(default)]
    pub content: String,
    /// Hex-encoded Schnorr signature.
    pub sig: String,
}

/// A subscription filter (NIP-01).
///
/// Tag queries (`#e`, `#p`, ...) land in [`Filter::tags`] and are
/// serialized back at the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Author public keys to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// Event kinds to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    /// Only events created at or after this timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    /// Only events created at or before this timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    /// Maximum number of stored events to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Full-text search query (NIP-50).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Tag queries keyed by `#<letter>`.
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the filter to the given kinds.
    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Caps the number of stored events returned.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds a tag query, e.g. `tag('d', ["favorite"])` for `#d`.
    #[must_use]
    pub fn tag<S: Into<String>>(mut self, letter: char, values: impl IntoIterator<Item = S>) -> Self {
        self.tags.insert(
            format!("#{letter}"),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }
}
