//! Named relay sets (NIP-51 kind `30002`).
//!
//! A relay set is how users publish and share a list of relays. The gateway
//! accepts one as the `relaySet` payload of `SWITCH_RELAYS` and turns it
//! into a [`RelaySwitch`].
//!
//! [`RelaySwitch`]: super::RelaySwitch

use super::{NostrEvent, RelayUrl};
use crate::error::GatewayError;

/// Event kind of a NIP-51 relay set.
pub const RELAY_SET_KIND: u32 = 30002;

/// A named, described list of relays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySet {
    /// Identifier (`d` tag).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Member relays.
    pub relays: Vec<RelayUrl>,
}

impl RelaySet {
    /// Builds a relay set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRelaySet`] if `id` or `title` is
    /// empty.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        relays: Vec<RelayUrl>,
    ) -> Result<Self, GatewayError> {
        let id = id.into();
        let title = title.into();
        if id.trim().is_empty() {
            return Err(GatewayError::InvalidRelaySet("missing id".into()));
        }
        if title.trim().is_empty() {
            return Err(GatewayError::InvalidRelaySet("missing title".into()));
        }
        Ok(Self {
            id,
            title,
            description: description.filter(|d| !d.is_empty()),
            relays,
        })
    }

    /// Decodes a set from a kind `30002` event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRelaySet`] for any other kind, or the
    /// error of [`from_tags`](Self::from_tags).
    pub fn from_event(event: &NostrEvent) -> Result<Self, GatewayError> {
        if event.kind != RELAY_SET_KIND {
            return Err(GatewayError::InvalidRelaySet(format!(
                "expected kind {RELAY_SET_KIND}, got {}",
                event.kind
            )));
        }
        Self::from_tags(&event.tags)
    }

    /// Decodes a set from event tags.
    ///
    /// Unknown tags and unparseable relay URLs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRelaySet`] if the tags carry no `d`
    /// or `title` entry.
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, GatewayError> {
        let mut id = String::new();
        let mut title = String::new();
        let mut description = None;
        let mut relays = Vec::new();

        for tag in tags {
            let mut parts = tag.iter();
            let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            match name.as_str() {
                "d" => id.clone_from(value),
                "title" => title.clone_from(value),
                "description" => description = Some(value.clone()),
                "relay" => match RelayUrl::parse(value) {
                    Ok(url) if !relays.contains(&url) => relays.push(url),
                    Ok(_) => {}
                    Err(e) => tracing::debug!(error = %e, "skipping relay tag"),
                },
                _ => {}
            }
        }

        Self::new(id, title, description, relays)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn url(raw: &str) -> RelayUrl {
        let Ok(url) = RelayUrl::parse(raw) else {
            panic!("bad test url {raw}");
        };
        url
    }

    #[test]
    fn rejects_missing_id_or_title() {
        assert!(RelaySet::new("", "Title", None, vec![]).is_err());
        assert!(RelaySet::new("id", "  ", None, vec![]).is_err());
    }

    fn tag(name: &str, value: &str) -> Vec<String> {
        vec![name.to_string(), value.to_string()]
    }

    fn event(kind: u32, tags: Vec<Vec<String>>) -> NostrEvent {
        NostrEvent {
            id: "e".repeat(64),
            pubkey: "f".repeat(64),
            created_at: 1_700_000_000,
            kind,
            tags,
            content: String::new(),
            sig: "0".repeat(128),
        }
    }

    #[test]
    fn from_event_reads_the_set() {
        let tags = vec![
            tag("d", "fast"),
            tag("title", "Fast relays"),
            tag("description", "low latency"),
            tag("relay", "wss://a.com"),
            tag("relay", "wss://b.com"),
        ];
        let Ok(set) = RelaySet::from_event(&event(RELAY_SET_KIND, tags)) else {
            panic!("relay set event should parse");
        };
        assert_eq!(set.id, "fast");
        assert_eq!(set.title, "Fast relays");
        assert_eq!(set.description.as_deref(), Some("low latency"));
        assert_eq!(set.relays, vec![url("wss://a.com"), url("wss://b.com")]);
    }

    #[test]
    fn from_event_rejects_other_kinds() {
        let tags = vec![tag("d", "x"), tag("title", "X")];
        let Err(err) = RelaySet::from_event(&event(1, tags)) else {
            panic!("kind 1 is not a relay set");
        };
        assert!(matches!(err, GatewayError::InvalidRelaySet(_)));
    }

    #[test]
    fn from_tags_skips_junk() {
        let tags = vec![
            vec!["d".to_string(), "x".to_string()],
            vec!["title".to_string(), "X".to_string()],
            vec!["relay".to_string(), "http://nope".to_string()],
            vec!["relay".to_string(), "wss://ok.com".to_string()],
            vec!["relay".to_string(), "wss://ok.com/".to_string()],
            vec!["p".to_string()],
        ];
        let Ok(set) = RelaySet::from_tags(&tags) else {
            panic!("tags should parse");
        };
        assert_eq!(set.relays, vec![url("wss://ok.com")]);
        assert!(set.description.is_none());
    }

    #[test]
    fn from_tags_without_title_fails() {
        let tags = vec![vec!["d".to_string(), "x".to_string()]];
        assert!(RelaySet::from_tags(&tags).is_err());
    }
}
