//! Normalized relay endpoint URL.
//!
//! Two spellings of the same relay (`wss://Relay.Example.com/` and
//! `wss://relay.example.com`) must map to one socket, so every URL entering
//! the pool is normalized here:
//!
//! - surrounding whitespace is trimmed
//! - scheme and host are lowercased
//! - trailing slashes are removed
//! - only `ws://` and `wss://` are accepted

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A validated, normalized relay WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Parses and normalizes a relay URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRelayUrl`] if the input is not a URL,
    /// has no host, or uses a scheme other than `ws`/`wss`.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| GatewayError::InvalidRelayUrl(format!("{trimmed}: {e}")))?;

        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(GatewayError::InvalidRelayUrl(format!(
                "{trimmed}: scheme must be ws or wss"
            )));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(GatewayError::InvalidRelayUrl(format!(
                "{trimmed}: missing host"
            )));
        }

        let mut normalized = parsed.to_string();
        while normalized.ends_with('/') {
            normalized.pop();
        }
        Ok(Self(normalized))
    }

    /// Parses every URL in `raw`, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRelayUrl`] for the first entry that
    /// does not parse; nothing is returned for the valid ones in that case.
    pub fn parse_all<I, S>(raw: I) -> Result<Vec<Self>, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// Returns the normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RelayUrl {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RelayUrl {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelayUrl> for String {
    fn from(url: RelayUrl) -> Self {
        url.0
    }
}

impl AsRef<str> for RelayUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse_ok(raw: &str) -> RelayUrl {
        let Ok(url) = RelayUrl::parse(raw) else {
            panic!("expected {raw} to parse");
        };
        url
    }

    #[test]
    fn strips_trailing_slash_and_lowercases_host() {
        assert_eq!(
            parse_ok("  wss://Relay.Example.COM/ ").as_str(),
            "wss://relay.example.com"
        );
    }

    #[test]
    fn keeps_port_and_path() {
        assert_eq!(
            parse_ok("ws://127.0.0.1:7777/nostr/").as_str(),
            "ws://127.0.0.1:7777/nostr"
        );
    }

    #[test]
    fn equal_after_normalization() {
        assert_eq!(parse_ok("wss://relay.damus.io/"), parse_ok("wss://relay.damus.io"));
    }

    #[test]
    fn rejects_http_scheme() {
        assert!(RelayUrl::parse("https://relay.damus.io").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(RelayUrl::parse("not a url").is_err());
        assert!(RelayUrl::parse("").is_err());
    }

    #[test]
    fn parse_all_is_all_or_nothing() {
        assert!(RelayUrl::parse_all(["wss://a.com", "ftp://b.com"]).is_err());
        let Ok(urls) = RelayUrl::parse_all(["wss://a.com", "wss://b.com/"]) else {
            panic!("expected both to parse");
        };
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn serde_goes_through_validation() {
        let Ok(url) = serde_json::from_str::<RelayUrl>("\"wss://A.com/\"") else {
            panic!("deserialization failed");
        };
        assert_eq!(url.as_str(), "wss://a.com");
        assert!(serde_json::from_str::<RelayUrl>("\"http://a.com\"").is_err());
    }
}
