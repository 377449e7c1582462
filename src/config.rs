//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                    | Default        |
//! |-----------------------------|----------------|
//! | `LISTEN_ADDR`               | `0.0.0.0:3000` |
//! | `DEFAULT_RELAYS`            | (none)         |
//! | `EVENT_BUS_CAPACITY`        | `10000`        |
//! | `COMMAND_QUEUE_CAPACITY`    | `1024`         |
//! | `CONNECT_TIMEOUT_SECS`      | `10`           |
//! | `PUBLISH_TIMEOUT_SECS`      | `30`           |
//! | `SUBSCRIPTION_TIMEOUT_SECS` | `30`           |
//! | `LOG_FORMAT`                | `text`         |

use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;

use crate::domain::RelayUrl;
use crate::service::PoolSettings;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Relays the pool connects to at startup.
    pub default_relays: Vec<RelayUrl>,

    /// Capacity of the EventBus status ring.
    pub event_bus_capacity: usize,

    /// Capacity of the pool's command queue.
    pub command_queue_capacity: usize,

    /// Seconds a relay handshake may take.
    pub connect_timeout_secs: u64,

    /// Seconds a relay may take to acknowledge a publish (0 = no limit).
    pub publish_timeout_secs: u64,

    /// Seconds a relay may take to finish sending stored events for a
    /// subscription that is not kept alive (0 = no limit).
    pub subscription_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            default_relays: Vec::new(),
            event_bus_capacity: 10_000,
            command_queue_capacity: 1024,
            connect_timeout_secs: 10,
            publish_timeout_secs: 30,
            subscription_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw.parse()?,
            None => defaults.listen_addr,
        };

        let default_relays = lookup("DEFAULT_RELAYS")
            .map(|raw| parse_relays(&raw))
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            default_relays,
            event_bus_capacity: parse_env(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            command_queue_capacity: parse_env(&lookup, "COMMAND_QUEUE_CAPACITY", defaults.command_queue_capacity),
            connect_timeout_secs: parse_env(&lookup, "CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            publish_timeout_secs: parse_env(&lookup, "PUBLISH_TIMEOUT_SECS", defaults.publish_timeout_secs),
            subscription_timeout_secs: parse_env(
                &lookup,
                "SUBSCRIPTION_TIMEOUT_SECS",
                defaults.subscription_timeout_secs,
            ),
        })
    }

    /// Timing settings for the connection pool.
    ///
    /// The handshake timeout is at least one second; zero publish and
    /// subscription timeouts disable those deadlines.
    #[must_use]
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            publish_timeout: deadline(self.publish_timeout_secs),
            subscription_timeout: deadline(self.subscription_timeout_secs),
        }
    }
}

/// Output format of the log subscriber, read from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`, loading a `.env` file first.
    ///
    /// Called before the subscriber exists, so it cannot log.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    /// `json` (any case) selects [`LogFormat::Json`]; anything else is text.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn deadline(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Parses a comma-separated relay list, skipping invalid entries.
fn parse_relays(raw: &str) -> Vec<RelayUrl> {
    let mut relays: Vec<RelayUrl> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match RelayUrl::parse(entry) {
            Ok(url) if !relays.contains(&url) => relays.push(url),
            Ok(_) => {}
            Err(e) => warn!(entry, error = %e, "ignoring DEFAULT_RELAYS entry"),
        }
    }
    relays
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
