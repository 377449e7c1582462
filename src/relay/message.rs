//! Relay wire format (NIP-01).
//!
//! Client → relay frames are JSON arrays built by [`ClientMessage`];
//! relay → client frames are parsed into [`RelayMessage`].
//!
//! ```text
//! ["REQ", <sub id>, <filter>]        ["EVENT", <sub id>, <event>]
//! ["CLOSE", <sub id>]                ["EOSE", <sub id>]
//! ["EVENT", <event>]                 ["OK", <event id>, <bool>, <message>]
//!                                    ["NOTICE", <message>]
//!                                    ["CLOSED", <sub id>, <message>]
//! ```

use serde_json::{Value, json};

use crate::domain::{Filter, NostrEvent, SubscriptionId};
use crate::error::GatewayError;

/// A frame sent to a relay.
#[derive(Debug, Clone, Copy)]
pub enum ClientMessage<'a> {
    /// Open a subscription.
    Req {
        /// Subscription id.
        subscription_id: &'a SubscriptionId,
        /// Filter to match.
        filter: &'a Filter,
    },
    /// Close a subscription.
    Close(&'a SubscriptionId),
    /// Publish an event.
    Event(&'a NostrEvent),
}

impl ClientMessage<'_> {
    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if a payload fails to serialize.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        let frame = match self {
            Self::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]),
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
            Self::Event(event) => json!(["EVENT", event]),
        };
        serde_json::to_string(&frame).map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

/// A frame received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// An event matching a subscription.
    Event {
        /// Subscription the event belongs to.
        subscription_id: SubscriptionId,
        /// The event.
        event: NostrEvent,
    },
    /// End of stored events for a subscription.
    Eose(SubscriptionId),
    /// Acknowledgement of a published event.
    Ok {
        /// Id of the acknowledged event.
        event_id: String,
        /// Whether the relay accepted it.
        accepted: bool,
        /// Relay-supplied reason.
        message: String,
    },
    /// Human-readable notice.
    Notice(String),
    /// The relay closed a subscription on its own.
    Closed {
        /// Subscription closed.
        subscription_id: SubscriptionId,
        /// Relay-supplied reason.
        message: String,
    },
}

impl RelayMessage {
    /// Parses a text frame from a relay.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MalformedRelayMessage`] if the frame is not
    /// a JSON array, has an unknown label, or misses required elements.
    pub fn from_json(text: &str) -> Result<Self, GatewayError> {
        let frame: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| GatewayError::MalformedRelayMessage(e.to_string()))?;
        let mut items = frame.into_iter();
        let label = next_string(&mut items, "label")?;

        match label.as_str() {
            "EVENT" => {
                let subscription_id = SubscriptionId::new(next_string(&mut items, "subscription id")?);
                let raw = items
                    .next()
                    .ok_or_else(|| malformed("EVENT without payload"))?;
                let event = serde_json::from_value(raw)
                    .map_err(|e| malformed(&format!("EVENT payload: {e}")))?;
                Ok(Self::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(Self::Eose(SubscriptionId::new(next_string(
                &mut items,
                "subscription id",
            )?))),
            "OK" => {
                let event_id = next_string(&mut items, "event id")?;
                let accepted = items
                    .next()
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| malformed("OK without boolean status"))?;
                let message = optional_string(&mut items);
                Ok(Self::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => Ok(Self::Notice(optional_string(&mut items))),
            "CLOSED" => {
                let subscription_id = SubscriptionId::new(next_string(&mut items, "subscription id")?);
                Ok(Self::Closed {
                    subscription_id,
                    message: optional_string(&mut items),
                })
            }
            other => Err(malformed(&format!("unrecognized message type: '{other}'"))),
        }
    }
}

fn malformed(reason: &str) -> GatewayError {
    GatewayError::MalformedRelayMessage(reason.to_string())
}

fn next_string(items: &mut impl Iterator<Item = Value>, what: &str) -> Result<String, GatewayError> {
    match items.next() {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(malformed(&format!("{what} is not a string"))),
        None => Err(malformed(&format!("missing {what}"))),
    }
}

fn optional_string(items: &mut impl Iterator<Item = Value>) -> String {
    match items.next() {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}
