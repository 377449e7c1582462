//! Client ⇄ gateway message types.
//!
//! Both directions use the same envelope:
//!
//! ```json
//! { "type": "SUBSCRIBE", "data": { "filter": { "kinds": [1] }, "keepAlive": true } }
//! ```
//!
//! Inbound envelopes are parsed into a [`ClientCommand`]; outbound results
//! are [`GatewayMessage`]s. A `clientId` inside `data` is accepted and
//! ignored: the gateway always acts for the session the command arrived on.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{
    ClientId, Filter, NostrEvent, PoolEvent, PoolOp, PublishResult, RelaySet, RelaySwitch, RelayUrl, StatusSnapshot,
    SubscribeRequest, SubscriptionId, TimedOperation,
};
use crate::error::{ErrorBody, GatewayError};

/// The closed set of command kinds a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Add relays to the pool.
    AddRelay,
    /// Replace the pool's relay set.
    SwitchRelays,
    /// Ask for a status broadcast.
    PullStatus,
    /// Open a subscription on every connected relay.
    Subscribe,
    /// Close a subscription.
    Unsubscribe,
    /// Publish an event to every connected relay.
    Publish,
    /// Close relay sockets once idle.
    Disconnect,
    /// Detach and tear down the client's subscriptions.
    CloseClient,
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `ADD_RELAY {urls}`.
    AddRelay {
        /// Relays to add.
        urls: Vec<RelayUrl>,
    },
    /// `SWITCH_RELAYS {id?, relays}` or `SWITCH_RELAYS {relaySet}`.
    SwitchRelays(RelaySwitch),
    /// `PULL_STATUS`.
    PullStatus,
    /// `SUBSCRIBE {filter, keepAlive, subscriptionId?}`.
    Subscribe(SubscribeRequest),
    /// `UNSUBSCRIBE {subscriptionId}`.
    Unsubscribe {
        /// Subscription to close.
        subscription_id: SubscriptionId,
    },
    /// `PUBLISH {event}`.
    Publish {
        /// Event to publish.
        event: NostrEvent,
    },
    /// `DISCONNECT`.
    Disconnect,
    /// `CLOSE_CLIENT`.
    CloseClient,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Value,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct AddRelayData {
    urls: Vec<String>,
}

#[derive(Deserialize)]
struct SwitchRelaysData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    relays: Option<Vec<String>>,
    #[serde(default, rename = "relaySet")]
    relay_set: Option<NostrEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeData {
    #[serde(default)]
    filter: Filter,
    #[serde(default)]
    keep_alive: bool,
    #[serde(default)]
    subscription_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeData {
    subscription_id: String,
}

#[derive(Deserialize)]
struct PublishData {
    event: NostrEvent,
}

impl ClientCommand {
    /// Parses a JSON envelope.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidCommand`] if the text is not an envelope or
    ///   the `data` does not fit the command.
    /// - [`GatewayError::UnknownCommand`] if `type` names no known command.
    /// - [`GatewayError::InvalidRelayUrl`] if a relay URL is invalid; no
    ///   relay of the command is applied in that case.
    pub fn from_json(text: &str) -> Result<Self, GatewayError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let kind = serde_json::from_value::<CommandKind>(envelope.kind.clone())
            .map_err(|_| GatewayError::UnknownCommand(envelope.kind.to_string()))?;
        Self::from_data(kind, envelope.data)
    }

    fn from_data(kind: CommandKind, data: Value) -> Result<Self, GatewayError> {
        let command = match kind {
            CommandKind::AddRelay => {
                let AddRelayData { urls } = parse_data(kind, data)?;
                Self::AddRelay {
                    urls: RelayUrl::parse_all(urls)?,
                }
            }
            CommandKind::SwitchRelays => {
                let SwitchRelaysData { id, relays, relay_set } = parse_data(kind, data)?;
                match (relay_set, relays) {
                    (Some(event), _) => Self::SwitchRelays(RelaySet::from_event(&event)?.into()),
                    (None, Some(relays)) => Self::SwitchRelays(RelaySwitch {
                        id,
                        relays: RelayUrl::parse_all(relays)?,
                    }),
                    (None, None) => {
                        return Err(GatewayError::InvalidCommand(format!(
                            "{kind:?}: missing field `relays`"
                        )));
                    }
                }
            }
            CommandKind::PullStatus => Self::PullStatus,
            CommandKind::Subscribe => {
                let SubscribeData {
                    filter,
                    keep_alive,
                    subscription_id,
                } = parse_data(kind, data)?;
                let subscription_id = subscription_id
                    .filter(|id| !id.is_empty())
                    .map(SubscriptionId::new);
                Self::Subscribe(SubscribeRequest::new(filter, keep_alive, subscription_id))
            }
            CommandKind::Unsubscribe => {
                let UnsubscribeData { subscription_id } = parse_data(kind, data)?;
                Self::Unsubscribe {
                    subscription_id: SubscriptionId::new(subscription_id),
                }
            }
            CommandKind::Publish => {
                let PublishData { event } = parse_data(kind, data)?;
                Self::Publish { event }
            }
            CommandKind::Disconnect => Self::Disconnect,
            CommandKind::CloseClient => Self::CloseClient,
        };
        Ok(command)
    }

    /// Returns the kind of this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::AddRelay { .. } => CommandKind::AddRelay,
            Self::SwitchRelays(_) => CommandKind::SwitchRelays,
            Self::PullStatus => CommandKind::PullStatus,
            Self::Subscribe(_) => CommandKind::Subscribe,
            Self::Unsubscribe { .. } => CommandKind::Unsubscribe,
            Self::Publish { .. } => CommandKind::Publish,
            Self::Disconnect => CommandKind::Disconnect,
            Self::CloseClient => CommandKind::CloseClient,
        }
    }

    /// Builds the JSON envelope for this command, the inverse of
    /// [`from_json`](Self::from_json).
    #[must_use]
    pub fn to_envelope(&self) -> Value {
        let data = match self {
            Self::AddRelay { urls } => json!({ "urls": urls }),
            Self::SwitchRelays(switch) => json!({ "id": switch.id, "relays": switch.relays }),
            Self::Subscribe(request) => json!({
                "filter": request.filter,
                "keepAlive": request.keep_alive,
                "subscriptionId": request.subscription_id,
            }),
            Self::Unsubscribe { subscription_id } => json!({ "subscriptionId": subscription_id }),
            Self::Publish { event } => json!({ "event": event }),
            Self::PullStatus | Self::Disconnect | Self::CloseClient => json!({}),
        };
        json!({ "type": self.kind(), "data": data })
    }
}

impl From<ClientCommand> for PoolOp {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::AddRelay { urls } => Self::AddRelays(urls),
            ClientCommand::SwitchRelays(switch) => Self::SwitchRelays(switch),
            ClientCommand::PullStatus => Self::PullStatus,
            ClientCommand::Subscribe(request) => Self::Subscribe(request),
            ClientCommand::Unsubscribe { subscription_id } => Self::Unsubscribe(subscription_id),
            ClientCommand::Publish { event } => Self::Publish(event),
            ClientCommand::Disconnect => Self::Disconnect,
            ClientCommand::CloseClient => Self::CloseClient,
        }
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(kind: CommandKind, data: Value) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|e| GatewayError::InvalidCommand(format!("{kind:?}: {e}")))
}

/// A result delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessage {
    /// Always the first message of a session.
    ClientId {
        /// Id assigned to the session.
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    /// Configured relays and their status.
    Status(StatusSnapshot),
    /// An event for one of the client's subscriptions.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Subscription the event matched.
        subscription_id: SubscriptionId,
        /// Relay that delivered it.
        relay_url: RelayUrl,
        /// The event.
        event: NostrEvent,
    },
    /// A relay finished sending stored events.
    #[serde(rename_all = "camelCase")]
    Eose {
        /// Subscription concerned.
        subscription_id: SubscriptionId,
        /// Relay that sent the signal.
        relay_url: RelayUrl,
    },
    /// A relay's answer to a published event.
    PublishResult(PublishResult),
    /// A relay missed a deadline.
    #[serde(rename_all = "camelCase")]
    Timeout {
        /// Relay that did not answer.
        relay_url: RelayUrl,
        /// Operation that timed out.
        operation: TimedOperation,
        /// Event id or subscription id.
        id: String,
    },
    /// A command was rejected.
    Error(ErrorBody),
}

impl GatewayMessage {
    /// Translates a pool result for `client_id`, or `None` if the result is
    /// addressed to another client.
    #[must_use]
    pub fn route(client_id: ClientId, event: &PoolEvent) -> Option<Self> {
        if !event.is_for(client_id) {
            return None;
        }
        let message = match event {
            PoolEvent::StatusChanged(snapshot) => Self::Status(snapshot.clone()),
            PoolEvent::Event {
                subscription_id,
                relay_url,
                event,
                ..
            } => Self::Event {
                subscription_id: subscription_id.clone(),
                relay_url: relay_url.clone(),
                event: event.clone(),
            },
            PoolEvent::Eose {
                subscription_id,
                relay_url,
                ..
            } => Self::Eose {
                subscription_id: subscription_id.clone(),
                relay_url: relay_url.clone(),
            },
            PoolEvent::PublishResult { result, .. } => Self::PublishResult(result.clone()),
            PoolEvent::Timeout {
                relay_url,
                operation,
                id,
                ..
            } => Self::Timeout {
                relay_url: relay_url.clone(),
                operation: *operation,
                id: id.clone(),
            },
        };
        Some(message)
    }

    /// Serializes the message for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

impl From<&GatewayError> for GatewayMessage {
    fn from(err: &GatewayError) -> Self {
        Self::Error(err.to_body())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ClientCommand {
        match ClientCommand::from_json(text) {
            Ok(command) => command,
            Err(e) => panic!("expected {text} to parse: {e}"),
        }
    }

    #[test]
    fn parses_add_relay() {
        let command = parse(r#"{"type":"ADD_RELAY","data":{"urls":["wss://a.com/","wss://b.com"],"clientId":9}}"#);
        let ClientCommand::AddRelay { urls } = command else {
            panic!("wrong command");
        };
        assert_eq!(urls.len(), 2);
        assert_eq!(urls.first().map(RelayUrl::as_str), Some("wss://a.com"));
    }

    #[test]
    fn one_bad_url_rejects_the_command() {
        let Err(err) = ClientCommand::from_json(r#"{"type":"ADD_RELAY","data":{"urls":["wss://a.com","http://b.com"]}}"#) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::InvalidRelayUrl(_)));
    }

    #[test]
    fn subscribe_defaults() {
        let ClientCommand::Subscribe(request) = parse(r#"{"type":"SUBSCRIBE","data":{"filter":{"kinds":[1]}}}"#) else {
            panic!("wrong command");
        };
        assert!(!request.keep_alive);
        assert_eq!(request.filter, Filter::new().kinds([1]));
        assert_eq!(request.subscription_id.as_str().len(), 16);

        let ClientCommand::Subscribe(request) =
            parse(r#"{"type":"SUBSCRIBE","data":{"filter":{},"keepAlive":true,"subscriptionId":"feed"}}"#)
        else {
            panic!("wrong command");
        };
        assert!(request.keep_alive);
        assert_eq!(request.subscription_id.as_str(), "feed");
    }

    #[test]
    fn data_is_optional_for_bare_commands() {
        assert_eq!(parse(r#"{"type":"PULL_STATUS"}"#), ClientCommand::PullStatus);
        assert_eq!(parse(r#"{"type":"CLOSE_CLIENT","data":{"clientId":3}}"#), ClientCommand::CloseClient);
        assert_eq!(parse(r#"{"type":"DISCONNECT","data":null}"#), ClientCommand::Disconnect);
    }

    #[test]
    fn unknown_and_malformed_commands() {
        let Err(err) = ClientCommand::from_json(r#"{"type":"CALL_API","data":{}}"#) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::UnknownCommand(_)));

        let Err(err) = ClientCommand::from_json("not json") else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::InvalidCommand(_)));

        let Err(err) = ClientCommand::from_json(r#"{"type":"PUBLISH","data":{}}"#) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::InvalidCommand(_)));
    }

    #[test]
    fn envelope_parses_back() {
        let command = ClientCommand::Subscribe(SubscribeRequest::new(Filter::new().limit(5), true, Some("x".into())));
        let text = command.to_envelope().to_string();
        assert_eq!(parse(&text), command);
    }

    #[test]
    fn routes_only_own_results() {
        let Ok(relay_url) = RelayUrl::parse("wss://a.com") else {
            panic!("valid url");
        };
        let event = PoolEvent::Eose {
            client_id: ClientId::new(1),
            subscription_id: "s".into(),
            relay_url,
        };
        assert!(GatewayMessage::route(ClientId::new(2), &event).is_none());
        let Some(message) = GatewayMessage::route(ClientId::new(1), &event) else {
            panic!("expected a message");
        };
        let Ok(json) = serde_json::to_value(&message) else {
            panic!("serialization failed");
        };
        assert_eq!(
            json,
            json!({"type": "EOSE", "data": {"subscriptionId": "s", "relayUrl": "wss://a.com"}})
        );
    }

    #[test]
    fn client_id_message_layout() {
        let Ok(json) = GatewayMessage::ClientId {
            client_id: ClientId::new(0),
        }
        .to_json() else {
            panic!("serialization failed");
        };
        assert_eq!(json, r#"{"type":"CLIENT_ID","data":{"clientId":0}}"#);
    }

    #[test]
    fn switch_relays_accepts_a_relay_set_event() {
        let ClientCommand::SwitchRelays(switch) = parse(
            r#"{"type":"SWITCH_RELAYS","data":{"relaySet":{
                "id":"e","pubkey":"f","created_at":1700000000,"kind":30002,"content":"","sig":"0",
                "tags":[["d","work"],["title","Work"],["relay","wss://a.com/"],["relay","wss://b.com"]]
            }}}"#,
        ) else {
            panic!("wrong command");
        };
        assert_eq!(switch.id.as_deref(), Some("work"));
        let relays: Vec<&str> = switch.relays.iter().map(RelayUrl::as_str).collect();
        assert_eq!(relays, ["wss://a.com", "wss://b.com"]);
    }

    #[test]
    fn switch_relays_needs_relays_or_a_set() {
        let Err(err) = ClientCommand::from_json(r#"{"type":"SWITCH_RELAYS","data":{"id":"x"}}"#) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::InvalidCommand(_)));

        let Err(err) = ClientCommand::from_json(
            r#"{"type":"SWITCH_RELAYS","data":{"relaySet":{
                "id":"e","pubkey":"f","created_at":1,"kind":1,"content":"","sig":"0","tags":[]
            }}}"#,
        ) else {
            panic!("expected rejection");
        };
        assert!(matches!(err, GatewayError::InvalidRelaySet(_)));
    }
}
