//! In-process mock relay and helpers shared by the integration tests.
//!
//! The relay speaks just enough NIP-01 for the gateway: it answers `REQ`
//! with its stored events (optionally filtered by kind) followed by `EOSE`,
//! acknowledges `EVENT`s with `OK`, records every frame it receives, and can
//! push live events or drop every connection on demand.

#![allow(dead_code, clippy::panic)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_gateway::domain::{NostrEvent, RelayUrl, StatusSnapshot};
use relay_gateway::gateway::ClientSession;
use relay_gateway::ws::messages::GatewayMessage;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct RelayState {
    stored: Vec<NostrEvent>,
    reqs: Vec<(String, Value)>,
    closes: Vec<String>,
    published: Vec<String>,
    connections: usize,
    mute_acks: bool,
    reject_reason: Option<String>,
    withhold_eose: bool,
    ignore_closes: bool,
}

#[derive(Debug, Clone)]
enum Control {
    Push(NostrEvent),
    Drop,
}

/// A relay listening on a random local port.
#[derive(Debug, Clone)]
pub struct MockRelay {
    addr: SocketAddr,
    state: Arc<Mutex<RelayState>>,
    control: broadcast::Sender<Control>,
}

impl MockRelay {
    /// Starts a relay serving `stored`.
    pub async fn start(stored: Vec<NostrEvent>) -> Self {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => panic!("bind failed: {e}"),
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let (control, _) = broadcast::channel(64);
        let relay = Self {
            addr,
            state: Arc::new(Mutex::new(RelayState {
                stored,
                ..RelayState::default()
            })),
            control,
        };

        let accepting = relay.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = accepting.clone();
                tokio::spawn(async move { connection.serve(stream).await });
            }
        });
        relay
    }

    /// URL clients use to reach this relay.
    pub fn url(&self) -> RelayUrl {
        match RelayUrl::parse(&format!("ws://{}", self.addr)) {
            Ok(url) => url,
            Err(e) => panic!("bad mock url: {e}"),
        }
    }

    /// Stops acknowledging published events.
    pub async fn mute_acks(&self) {
        self.state.lock().await.mute_acks = true;
    }

    /// Rejects every published event with `reason`.
    pub async fn reject_with(&self, reason: &str) {
        self.state.lock().await.reject_reason = Some(reason.to_string());
    }

    /// Stops sending end-of-stored-events.
    pub async fn withhold_eose(&self) {
        self.state.lock().await.withhold_eose = true;
    }

    /// Records `CLOSE` frames but keeps pushing to the closed ids.
    pub async fn ignore_closes(&self) {
        self.state.lock().await.ignore_closes = true;
    }

    /// Sends `event` to every open subscription.
    pub fn push(&self, event: NostrEvent) {
        let _ = self.control.send(Control::Push(event));
    }

    /// Closes every connection.
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Subscription ids received in `CLOSE` frames.
    pub async fn closes(&self) -> Vec<String> {
        self.state.lock().await.closes.clone()
    }

    /// Subscription ids received in `REQ` frames.
    pub async fn req_ids(&self) -> Vec<String> {
        self.state.lock().await.reqs.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Event ids received in `EVENT` frames.
    pub async fn published(&self) -> Vec<String> {
        self.state.lock().await.published.clone()
    }

    /// Number of WebSocket connections accepted so far.
    pub async fn connections(&self) -> usize {
        self.state.lock().await.connections
    }

    /// Polls until `check` holds on this relay, or panics after [`WAIT`].
    pub async fn wait_until<F>(&self, what: &str, check: F)
    where
        F: Fn(&MockRelaySnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let snapshot = {
                let state = self.state.lock().await;
                MockRelaySnapshot {
                    closes: state.closes.clone(),
                    reqs: state.reqs.iter().map(|(id, _)| id.clone()).collect(),
                    published: state.published.clone(),
                    connections: state.connections,
                }
            };
            if check(&snapshot) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {what}: {snapshot:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn serve(self, stream: TcpStream) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(_) => return,
        };
        self.state.lock().await.connections += 1;
        let (mut tx, mut rx) = ws.split();
        let mut control = self.control.subscribe();
        let mut open: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                frame = rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        for reply in self.handle(text.as_str(), &mut open).await {
                            if tx.send(Message::text(reply.to_string())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                command = control.recv() => match command {
                    Ok(Control::Push(event)) => {
                        for id in &open {
                            let frame = json!(["EVENT", id, event]);
                            if tx.send(Message::text(frame.to_string())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Control::Drop) | Err(_) => {
                        let _ = tx.close().await;
                        return;
                    }
                },
            }
        }
    }

    async fn handle(&self, text: &str, open: &mut HashSet<String>) -> Vec<Value> {
        let Ok(Value::Array(frame)) = serde_json::from_str::<Value>(text) else {
            return vec![json!(["NOTICE", "could not parse"])];
        };
        let label = frame.first().and_then(Value::as_str).unwrap_or_default();
        let mut state = self.state.lock().await;

        match label {
            "REQ" => {
                let id = frame.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                let filter = frame.get(2).cloned().unwrap_or(Value::Null);
                let kinds: Option<Vec<u64>> = filter
                    .get("kinds")
                    .and_then(Value::as_array)
                    .map(|kinds| kinds.iter().filter_map(Value::as_u64).collect());
                state.reqs.push((id.clone(), filter));
                open.insert(id.clone());

                let mut replies: Vec<Value> = state
                    .stored
                    .iter()
                    .filter(|event| kinds.as_ref().is_none_or(|k| k.contains(&u64::from(event.kind))))
                    .map(|event| json!(["EVENT", id, event]))
                    .collect();
                if !state.withhold_eose {
                    replies.push(json!(["EOSE", id]));
                }
                replies
            }
            "CLOSE" => {
                let id = frame.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                if !state.ignore_closes {
                    open.remove(&id);
                }
                state.closes.push(id);
                Vec::new()
            }
            "EVENT" => {
                let id = frame
                    .get(1)
                    .and_then(|event| event.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                state.published.push(id.clone());
                if state.mute_acks {
                    return Vec::new();
                }
                match &state.reject_reason {
                    Some(reason) => vec![json!(["OK", id, false, reason])],
                    None => vec![json!(["OK", id, true, ""])],
                }
            }
            _ => vec![json!(["NOTICE", "unsupported"])],
        }
    }
}

/// Frames a relay has seen, for [`MockRelay::wait_until`].
#[derive(Debug, Clone)]
pub struct MockRelaySnapshot {
    /// `CLOSE` subscription ids.
    pub closes: Vec<String>,
    /// `REQ` subscription ids.
    pub reqs: Vec<String>,
    /// Published event ids.
    pub published: Vec<String>,
    /// Connections accepted.
    pub connections: usize,
}

/// Builds a text note.
pub fn note(id: &str, kind: u32) -> NostrEvent {
    NostrEvent {
        id: id.to_string(),
        pubkey: "f".repeat(64),
        created_at: 1_700_000_000,
        kind,
        tags: vec![],
        content: format!("note {id}"),
        sig: "0".repeat(128),
    }
}

/// Waits until the pool reports `connected` relays as connected.
pub async fn wait_connected(status: &mut watch::Receiver<StatusSnapshot>, connected: usize) -> StatusSnapshot {
    match timeout(WAIT, status.wait_for(|s| s.connected_count() == connected)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => panic!("pool stopped"),
        Err(_) => panic!("timed out waiting for {connected} connected relays"),
    }
}

/// Receives the next message of a session, panicking after [`WAIT`].
pub async fn next_message(session: &mut ClientSession) -> GatewayMessage {
    match timeout(WAIT, session.recv()).await {
        Ok(Some(message)) => message,
        Ok(None) => panic!("session ended"),
        Err(_) => panic!("timed out waiting for a message"),
    }
}

/// Receives messages until `pick` accepts one, skipping the rest.
pub async fn next_matching<T>(session: &mut ClientSession, pick: impl Fn(GatewayMessage) -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, session.recv()).await {
            Ok(Some(message)) => {
                if let Some(found) = pick(message) {
                    return found;
                }
            }
            Ok(None) => panic!("session ended"),
            Err(_) => panic!("timed out waiting for a matching message"),
        }
    }
}

/// Collects every message arriving within `window`.
pub async fn drain(session: &mut ClientSession, window: Duration) -> Vec<GatewayMessage> {
    let mut messages = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, session.recv()).await {
            Ok(Some(message)) => messages.push(message),
            Ok(None) | Err(_) => return messages,
        }
    }
}
