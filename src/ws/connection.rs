//! WebSocket connection state machine.
//!
//! Bridges one `/ws` connection to a [`ClientSession`]: text frames are
//! dispatched as commands, session messages are written back as text
//! frames. Rejected commands are answered with an `ERROR` message to this
//! connection only.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::messages::GatewayMessage;
use crate::gateway::{ClientSession, Gateway};

/// Runs the read/write loop for a single WebSocket connection.
///
/// The client is detached when the socket closes, when the client sends
/// `CLOSE_CLIENT`, or when the pool stops.
pub async fn run_connection(socket: WebSocket, gateway: Gateway, mut session: ClientSession) {
    let client_id = session.id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = gateway.dispatch_json(client_id, text.as_str()).await {
                            let reply = GatewayMessage::from(&e);
                            if !send(&mut ws_tx, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%client_id, error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            message = session.recv() => {
                let Some(message) = message else { break };
                if !send(&mut ws_tx, &message).await {
                    break;
                }
            }
        }
    }

    gateway.detach(client_id).await;
    let _ = ws_tx.close().await;
    debug!(%client_id, "ws connection closed");
}

/// Writes one message. Returns `false` once the socket is gone.
async fn send(ws_tx: &mut SplitSink<WebSocket, Message>, message: &GatewayMessage) -> bool {
    match message.to_json() {
        Ok(json) => ws_tx.send(Message::text(json)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "dropping unserializable message");
            true
        }
    }
}
