//! The HTTP surface: `/ws` sessions, `/health`, and `/api/v1/relays`,
//! served on a random local port.

#![allow(clippy::panic)]

mod common;

use std::net::SocketAddr;

use common::{MockRelay, WAIT, note, wait_connected};
use futures_util::{SinkExt, StreamExt};
use relay_gateway::api::dto::RelayListResponse;
use relay_gateway::api::handlers::system::HealthResponse;
use relay_gateway::config::GatewayConfig;
use relay_gateway::server::{bootstrap, build_app};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(relays: &[&MockRelay]) -> SocketAddr {
    let config = GatewayConfig {
        default_relays: relays.iter().map(|relay| relay.url()).collect(),
        ..GatewayConfig::default()
    };
    let (state, _pool) = bootstrap(&config);
    let mut status = state.status.clone();
    wait_connected(&mut status, relays.len()).await;

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) => panic!("bind failed: {e}"),
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let app = build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> (Client, u64) {
    let mut client = match tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await {
        Ok((client, _)) => client,
        Err(e) => panic!("ws connect failed: {e}"),
    };
    let greeting = next_frame(&mut client).await;
    assert_eq!(greeting["type"], "CLIENT_ID");
    let Some(id) = greeting["data"]["clientId"].as_u64() else {
        panic!("CLIENT_ID without id: {greeting}");
    };
    (client, id)
}

async fn send(client: &mut Client, frame: Value) {
    if let Err(e) = client.send(Message::text(frame.to_string())).await {
        panic!("send failed: {e}");
    }
}

async fn next_frame(client: &mut Client) -> Value {
    loop {
        match timeout(WAIT, client.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str(text.as_str()) {
                Ok(value) => return value,
                Err(e) => panic!("gateway sent invalid JSON: {e}"),
            },
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("socket ended: {other:?}"),
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }
}

async fn next_of_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let frame = next_frame(client).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

#[tokio::test]
async fn clients_get_distinct_ids_first() {
    let addr = serve(&[]).await;
    let (_first, a) = connect(addr).await;
    let (_second, b) = connect(addr).await;
    assert_ne!(a, b);
}

#[tokio::test]
async fn unknown_command_is_answered_with_error() {
    let addr = serve(&[]).await;
    let (mut client, _) = connect(addr).await;

    send(&mut client, json!({ "type": "FLY_TO_MOON", "data": {} })).await;
    let error = next_of_type(&mut client, "ERROR").await;
    assert_eq!(error["data"]["code"], 1004);

    send(&mut client, json!({ "type": "ADD_RELAY", "data": { "urls": ["https://nope.com"] } })).await;
    let error = next_of_type(&mut client, "ERROR").await;
    assert_eq!(error["data"]["code"], 1001);

    send(&mut client, json!({ "type": "PULL_STATUS" })).await;
    let status = next_of_type(&mut client, "STATUS").await;
    assert_eq!(status["data"]["relays"], json!([]));
}

#[tokio::test]
async fn subscribe_over_websocket_delivers_events_and_eose() {
    let relay = MockRelay::start(vec![note("e1", 1)]).await;
    let addr = serve(&[&relay]).await;
    let (mut client, id) = connect(addr).await;

    send(
        &mut client,
        json!({
            "type": "SUBSCRIBE",
            "data": { "filter": { "kinds": [1] }, "subscriptionId": "feed" }
        }),
    )
    .await;

    let event = next_of_type(&mut client, "EVENT").await;
    assert_eq!(event["data"]["subscriptionId"], "feed");
    assert_eq!(event["data"]["relayUrl"], relay.url().as_str());
    assert_eq!(event["data"]["event"]["id"], "e1");

    let eose = next_of_type(&mut client, "EOSE").await;
    assert_eq!(eose["data"]["subscriptionId"], "feed");
    let wire_id = format!("{id}:feed");
    relay.wait_until("CLOSE feed", |seen| seen.closes == [wire_id.clone()]).await;
}

#[tokio::test]
async fn publish_over_websocket_reports_each_relay() {
    let relay = MockRelay::start(Vec::new()).await;
    let addr = serve(&[&relay]).await;
    let (mut client, _) = connect(addr).await;

    let event = match serde_json::to_value(note("p9", 1)) {
        Ok(event) => event,
        Err(e) => panic!("note serializes: {e}"),
    };
    send(&mut client, json!({ "type": "PUBLISH", "data": { "event": event } })).await;

    let result = next_of_type(&mut client, "PUBLISH_RESULT").await;
    assert_eq!(result["data"]["eventId"], "p9");
    assert_eq!(result["data"]["success"], true);
    assert_eq!(relay.published().await, vec!["p9".to_string()]);
}

#[tokio::test]
async fn closing_the_socket_releases_the_client() {
    let relay = MockRelay::start(Vec::new()).await;
    let addr = serve(&[&relay]).await;
    let (mut client, id) = connect(addr).await;

    send(
        &mut client,
        json!({
            "type": "SUBSCRIBE",
            "data": { "filter": {}, "keepAlive": true, "subscriptionId": "live" }
        }),
    )
    .await;
    next_of_type(&mut client, "EOSE").await;
    let _ = client.close(None).await;

    let wire_id = format!("{id}:live");
    relay.wait_until("CLOSE live", |seen| seen.closes == [wire_id.clone()]).await;
}

#[tokio::test]
async fn health_and_relay_list_are_served() {
    let relay = MockRelay::start(Vec::new()).await;
    let addr = serve(&[&relay]).await;
    let (_client, _) = connect(addr).await;
    let http = reqwest::Client::new();

    let health: HealthResponse = match http.get(format!("http://{addr}/health")).send().await {
        Ok(response) => match response.json().await {
            Ok(body) => body,
            Err(e) => panic!("bad health body: {e}"),
        },
        Err(e) => panic!("health request failed: {e}"),
    };
    assert_eq!(health.status, "healthy");
    assert_eq!(health.clients, 1);

    let relays: RelayListResponse = match http.get(format!("http://{addr}/api/v1/relays")).send().await {
        Ok(response) => match response.json().await {
            Ok(body) => body,
            Err(e) => panic!("bad relay list body: {e}"),
        },
        Err(e) => panic!("relay list request failed: {e}"),
    };
    assert_eq!(relays.label, "Global (1/1)");
    assert_eq!(relays.total, 1);
    assert_eq!(relays.relays.first().map(|r| r.url.as_str()), Some(relay.url().as_str()));
}
