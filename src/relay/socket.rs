//! One WebSocket connection to one relay.
//!
//! [`RelaySocket`] is a cheap handle; the connection itself lives in a
//! spawned task that owns the transport, the subscription table, and the
//! pending acknowledgements. The handle talks to the task through a closed
//! set of [`SocketCommand`]s and the task reports every state transition on
//! the signal channel passed to [`RelaySocket::connect`].
//!
//! ```text
//! connecting ──► open ──► closed
//!      │           │
//!      └───────────┴────► error
//! ```
//!
//! `closed` and `error` are terminal: the socket never reconnects on its
//! own. Operations on a terminal socket hand back streams that end
//! immediately. A draining socket refuses new work and reports when it
//! has gone idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::message::{ClientMessage, RelayMessage};
use super::stream::{AckStream, PublishAck, SubscriptionItem, SubscriptionStream};
use crate::domain::{Filter, NostrEvent, RelayUrl, SubscriptionId};
use crate::error::GatewayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(0);

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Lifecycle state of a relay socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Handshake in progress.
    Connecting,
    /// Connected and exchanging frames.
    Open,
    /// Handshake or transport failed.
    Error,
    /// Closed locally or by the relay.
    Closed,
}

impl SocketState {
    /// Returns `true` for [`SocketState::Open`].
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once the socket can no longer become open.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Closed)
    }
}

/// State transition reported by a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSignal {
    /// Process-unique id of the socket instance, so transitions of a socket
    /// that was replaced can be told apart from its successor's.
    pub socket_id: u64,
    /// Relay the socket connects to.
    pub relay_url: RelayUrl,
    /// New state.
    pub state: SocketState,
}

/// Commands accepted by the socket task.
#[derive(Debug)]
pub(crate) enum SocketCommand {
    Subscribe {
        registration: Registration,
        filter: Filter,
    },
    Publish {
        event: NostrEvent,
        ack: oneshot::Sender<PublishAck>,
    },
    CloseSub {
        id: SubscriptionId,
        force: bool,
    },
    Drain {
        idle: oneshot::Sender<()>,
    },
    Close,
}

/// Delivery end of one subscription, owned by the socket task.
#[derive(Debug)]
pub(crate) struct Registration {
    id: SubscriptionId,
    keep_alive: bool,
    live: Arc<AtomicBool>,
    items: mpsc::UnboundedSender<SubscriptionItem>,
}

impl Registration {
    fn cancel(&self) {
        self.live.store(false, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Handle to one relay connection.
#[derive(Debug)]
pub struct RelaySocket {
    id: u64,
    url: RelayUrl,
    commands: mpsc::UnboundedSender<SocketCommand>,
    state: watch::Receiver<SocketState>,
}

impl RelaySocket {
    /// Starts connecting to `url` in a background task.
    ///
    /// Transitions are published on `signals`. The handshake is abandoned
    /// (state `error`) if it takes longer than `connect_timeout`.
    #[must_use]
    pub fn connect(
        url: RelayUrl,
        signals: mpsc::UnboundedSender<SocketSignal>,
        connect_timeout: Duration,
    ) -> Self {
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SocketState::Connecting);
        let reporter = StateReporter {
            socket_id: id,
            relay_url: url.clone(),
            state: state_tx,
            signals,
        };

        tokio::spawn(run(url.clone(), command_rx, reporter, connect_timeout));

        Self {
            id,
            url,
            commands,
            state,
        }
    }

    /// Process-unique id of this socket instance.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Relay this socket connects to.
    #[must_use]
    pub fn url(&self) -> &RelayUrl {
        &self.url
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    /// Returns `true` while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Opens a subscription.
    ///
    /// Reusing an id that is still open on this socket replaces the older
    /// subscription, whose stream then ends.
    #[must_use]
    pub fn subscribe(&self, filter: Filter, keep_alive: bool, id: SubscriptionId) -> SubscriptionStream {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicBool::new(true));
        let registration = Registration {
            id: id.clone(),
            keep_alive,
            live: Arc::clone(&live),
            items: items_tx,
        };

        if self
            .commands
            .send(SocketCommand::Subscribe {
                registration,
                filter,
            })
            .is_err()
        {
            debug!(relay = %self.url, subscription_id = %id, "subscribe on closed socket");
        }

        SubscriptionStream::new(
            self.url.clone(),
            id,
            keep_alive,
            live,
            items_rx,
            self.commands.downgrade(),
        )
    }

    /// Publishes an event; the returned stream yields the relay's `OK`.
    #[must_use]
    pub fn publish(&self, event: NostrEvent) -> AckStream {
        let (ack_tx, ack_rx) = oneshot::channel();
        let event_id = event.id.clone();

        if self
            .commands
            .send(SocketCommand::Publish { event, ack: ack_tx })
            .is_err()
        {
            debug!(relay = %self.url, event_id = %event_id, "publish on closed socket");
        }

        AckStream::new(self.url.clone(), event_id, ack_rx)
    }

    /// Closes a subscription and stops local delivery.
    ///
    /// Unknown ids are ignored unless `force` is set, in which case the
    /// `CLOSE` frame is sent regardless.
    pub fn close_sub(&self, id: &SubscriptionId, force: bool) {
        let _ = self.commands.send(SocketCommand::CloseSub {
            id: id.clone(),
            force,
        });
    }

    /// Tears the connection down now.
    pub fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    /// Stops taking new work. The returned receiver resolves once no
    /// subscription is open and no acknowledgement is pending, or errors
    /// when the socket goes away first. The connection stays up until
    /// [`close`](Self::close) is called.
    #[must_use]
    pub fn drain(&self) -> oneshot::Receiver<()> {
        let (idle, idle_rx) = oneshot::channel();
        if self.commands.send(SocketCommand::Drain { idle }).is_err() {
            trace!(relay = %self.url, "drain on closed socket");
        }
        idle_rx
    }
}

#[derive(Debug)]
struct StateReporter {
    socket_id: u64,
    relay_url: RelayUrl,
    state: watch::Sender<SocketState>,
    signals: mpsc::UnboundedSender<SocketSignal>,
}

impl StateReporter {
    fn report(&self, state: SocketState) {
        self.state.send_replace(state);
        let _ = self.signals.send(SocketSignal {
            socket_id: self.socket_id,
            relay_url: self.relay_url.clone(),
            state,
        });
    }
}

async fn run(
    url: RelayUrl,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    reporter: StateReporter,
    connect_timeout: Duration,
) {
    let handshake = timeout(connect_timeout, tokio_tungstenite::connect_async(url.to_string()));
    tokio::pin!(handshake);
    let mut deferred = Vec::new();

    let ws = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok(Ok((ws, _response))) => break ws,
                Ok(Err(e)) => {
                    warn!(relay = %url, error = %e, "relay handshake failed");
                    reporter.report(SocketState::Error);
                    return;
                }
                Err(_) => {
                    warn!(relay = %url, timeout = ?connect_timeout, "relay handshake timed out");
                    reporter.report(SocketState::Error);
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Close) | None => {
                    debug!(relay = %url, "socket closed before handshake completed");
                    reporter.report(SocketState::Closed);
                    return;
                }
                Some(command) => deferred.push(command),
            },
        }
    };

    info!(relay = %url, "relay connected");
    reporter.report(SocketState::Open);

    let driver = SocketDriver {
        url,
        subs: HashMap::new(),
        pending: HashMap::new(),
        draining: false,
        idle_waiters: Vec::new(),
    };
    let final_state = driver.drive(ws, commands, deferred).await;
    reporter.report(final_state);
}

enum Flow {
    Continue,
    Stop,
}

enum Stop {
    Local,
    Remote(SocketState),
}

struct SocketDriver {
    url: RelayUrl,
    subs: HashMap<SubscriptionId, Registration>,
    pending: HashMap<String, oneshot::Sender<PublishAck>>,
    draining: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl SocketDriver {
    async fn drive(
        mut self,
        ws: WsStream,
        mut commands: mpsc::UnboundedReceiver<SocketCommand>,
        deferred: Vec<SocketCommand>,
    ) -> SocketState {
        let (mut sink, mut frames) = ws.split();

        for command in deferred {
            match self.on_command(&mut sink, command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return self.finish(sink, Stop::Local).await,
                Err(e) => {
                    warn!(relay = %self.url, error = %e, "relay write failed");
                    return self.finish(sink, Stop::Remote(SocketState::Error)).await;
                }
            }
        }

        let stop = loop {
            if self.draining && !self.idle_waiters.is_empty() && self.is_idle() {
                debug!(relay = %self.url, "socket drained");
                for waiter in self.idle_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            // Abandoned acks do not wake the loop; poll while someone waits.
            let watch_idle = self.draining && !self.idle_waiters.is_empty();

            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.on_frame(&mut sink, text.as_str()).await {
                            warn!(relay = %self.url, error = %e, "relay write failed");
                            break Stop::Remote(SocketState::Error);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(relay = %self.url, ?frame, "relay closed the connection");
                        break Stop::Remote(SocketState::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(relay = %self.url, error = %e, "relay connection error");
                        break Stop::Remote(SocketState::Error);
                    }
                    None => break Stop::Remote(SocketState::Closed),
                },
                command = commands.recv() => match command {
                    Some(command) => match self.on_command(&mut sink, command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => break Stop::Local,
                        Err(e) => {
                            warn!(relay = %self.url, error = %e, "relay write failed");
                            break Stop::Remote(SocketState::Error);
                        }
                    },
                    None => break Stop::Local,
                },
                () = tokio::time::sleep(IDLE_POLL), if watch_idle => {}
            }
        };

        self.finish(sink, stop).await
    }

    async fn on_command(&mut self, sink: &mut WsSink, command: SocketCommand) -> Result<Flow, GatewayError> {
        match command {
            SocketCommand::Subscribe {
                registration,
                filter,
            } => {
                if self.draining {
                    debug!(relay = %self.url, subscription_id = %registration.id, "refusing subscription on draining socket");
                    return Ok(Flow::Continue);
                }
                send_frame(
                    sink,
                    ClientMessage::Req {
                        subscription_id: &registration.id,
                        filter: &filter,
                    },
                )
                .await?;
                trace!(relay = %self.url, subscription_id = %registration.id, "REQ sent");
                if let Some(previous) = self.subs.insert(registration.id.clone(), registration) {
                    previous.cancel();
                }
            }
            SocketCommand::Publish { event, ack } => {
                if self.draining {
                    debug!(relay = %self.url, event_id = %event.id, "refusing publish on draining socket");
                    return Ok(Flow::Continue);
                }
                self.pending.retain(|_, waiting| !waiting.is_closed());
                send_frame(sink, ClientMessage::Event(&event)).await?;
                self.pending.insert(event.id, ack);
            }
            SocketCommand::CloseSub { id, force } => match self.subs.remove(&id) {
                Some(registration) => {
                    registration.cancel();
                    send_frame(sink, ClientMessage::Close(&id)).await?;
                }
                None if force => send_frame(sink, ClientMessage::Close(&id)).await?,
                None => trace!(relay = %self.url, subscription_id = %id, "close for unknown subscription"),
            },
            SocketCommand::Drain { idle } => {
                self.draining = true;
                self.idle_waiters.push(idle);
            }
            SocketCommand::Close => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    async fn on_frame(&mut self, sink: &mut WsSink, text: &str) -> Result<(), GatewayError> {
        let message = match RelayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(relay = %self.url, error = %e, "ignoring relay frame");
                return Ok(());
            }
        };

        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                self.deliver(sink, &subscription_id, SubscriptionItem::Event(event))
                    .await?;
            }
            RelayMessage::Eose(subscription_id) => {
                let Some(keep_alive) = self.subs.get(&subscription_id).map(|r| r.keep_alive) else {
                    return Ok(());
                };
                if keep_alive {
                    self.deliver(sink, &subscription_id, SubscriptionItem::Eose)
                        .await?;
                } else if let Some(registration) = self.subs.remove(&subscription_id) {
                    let _ = registration.items.send(SubscriptionItem::Eose);
                    send_frame(sink, ClientMessage::Close(&subscription_id)).await?;
                }
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => match self.pending.remove(&event_id) {
                Some(waiting) => {
                    let _ = waiting.send(PublishAck {
                        event_id,
                        accepted,
                        message,
                    });
                }
                None => trace!(relay = %self.url, %event_id, "ack for unknown event"),
            },
            RelayMessage::Notice(notice) => {
                info!(relay = %self.url, %notice, "relay notice");
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                if let Some(registration) = self.subs.remove(&subscription_id) {
                    debug!(relay = %self.url, %subscription_id, reason = %message, "relay closed subscription");
                    let _ = registration.items.send(SubscriptionItem::Closed(message));
                }
            }
        }
        Ok(())
    }

    /// Hands an item to a subscription's consumer. Subscriptions whose
    /// consumer went away or that were cancelled are closed on the relay.
    async fn deliver(
        &mut self,
        sink: &mut WsSink,
        id: &SubscriptionId,
        item: SubscriptionItem,
    ) -> Result<(), GatewayError> {
        let Some(registration) = self.subs.get(id) else {
            trace!(relay = %self.url, subscription_id = %id, "frame for unknown subscription dropped");
            return Ok(());
        };
        let delivered = registration.is_live() && registration.items.send(item).is_ok();
        if !delivered {
            self.subs.remove(id);
            send_frame(sink, ClientMessage::Close(id)).await?;
        }
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.subs.is_empty() && self.pending.values().all(oneshot::Sender::is_closed)
    }

    async fn finish(mut self, mut sink: WsSink, stop: Stop) -> SocketState {
        match stop {
            Stop::Local => {
                for registration in self.subs.values() {
                    registration.cancel();
                }
                self.subs.clear();
                self.pending.clear();
                if let Err(e) = sink.close().await {
                    debug!(relay = %self.url, error = %e, "close handshake failed");
                }
                info!(relay = %self.url, "relay socket closed");
                SocketState::Closed
            }
            Stop::Remote(state) => {
                info!(relay = %self.url, ?state, "relay connection lost");
                state
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: ClientMessage<'_>) -> Result<(), GatewayError> {
    let text = frame.to_json()?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))
}
