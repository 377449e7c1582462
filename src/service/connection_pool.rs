//! The connection pool: one socket per configured relay, shared by every
//! client.
//!
//! [`ConnectionPool`] is an actor. Its state (sockets, configured relays,
//! status map, subscription ownership) is owned by the task running
//! [`ConnectionPool::run`]; everything else reaches it through the
//! [`EventBus`] command queue. Socket transitions are consumed before
//! commands so a command always sees the latest status.
//!
//! The fan-out operations ([`ConnectionPool::sub_filter`],
//! [`ConnectionPool::pub_event`]) target the relays the status map marks
//! connected. When run as an actor the pool spawns one forwarder per
//! returned stream, which turns relay traffic into [`PoolEvent`]s.
//!
//! On the relay wire a subscription id is scoped by its owner (see
//! [`SubscriptionId::scoped`]); clients only ever see their own id.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use super::forward::{SubscriptionEnded, forward_ack, forward_subscription};
use crate::domain::{
    ClientId, ConnectStatus, EventBus, NostrEvent, PoolCommand, PoolEvent, PoolOp, PortSubscriptionIndex, RelaySwitch,
    RelayUrl, StatusSnapshot, SubscribeRequest, SubscriptionId,
};
use crate::relay::{AckStream, RelaySocket, SocketSignal, SubscriptionStream};

/// Timing knobs of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on a relay handshake.
    pub connect_timeout: Duration,
    /// How long a relay may take to acknowledge a published event.
    /// `None` waits forever.
    pub publish_timeout: Option<Duration>,
    /// How long a relay may take to signal end-of-stored-events on a
    /// subscription that is not kept alive. `None` waits forever.
    pub subscription_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Some(Duration::from_secs(30)),
            subscription_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Receiving ends of the channels the pool's own tasks report on.
#[derive(Debug)]
pub struct PoolInbox {
    signals: mpsc::UnboundedReceiver<SocketSignal>,
    ended: mpsc::UnboundedReceiver<SubscriptionEnded>,
    drained: mpsc::UnboundedReceiver<Vec<u64>>,
}

/// Owner of every relay socket.
#[derive(Debug)]
pub struct ConnectionPool {
    settings: PoolSettings,
    bus: EventBus,
    sockets: HashMap<RelayUrl, RelaySocket>,
    relays: Vec<RelayUrl>,
    relay_set_id: Option<String>,
    status: ConnectStatus,
    index: PortSubscriptionIndex,
    signals: mpsc::UnboundedSender<SocketSignal>,
    ended: mpsc::UnboundedSender<SubscriptionEnded>,
    drained: mpsc::UnboundedSender<Vec<u64>>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl ConnectionPool {
    /// Creates an empty pool publishing results on `bus`.
    #[must_use]
    pub fn new(bus: EventBus, settings: PoolSettings) -> (Self, PoolInbox) {
        let (signals, signals_rx) = mpsc::unbounded_channel();
        let (ended, ended_rx) = mpsc::unbounded_channel();
        let (drained, drained_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let pool = Self {
            settings,
            bus,
            sockets: HashMap::new(),
            relays: Vec::new(),
            relay_set_id: None,
            status: ConnectStatus::new(),
            index: PortSubscriptionIndex::new(),
            signals,
            ended,
            drained,
            status_tx,
        };
        let inbox = PoolInbox {
            signals: signals_rx,
            ended: ended_rx,
            drained: drained_rx,
        };
        (pool, inbox)
    }

    /// Returns a receiver that always holds the latest status snapshot.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Returns the socket for `url`, if one was created.
    #[must_use]
    pub fn socket(&self, url: &RelayUrl) -> Option<&RelaySocket> {
        self.sockets.get(url)
    }

    /// Returns the per-client subscription ownership index.
    #[must_use]
    pub fn index(&self) -> &PortSubscriptionIndex {
        &self.index
    }

    /// Configures and connects relays.
    ///
    /// Idempotent per URL: a relay that is already configured keeps its
    /// socket, unless that socket has closed or failed, in which case a
    /// fresh one is connected. Returns the number of sockets created.
    pub fn add_relays(&mut self, urls: impl IntoIterator<Item = RelayUrl>) -> usize {
        let mut created = 0;
        for url in urls {
            if self.status.register(url.clone()) {
                self.relays.push(url.clone());
            } else if self
                .sockets
                .get(&url)
                .is_some_and(|socket| !socket.state().is_terminal())
            {
                trace!(relay = %url, "relay already configured");
                continue;
            }
            self.connect(url);
            created += 1;
        }
        if created > 0 {
            self.broadcast_status();
        }
        created
    }

    /// Replaces the configured relays.
    ///
    /// Relays missing from `switch` are closed and forgotten, relays in both
    /// configurations are left untouched, and new relays are connected.
    pub fn switch_relays(&mut self, switch: RelaySwitch) {
        let RelaySwitch { id, relays } = switch;
        let mut target: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        for url in relays {
            if !target.contains(&url) {
                target.push(url);
            }
        }

        for url in self.relays.iter().filter(|url| !target.contains(url)) {
            if let Some(socket) = self.sockets.remove(url) {
                socket.close();
            }
            self.status.remove(url);
            self.index.forget_relay(url);
            debug!(relay = %url, "relay dropped from configuration");
        }

        for url in &target {
            if self.status.register(url.clone()) {
                self.connect(url.clone());
            }
        }

        info!(relay_set = id.as_deref().unwrap_or("-"), relays = target.len(), "relay set switched");
        self.relays = target;
        self.relay_set_id = id;
        self.broadcast_status();
    }

    /// Opens `request` on every connected relay, one stream per relay.
    ///
    /// Keep-alive subscriptions are recorded as owned by `client_id`. The
    /// streams carry the owner-scoped wire id.
    pub fn sub_filter(&mut self, client_id: ClientId, request: &SubscribeRequest) -> Vec<SubscriptionStream> {
        let wire_id = request.subscription_id.scoped(client_id);
        let streams: Vec<SubscriptionStream> = self
            .connected_sockets()
            .map(|socket| socket.subscribe(request.filter.clone(), request.keep_alive, wire_id.clone()))
            .collect();

        if request.keep_alive {
            self.index.record(
                client_id,
                request.subscription_id.clone(),
                streams.iter().map(|stream| stream.relay_url().clone()),
            );
        }
        streams
    }

    /// Closes `subscription_id` on every connected relay and drops it from
    /// the client's ownership.
    pub fn unsubscribe(&mut self, client_id: ClientId, subscription_id: &SubscriptionId) {
        let wire_id = subscription_id.scoped(client_id);
        for socket in self.connected_sockets() {
            socket.close_sub(&wire_id, false);
        }
        self.index.remove_subscription(client_id, subscription_id);
    }

    /// Sends `event` to every connected relay, one acknowledgement stream
    /// per relay.
    #[must_use]
    pub fn pub_event(&self, event: &NostrEvent) -> Vec<AckStream> {
        self.connected_sockets()
            .map(|socket| socket.publish(event.clone()))
            .collect()
    }

    /// Closes every subscription `client_id` owns on every connected relay
    /// and forgets the client. Calling it again is a no-op.
    pub fn close_client(&mut self, client_id: ClientId) {
        let owned = self.index.subscriptions(client_id);
        for subscription_id in &owned {
            let wire_id = subscription_id.scoped(client_id);
            for socket in self.connected_sockets() {
                socket.close_sub(&wire_id, true);
            }
        }
        if self.index.remove_client(client_id) {
            debug!(%client_id, subscriptions = owned.len(), "client subscriptions closed");
        }
    }

    /// Stops every socket from taking new work and closes them all once
    /// every one of them has nothing in flight.
    ///
    /// The close happens when the actor receives the drain report; sockets
    /// connected after this call are left alone.
    pub fn disconnect(&self) {
        let ids: Vec<u64> = self.sockets.values().map(RelaySocket::id).collect();
        let waits: Vec<_> = self.sockets.values().map(RelaySocket::drain).collect();
        info!(sockets = ids.len(), "disconnect requested");

        let drained = self.drained.clone();
        tokio::spawn(async move {
            join_all(waits).await;
            let _ = drained.send(ids);
        });
    }

    /// Closes the sockets listed in a drain report.
    pub fn close_drained(&mut self, socket_ids: &[u64]) {
        let mut closed = 0;
        for socket in self.sockets.values().filter(|socket| socket_ids.contains(&socket.id())) {
            socket.close();
            closed += 1;
        }
        debug!(closed, "idle sockets closed");
    }

    /// Returns the configured relays and their status.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            id: self.relay_set_id.clone(),
            relays: self.relays.clone(),
            status: self.status.clone(),
        }
    }

    /// Records a relay transition and broadcasts the new snapshot.
    ///
    /// Transitions of relays that are no longer configured are ignored.
    pub fn apply_status(&mut self, url: &RelayUrl, connected: bool) {
        if !self.status.contains(url) {
            trace!(relay = %url, "status for unconfigured relay ignored");
            return;
        }
        self.status.set(url, connected);
        self.broadcast_status();
    }

    /// Applies a socket signal unless it comes from a socket that has since
    /// been replaced or dropped.
    pub fn handle_signal(&mut self, signal: SocketSignal) {
        let current = self.sockets.get(&signal.relay_url).map(RelaySocket::id);
        if current != Some(signal.socket_id) {
            trace!(relay = %signal.relay_url, socket_id = signal.socket_id, "stale socket signal ignored");
            return;
        }
        debug!(relay = %signal.relay_url, state = ?signal.state, "relay state changed");
        self.apply_status(&signal.relay_url, signal.state.is_open());
    }

    /// Executes one client command, spawning forwarders for the streams it
    /// opens.
    pub fn handle_command(&mut self, command: PoolCommand) {
        let PoolCommand { client_id, op } = command;
        match op {
            PoolOp::AddRelays(urls) => {
                self.add_relays(urls);
            }
            PoolOp::SwitchRelays(switch) => self.switch_relays(switch),
            PoolOp::PullStatus => self.broadcast_status(),
            PoolOp::Subscribe(request) => {
                let streams = self.sub_filter(client_id, &request);
                if streams.is_empty() {
                    debug!(%client_id, subscription_id = %request.subscription_id, "no connected relay to subscribe on");
                }
                for stream in streams {
                    tokio::spawn(forward_subscription(
                        stream,
                        request.subscription_id.clone(),
                        client_id,
                        self.bus.clone(),
                        self.settings.subscription_timeout,
                        self.ended.clone(),
                    ));
                }
            }
            PoolOp::Unsubscribe(subscription_id) => self.unsubscribe(client_id, &subscription_id),
            PoolOp::Publish(event) => {
                let acks = self.pub_event(&event);
                if acks.is_empty() {
                    debug!(%client_id, event_id = %event.id, "no connected relay to publish to");
                }
                for ack in acks {
                    tokio::spawn(forward_ack(ack, client_id, self.bus.clone(), self.settings.publish_timeout));
                }
            }
            PoolOp::Disconnect => self.disconnect(),
            PoolOp::CloseClient => self.close_client(client_id),
        }
    }

    /// Runs the actor until the command queue closes, then closes every
    /// socket.
    pub async fn run(mut self, mut inbox: PoolInbox, mut commands: mpsc::Receiver<PoolCommand>) {
        info!(relays = self.relays.len(), "connection pool started");
        loop {
            tokio::select! {
                biased;
                Some(signal) = inbox.signals.recv() => self.handle_signal(signal),
                Some(ended) = inbox.ended.recv() => {
                    self.index.release(ended.client_id, &ended.subscription_id, &ended.relay_url);
                }
                Some(socket_ids) = inbox.drained.recv() => self.close_drained(&socket_ids),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    /// Closes every socket.
    pub fn shutdown(&mut self) {
        for (url, socket) in self.sockets.drain() {
            trace!(relay = %url, "closing socket");
            socket.close();
        }
        info!("connection pool stopped");
    }

    fn connect(&mut self, url: RelayUrl) {
        debug!(relay = %url, "connecting relay");
        let socket = RelaySocket::connect(url.clone(), self.signals.clone(), self.settings.connect_timeout);
        if let Some(previous) = self.sockets.insert(url, socket) {
            previous.close();
        }
    }

    fn connected_sockets(&self) -> impl Iterator<Item = &RelaySocket> {
        self.sockets
            .iter()
            .filter(|(url, _)| self.status.is_connected(url))
            .map(|(_, socket)| socket)
    }

    fn broadcast_status(&self) {
        let snapshot = self.status_snapshot();
        self.status_tx.send_replace(snapshot.clone());
        let receivers = self.bus.publish(PoolEvent::StatusChanged(snapshot));
        if receivers == 0 {
            trace!("status broadcast without receivers");
        }
    }
}
