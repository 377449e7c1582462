//! Per-relay result streams handed out by [`super::RelaySocket`].

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use super::socket::SocketCommand;
use crate::domain::{NostrEvent, RelayUrl, SubscriptionId};

/// One item of a subscription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
    /// An event matching the filter.
    Event(NostrEvent),
    /// The relay has sent every stored match. For non-keep-alive
    /// subscriptions this is the last item.
    Eose,
    /// The relay closed the subscription; this is the last item.
    Closed(String),
}

/// Lazy sequence of items for one subscription on one relay.
///
/// The stream ends when the relay finishes (end-of-stored-events without
/// keep-alive, or `CLOSED`), when the subscription is closed locally, or
/// when the socket goes away. Once [`close`](Self::close) has been called
/// no further item is yielded, even one already buffered.
#[derive(Debug)]
pub struct SubscriptionStream {
    relay_url: RelayUrl,
    subscription_id: SubscriptionId,
    keep_alive: bool,
    live: Arc<AtomicBool>,
    items: mpsc::UnboundedReceiver<SubscriptionItem>,
    socket: mpsc::WeakUnboundedSender<SocketCommand>,
}

impl SubscriptionStream {
    pub(crate) fn new(
        relay_url: RelayUrl,
        subscription_id: SubscriptionId,
        keep_alive: bool,
        live: Arc<AtomicBool>,
        items: mpsc::UnboundedReceiver<SubscriptionItem>,
        socket: mpsc::WeakUnboundedSender<SocketCommand>,
    ) -> Self {
        Self {
            relay_url,
            subscription_id,
            keep_alive,
            live,
            items,
            socket,
        }
    }

    /// Relay this stream reads from.
    #[must_use]
    pub fn relay_url(&self) -> &RelayUrl {
        &self.relay_url
    }

    /// Subscription id.
    #[must_use]
    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    /// Whether the subscription survives end-of-stored-events.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns `false` once the subscription was closed locally.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Closes the subscription on the relay and stops delivery.
    pub fn close(&mut self) {
        self.live.store(false, Ordering::Release);
        if let Some(socket) = self.socket.upgrade() {
            let _ = socket.send(SocketCommand::CloseSub {
                id: self.subscription_id.clone(),
                force: false,
            });
        }
        self.items.close();
    }
}

impl Stream for SubscriptionStream {
    type Item = SubscriptionItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.is_live() {
            return Poll::Ready(None);
        }
        match self.items.poll_recv(cx) {
            Poll::Ready(Some(item)) if self.is_live() => Poll::Ready(Some(item)),
            Poll::Ready(_) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A relay's answer to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    /// Acknowledged event id.
    pub event_id: String,
    /// Whether the relay accepted the event.
    pub accepted: bool,
    /// Relay-supplied reason.
    pub message: String,
}

/// Single-shot acknowledgement of one publish on one relay.
///
/// Resolves to `None` if the socket closes before the relay answers; a
/// relay that never answers leaves the stream pending, so callers bound it
/// with a deadline.
#[derive(Debug)]
pub struct AckStream {
    relay_url: RelayUrl,
    event_id: String,
    ack: oneshot::Receiver<PublishAck>,
}

impl AckStream {
    pub(crate) fn new(relay_url: RelayUrl, event_id: String, ack: oneshot::Receiver<PublishAck>) -> Self {
        Self {
            relay_url,
            event_id,
            ack,
        }
    }

    /// Relay the event was sent to.
    #[must_use]
    pub fn relay_url(&self) -> &RelayUrl {
        &self.relay_url
    }

    /// Id of the published event.
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Waits for the relay's acknowledgement.
    pub async fn recv(self) -> Option<PublishAck> {
        self.ack.await.ok()
    }
}
