//! Forwarders: per-relay tasks that turn socket streams into bus results.
//!
//! The pool spawns one forwarder per stream it hands out. Forwarders own the
//! deadlines: a stream that misses its deadline is closed and the owning
//! client receives a `TIMEOUT` result instead.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace};

use crate::domain::{ClientId, EventBus, PoolEvent, PublishResult, RelayUrl, SubscriptionId, TimedOperation};
use crate::relay::{AckStream, SubscriptionItem, SubscriptionStream};

/// A keep-alive subscription ended on one relay without being closed
/// locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubscriptionEnded {
    pub client_id: ClientId,
    pub subscription_id: SubscriptionId,
    pub relay_url: RelayUrl,
}

/// Forwards one subscription stream to its owner.
///
/// Results carry `subscription_id`, the id the client chose, rather than
/// the stream's owner-scoped wire id. `eose_deadline` bounds the wait for
/// end-of-stored-events on subscriptions that are not kept alive. Keep-alive streams that end on
/// their own are reported on `ended` so ownership can be released.
pub(crate) async fn forward_subscription(
    mut stream: SubscriptionStream,
    subscription_id: SubscriptionId,
    client_id: ClientId,
    bus: EventBus,
    eose_deadline: Option<Duration>,
    ended: mpsc::UnboundedSender<SubscriptionEnded>,
) {
    let relay_url = stream.relay_url().clone();
    let keep_alive = stream.keep_alive();
    let deadline = eose_deadline
        .filter(|_| !keep_alive)
        .map(|after| Instant::now() + after);

    loop {
        let item = match deadline {
            Some(at) => {
                tokio::select! {
                    item = stream.next() => item,
                    () = sleep_until(at) => {
                        debug!(relay = %relay_url, %subscription_id, %client_id, "subscription missed its deadline");
                        stream.close();
                        bus.publish(PoolEvent::Timeout {
                            client_id,
                            relay_url: relay_url.clone(),
                            operation: TimedOperation::Subscribe,
                            id: subscription_id.to_string(),
                        });
                        return;
                    }
                }
            }
            None => stream.next().await,
        };

        match item {
            Some(SubscriptionItem::Event(event)) => {
                bus.publish(PoolEvent::Event {
                    client_id,
                    subscription_id: subscription_id.clone(),
                    relay_url: relay_url.clone(),
                    event,
                });
            }
            Some(SubscriptionItem::Eose) => {
                bus.publish(PoolEvent::Eose {
                    client_id,
                    subscription_id: subscription_id.clone(),
                    relay_url: relay_url.clone(),
                });
            }
            Some(SubscriptionItem::Closed(reason)) => {
                debug!(
                    relay = %relay_url,
                    wire_id = %stream.subscription_id(),
                    %reason,
                    "subscription closed by relay"
                );
                break;
            }
            None => break,
        }
    }

    if keep_alive && stream.is_live() {
        let _ = ended.send(SubscriptionEnded {
            client_id,
            subscription_id,
            relay_url,
        });
    }
}

/// Forwards one publish acknowledgement to the publishing client.
///
/// A relay that does not answer within `deadline` yields a `TIMEOUT`
/// result; no publish result is made up for it.
pub(crate) async fn forward_ack(ack: AckStream, client_id: ClientId, bus: EventBus, deadline: Option<Duration>) {
    let relay_url = ack.relay_url().clone();
    let event_id = ack.event_id().to_string();

    let outcome = match deadline {
        Some(after) => timeout(after, ack.recv()).await.ok(),
        None => Some(ack.recv().await),
    };

    match outcome {
        Some(Some(ack)) => {
            bus.publish(PoolEvent::PublishResult {
                client_id,
                result: PublishResult {
                    relay_url,
                    event_id: ack.event_id,
                    success: ack.accepted,
                    reason: ack.message,
                },
            });
        }
        Some(None) => {
            trace!(relay = %relay_url, %event_id, "socket closed before acknowledging");
        }
        None => {
            debug!(relay = %relay_url, %event_id, %client_id, "publish missed its deadline");
            bus.publish(PoolEvent::Timeout {
                client_id,
                relay_url,
                operation: TimedOperation::Publish,
                id: event_id,
            });
        }
    }
}
