//! Per-client subscription ownership.
//!
//! [`PortSubscriptionIndex`] remembers which keep-alive subscriptions each
//! client owns, and on which relays each of them is open, so that everything
//! a client left behind can be closed when it detaches.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{ClientId, RelayUrl, SubscriptionId};

/// Maps each client to the live subscriptions it owns.
#[derive(Debug, Default)]
pub struct PortSubscriptionIndex {
    by_client: HashMap<ClientId, HashMap<SubscriptionId, HashSet<RelayUrl>>>,
}

impl PortSubscriptionIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `client_id` owns `subscription_id` on `relays`.
    ///
    /// Recording with no relays is a no-op: a subscription that reached no
    /// relay has nothing to tear down.
    pub fn record(
        &mut self,
        client_id: ClientId,
        subscription_id: SubscriptionId,
        relays: impl IntoIterator<Item = RelayUrl>,
    ) {
        let relays: HashSet<RelayUrl> = relays.into_iter().collect();
        if relays.is_empty() {
            return;
        }
        self.by_client
            .entry(client_id)
            .or_default()
            .entry(subscription_id)
            .or_default()
            .extend(relays);
    }

    /// Notes that `relay_url` no longer carries `subscription_id`.
    ///
    /// The subscription is forgotten once no relay carries it, and the
    /// client once it owns nothing. Returns `true` if the subscription was
    /// forgotten.
    pub fn release(
        &mut self,
        client_id: ClientId,
        subscription_id: &SubscriptionId,
        relay_url: &RelayUrl,
    ) -> bool {
        let Some(subs) = self.by_client.get_mut(&client_id) else {
            return false;
        };
        let Some(relays) = subs.get_mut(subscription_id) else {
            return false;
        };
        relays.remove(relay_url);
        let forgotten = relays.is_empty();
        if forgotten {
            subs.remove(subscription_id);
        }
        if subs.is_empty() {
            self.by_client.remove(&client_id);
        }
        forgotten
    }

    /// Forgets one subscription of `client_id`.
    pub fn remove_subscription(
        &mut self,
        client_id: ClientId,
        subscription_id: &SubscriptionId,
    ) -> bool {
        let Some(subs) = self.by_client.get_mut(&client_id) else {
            return false;
        };
        let removed = subs.remove(subscription_id).is_some();
        if subs.is_empty() {
            self.by_client.remove(&client_id);
        }
        removed
    }

    /// Forgets `relay_url` everywhere, e.g. after it was dropped from the
    /// configuration.
    pub fn forget_relay(&mut self, relay_url: &RelayUrl) {
        for subs in self.by_client.values_mut() {
            for relays in subs.values_mut() {
                relays.remove(relay_url);
            }
            subs.retain(|_, relays| !relays.is_empty());
        }
        self.by_client.retain(|_, subs| !subs.is_empty());
    }

    /// Returns the subscriptions owned by `client_id`, sorted.
    #[must_use]
    pub fn subscriptions(&self, client_id: ClientId) -> Vec<SubscriptionId> {
        self.by_client
            .get(&client_id)
            .map(|subs| subs.keys().cloned().collect::<BTreeSet<_>>())
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Returns the relays on which `client_id` holds `subscription_id`.
    #[must_use]
    pub fn relays_of(&self, client_id: ClientId, subscription_id: &SubscriptionId) -> Vec<RelayUrl> {
        let mut relays: Vec<RelayUrl> = self
            .by_client
            .get(&client_id)
            .and_then(|subs| subs.get(subscription_id))
            .map(|relays| relays.iter().cloned().collect())
            .unwrap_or_default();
        relays.sort();
        relays
    }

    /// Drops the entry for `client_id`. Returns `true` if one existed.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        self.by_client.remove(&client_id).is_some()
    }

    /// Returns `true` if `client_id` owns any live subscription.
    #[must_use]
    pub fn contains_client(&self, client_id: ClientId) -> bool {
        self.by_client.contains_key(&client_id)
    }

    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }
}
