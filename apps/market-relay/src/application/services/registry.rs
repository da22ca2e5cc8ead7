//! Subscription Registry
//!
//! Owns the client↔symbol index and keeps the upstream subscription set in
//! lockstep with it: a symbol is subscribed upstream exactly when at least
//! one client holds it.
//!
//! Index mutation and the resulting upstream call happen under one mutex,
//! so concurrent add/remove/disconnect sequences cannot interleave between
//! the refcount change and the upstream call. [`UpstreamPort`] subscribe
//! calls are non-blocking, which keeps the critical section short.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::UpstreamPort;
use crate::domain::subscription::{
    ClientId, SubscriptionChange, SubscriptionIndex, SubscriptionStats, Symbol,
};

/// Thread-safe subscription registry bound to one upstream session.
pub struct SubscriptionRegistry {
    index: Mutex<SubscriptionIndex>,
    upstream: Arc<dyn UpstreamPort>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Create a registry driving `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamPort>) -> Self {
        Self {
            index: Mutex::new(SubscriptionIndex::new()),
            upstream,
        }
    }

    /// Register a client with no subscriptions.
    pub fn register_client(&self, client: ClientId) {
        self.index.lock().register_client(client);
    }

    /// Subscribe `client` to `symbol`, subscribing upstream on the first
    /// subscriber.
    pub fn add_subscription(&self, client: ClientId, symbol: &str) -> SubscriptionChange {
        let mut index = self.index.lock();
        let change = index.add(client, symbol);
        if change.needs_upstream_subscribe() {
            tracing::debug!(symbol, client, "first subscriber, subscribing upstream");
            self.upstream.subscribe_upstream(symbol);
        }
        change
    }

    /// Unsubscribe `client` from `symbol`, unsubscribing upstream when the
    /// last subscriber leaves.
    pub fn remove_subscription(&self, client: ClientId, symbol: &str) -> SubscriptionChange {
        let mut index = self.index.lock();
        let change = index.remove(client, symbol);
        if change.needs_upstream_unsubscribe() {
            tracing::debug!(symbol, client, "last subscriber gone, unsubscribing upstream");
            self.upstream.unsubscribe_upstream(symbol);
        }
        change
    }

    /// Remove a client and release every subscription it held.
    ///
    /// Returns the symbols that were unsubscribed upstream as a result.
    pub fn remove_client(&self, client: ClientId) -> Vec<Symbol> {
        let mut index = self.index.lock();
        let released: Vec<Symbol> = index
            .remove_client(client)
            .into_iter()
            .filter(|(_, change)| change.needs_upstream_unsubscribe())
            .map(|(symbol, _)| symbol)
            .collect();

        for symbol in &released {
            self.upstream.unsubscribe_upstream(symbol);
        }

        if !released.is_empty() {
            tracing::debug!(
                client,
                symbols = ?released,
                "client removed, released upstream symbols"
            );
        }
        released
    }

    /// Clients subscribed to `symbol`.
    #[must_use]
    pub fn subscribers(&self, symbol: &str) -> HashSet<ClientId> {
        self.index.lock().subscribers(symbol)
    }

    /// Symbols `client` holds.
    #[must_use]
    pub fn client_symbols(&self, client: ClientId) -> Vec<Symbol> {
        self.index.lock().client_symbols(client)
    }

    /// Whether `client` holds `symbol`.
    #[must_use]
    pub fn is_subscribed(&self, client: ClientId, symbol: &str) -> bool {
        self.index.lock().is_subscribed(client, symbol)
    }

    /// Symbols with at least one subscriber.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.index.lock().active_symbols()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.index.lock().stats()
    }
}

// =============================================================================
// Tests
// =============================================================================
