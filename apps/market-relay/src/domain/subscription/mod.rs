//! Subscription Index
//!
//! Domain types for tracking which downstream clients are subscribed to
//! which symbols.
//!
//! # Design
//!
//! The index keeps two maps that always mirror each other:
//! - symbol → set of subscribed clients
//! - client → set of subscribed symbols
//!
//! Every mutation reports how the symbol's subscriber count moved so the
//! caller can derive upstream subscribe/unsubscribe calls purely from
//! reference counts: a symbol needs an upstream subscription exactly when
//! its subscriber set is non-empty.
//!
//! The index itself is not synchronised; the registry service wraps it in
//! a single lock together with the resulting upstream call.

use std::collections::{HashMap, HashSet};

pub use crate::domain::streaming::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a downstream client connection.
pub type ClientId = u64;

/// How a mutation changed a symbol's subscriber set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// Nothing changed (already subscribed / was not subscribed).
    Unchanged,
    /// Client added; the symbol already had other subscribers.
    Added,
    /// Client added as the symbol's first subscriber (refcount 0→1).
    FirstAdded,
    /// Client removed; other subscribers remain.
    Removed,
    /// Client removed as the symbol's last subscriber (refcount 1→0).
    LastRemoved,
}

impl SubscriptionChange {
    /// Whether the client's subscription set changed.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Whether the symbol must now be subscribed upstream.
    #[must_use]
    pub const fn needs_upstream_subscribe(self) -> bool {
        matches!(self, Self::FirstAdded)
    }

    /// Whether the symbol must now be unsubscribed upstream.
    #[must_use]
    pub const fn needs_upstream_unsubscribe(self) -> bool {
        matches!(self, Self::LastRemoved)
    }
}

/// Point-in-time subscription statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of symbols with at least one subscriber.
    pub symbol_count: usize,
    /// Number of registered clients.
    pub client_count: usize,
    /// Total number of `(client, symbol)` pairs.
    pub subscription_count: usize,
}

// =============================================================================
// Subscription Index
// =============================================================================

/// Bidirectional client↔symbol index.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    /// Map from symbol to subscribed clients. Never holds an empty set.
    symbol_clients: HashMap<Symbol, HashSet<ClientId>>,
    /// Map from client to subscribed symbols. Empty sets are kept for
    /// registered clients until they are removed.
    client_symbols: HashMap<ClientId, HashSet<Symbol>>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client with an empty subscription set.
    pub fn register_client(&mut self, client: ClientId) {
        self.client_symbols.entry(client).or_default();
    }

    /// Subscribe `client` to `symbol`.
    pub fn add(&mut self, client: ClientId, symbol: &str) -> SubscriptionChange {
        let client_set = self.client_symbols.entry(client).or_default();
        if !client_set.insert(symbol.to_string()) {
            return SubscriptionChange::Unchanged;
        }

        let subscribers = self.symbol_clients.entry(symbol.to_string()).or_default();
        subscribers.insert(client);

        if subscribers.len() == 1 {
            SubscriptionChange::FirstAdded
        } else {
            SubscriptionChange::Added
        }
    }

    /// Unsubscribe `client` from `symbol`.
    pub fn remove(&mut self, client: ClientId, symbol: &str) -> SubscriptionChange {
        let Some(client_set) = self.client_symbols.get_mut(&client) else {
            return SubscriptionChange::Unchanged;
        };
        if !client_set.remove(symbol) {
            return SubscriptionChange::Unchanged;
        }

        let Some(subscribers) = self.symbol_clients.get_mut(symbol) else {
            return SubscriptionChange::Unchanged;
        };
        subscribers.remove(&client);

        if subscribers.is_empty() {
            self.symbol_clients.remove(symbol);
            SubscriptionChange::LastRemoved
        } else {
            SubscriptionChange::Removed
        }
    }

    /// Remove a client and all its subscriptions.
    ///
    /// Returns each symbol the client held with the resulting change,
    /// sorted by symbol.
    pub fn remove_client(&mut self, client: ClientId) -> Vec<(Symbol, SubscriptionChange)> {
        let mut symbols = self.client_symbols(client);
        symbols.sort();

        let changes = symbols
            .into_iter()
            .map(|symbol| {
                let change = self.remove(client, &symbol);
                (symbol, change)
            })
            .collect();

        self.client_symbols.remove(&client);
        changes
    }

    /// Clients subscribed to `symbol`.
    #[must_use]
    pub fn subscribers(&self, symbol: &str) -> HashSet<ClientId> {
        self.symbol_clients.get(symbol).cloned().unwrap_or_default()
    }

    /// Symbols `client` is subscribed to.
    #[must_use]
    pub fn client_symbols(&self, client: ClientId) -> Vec<Symbol> {
        self.client_symbols
            .get(&client)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `client` is subscribed to `symbol`.
    #[must_use]
    pub fn is_subscribed(&self, client: ClientId, symbol: &str) -> bool {
        self.client_symbols
            .get(&client)
            .is_some_and(|s| s.contains(symbol))
    }

    /// Whether `client` is registered.
    #[must_use]
    pub fn has_client(&self, client: ClientId) -> bool {
        self.client_symbols.contains_key(&client)
    }

    /// Symbols with at least one subscriber.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.symbol_clients.keys().cloned().collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            symbol_count: self.symbol_clients.len(),
            client_count: self.client_symbols.len(),
            subscription_count: self.client_symbols.values().map(HashSet::len).sum(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
