//! Gateway Service
//!
//! Protocol handling and fan-out, independent of the socket layer. The
//! WebSocket server calls into this for every client frame and lifecycle
//! change; the dispatcher task feeds it upstream [`SessionEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::{
    ClientFrame, ProtocolError, ResumedFrame, ServerFrame, StaleFrame, SubscribeResult,
    SubscribeStatus,
};
use crate::application::ports::UpstreamPort;
use crate::application::services::SubscriptionRegistry;
use crate::domain::streaming::{SessionEvent, Symbol, normalize_symbol};
use crate::domain::subscription::{ClientId, SubscriptionStats};
use crate::infrastructure::broadcast::{ClientReceiver, SharedClientHub};

/// Gateway statistics for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    /// Connected clients.
    pub clients: usize,
    /// Registry counts.
    pub subscriptions: SubscriptionStats,
    /// Frames dropped on full client queues.
    pub frames_dropped: u64,
}

/// Downstream gateway.
pub struct Gateway {
    upstream: Arc<dyn UpstreamPort>,
    registry: SubscriptionRegistry,
    hub: SharedClientHub,
    next_client_id: AtomicU64,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway over `upstream`, delivering through `hub`.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamPort>, hub: SharedClientHub) -> Self {
        Self {
            registry: SubscriptionRegistry::new(Arc::clone(&upstream)),
            upstream,
            hub,
            next_client_id: AtomicU64::new(0),
        }
    }

    /// The subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            clients: self.hub.client_count(),
            subscriptions: self.registry.stats(),
            frames_dropped: self.hub.stats().frames_dropped,
        }
    }

    // =========================================================================
    // Client Lifecycle
    // =========================================================================

    /// Register a new client and greet it with the current status.
    pub fn connect_client(&self) -> (ClientId, ClientReceiver) {
        let client = self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1;
        let outbound = self.hub.register(client);
        self.registry.register_client(client);
        tracing::info!(client, "client connected");

        self.send_status(client);
        (client, outbound)
    }

    /// Forget a client and release everything it held.
    pub fn disconnect_client(&self, client: ClientId) {
        self.hub.remove(client);
        let released = self.registry.remove_client(client);
        tracing::info!(
            client,
            released = released.len(),
            "client disconnected"
        );
    }

    /// Handle one text frame from `client`.
    pub fn handle_text(self: &Arc<Self>, client: ClientId, text: &str) {
        match ClientFrame::parse(text) {
            Ok(ClientFrame::Connect) => self.send_status(client),
            Ok(ClientFrame::Subscribe { symbols }) => self.subscribe(client, &symbols),
            Ok(ClientFrame::Unsubscribe { symbols }) => self.unsubscribe(client, &symbols),
            Err(e) => self.reject(client, &e),
        }
    }

    /// Answer a binary frame from `client`.
    pub fn handle_binary(&self, client: ClientId) {
        self.reject(client, &ProtocolError::BinaryFrame);
    }

    fn reject(&self, client: ClientId, error: &ProtocolError) {
        tracing::debug!(client, error = %error, "rejecting client frame");
        self.hub
            .send_to(client, Arc::new(ServerFrame::error(error.to_string())));
    }

    fn send_status(&self, client: ClientId) {
        let frame = ServerFrame::status(
            &self.upstream.current_status(),
            self.upstream.available_symbols(),
        );
        self.hub.send_to(client, Arc::new(frame));
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    fn subscribe(self: &Arc<Self>, client: ClientId, symbols: &[String]) {
        let mut results = Vec::with_capacity(symbols.len());
        let mut new_symbols: Vec<Symbol> = Vec::new();

        for raw in symbols {
            let symbol = normalize_symbol(raw);
            if symbol.is_empty() || !self.upstream.is_available(&symbol) {
                tracing::debug!(client, %symbol, "rejecting unknown symbol");
                results.push(SubscribeResult::error(
                    if symbol.is_empty() { raw.clone() } else { symbol },
                    "unknown symbol",
                ));
                continue;
            }

            if self.registry.add_subscription(client, &symbol).is_changed() {
                new_symbols.push(symbol.clone());
            }
            results.push(SubscribeResult::ok(symbol, SubscribeStatus::Subscribed));
        }

        self.hub.send_to(
            client,
            Arc::new(ServerFrame::subscribe_response(results)),
        );

        for symbol in new_symbols {
            self.spawn_snapshot(client, symbol);
        }
    }

    fn unsubscribe(&self, client: ClientId, symbols: &[String]) {
        let results = symbols
            .iter()
            .map(|raw| {
                let symbol = normalize_symbol(raw);
                if !self.registry.remove_subscription(client, &symbol).is_changed() {
                    tracing::debug!(client, %symbol, "unsubscribe for symbol not held");
                }
                SubscribeResult::ok(symbol, SubscribeStatus::Unsubscribed)
            })
            .collect();

        self.hub.send_to(
            client,
            Arc::new(ServerFrame::subscribe_response(results)),
        );
    }

    /// Fetch and deliver the one-time snapshot for a new subscription.
    fn spawn_snapshot(self: &Arc<Self>, client: ClientId, symbol: Symbol) {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let result = gateway.upstream.request_snapshot(&symbol).await;

            if !gateway.registry.is_subscribed(client, &symbol) {
                tracing::debug!(client, %symbol, "dropping snapshot for departed subscriber");
                return;
            }

            let frame = match result {
                Ok(snapshot) => ServerFrame::snapshot(&snapshot),
                Err(e) => {
                    tracing::warn!(client, %symbol, error = %e, "snapshot failed");
                    ServerFrame::error(format!("snapshot for {symbol} failed: {e}"))
                }
            };
            gateway.hub.send_to(client, Arc::new(frame));
        });
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Deliver one upstream event to the clients it concerns.
    pub fn dispatch(&self, event: &SessionEvent) {
        if let SessionEvent::Status(update) = event {
            let frame = ServerFrame::status(update, self.upstream.available_symbols());
            self.hub.broadcast(&Arc::new(frame));
            return;
        }

        let Some(symbol) = event.symbol() else {
            return;
        };
        let subscribers = self.registry.subscribers(symbol);
        if subscribers.is_empty() {
            return;
        }

        let frame = match event {
            SessionEvent::Tick(tick) => ServerFrame::tick(tick),
            SessionEvent::BarClosed(bar) => ServerFrame::bar(bar),
            SessionEvent::Stale {
                symbol,
                last_tick_at,
            } => ServerFrame::Stale(StaleFrame {
                symbol: symbol.clone(),
                last_tick_at: *last_tick_at,
            }),
            SessionEvent::Resumed { symbol } => ServerFrame::Resumed(ResumedFrame {
                symbol: symbol.clone(),
            }),
            SessionEvent::Status(_) => return,
        };

        self.hub.send_to_many(&subscribers, &Arc::new(frame));
    }

    /// Drain `events` into [`dispatch`](Self::dispatch) until cancelled or
    /// the channel closes.
    pub async fn run_dispatcher(
        self: Arc<Self>,
        mut events: mpsc::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(&event),
                    None => break,
                },
            }
        }
        tracing::debug!("gateway dispatcher stopped");
    }
}
