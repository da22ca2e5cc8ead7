//! Upstream Session Manager
//!
//! Composes the transport, the reconnection policy, and the staleness
//! monitor into the single venue session the relay runs on.
//!
//! Two tasks run per session:
//!
//! - the **connection loop** drives [`TransportSession::connect_and_run`]
//!   and sleeps between attempts according to the [`ReconnectPolicy`]
//! - the **event pump** consumes transport events in order, translates
//!   venue frames into [`SessionEvent`]s, completes snapshot requests, and
//!   runs the staleness sweep
//!
//! The set of upstream-subscribed symbols survives reconnects: every time
//! the transport reaches `Ready` the pump re-sends a `subscribe` frame for
//! each held symbol that has not been sent on the current connection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::messages::{SymbolId, VenueMessage, VenueRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::transport::{TransportConfig, TransportEvent, TransportSession};
use crate::application::ports::{SessionError, UpstreamPort};
use crate::application::services::{StalenessMonitor, TodayCache, bars_for_day};
use crate::domain::streaming::{
    Bar, ConnectionStatus, Quote, SessionEvent, SessionInfo, SessionState, StatusUpdate, Symbol,
    SymbolInfo, SymbolSnapshot, Tick, normalize_symbol,
};
use crate::infrastructure::metrics;

/// Capacity of the transport → pump channel.
const TRANSPORT_EVENT_CAPACITY: usize = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the upstream session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Venue connection settings.
    pub transport: TransportConfig,
    /// Backoff between connection attempts.
    pub reconnect: ReconnectConfig,
    /// Silence after which a subscribed symbol is reported stale.
    pub stale_threshold: Duration,
    /// Bounded wait for snapshot responses.
    pub rpc_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with default policy values.
    #[must_use]
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            reconnect: ReconnectConfig::default(),
            stale_threshold: Duration::from_secs(15),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Internal State
// =============================================================================

/// Symbol list received during the handshake.
#[derive(Debug, Default)]
struct SymbolDirectory {
    by_name: HashMap<Symbol, SymbolInfo>,
    by_id: HashMap<SymbolId, Symbol>,
}

impl SymbolDirectory {
    fn replace(&mut self, symbols: Vec<SymbolInfo>) {
        self.by_id = symbols
            .iter()
            .map(|info| (info.venue_id, info.name.clone()))
            .collect();
        self.by_name = symbols
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
    }

    fn get(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.by_name.get(symbol)
    }

    fn by_id(&self, id: SymbolId) -> Option<&SymbolInfo> {
        self.by_id.get(&id).and_then(|name| self.by_name.get(name))
    }

    fn names(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Symbols held upstream and the connection each was last sent on.
#[derive(Debug, Default)]
struct UpstreamSubscriptions {
    desired: BTreeSet<Symbol>,
    live: HashMap<Symbol, u64>,
}

type SnapshotReply = oneshot::Sender<Result<SymbolSnapshot, SessionError>>;

// =============================================================================
// Upstream Session
// =============================================================================

/// The relay's single venue session.
pub struct UpstreamSession {
    config: SessionConfig,
    transport: Arc<TransportSession>,
    transport_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    policy: Mutex<ReconnectPolicy>,
    monitor: StalenessMonitor,
    cache: TodayCache,
    directory: RwLock<SymbolDirectory>,
    quotes: RwLock<HashMap<Symbol, Quote>>,
    subscriptions: Mutex<UpstreamSubscriptions>,
    pending: Mutex<HashMap<String, SnapshotReply>>,
    account: RwLock<Option<String>>,
    status: RwLock<StatusUpdate>,
    last_error: Mutex<Option<String>>,
    fatal_error: RwLock<Option<String>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSession")
            .field("url", &self.config.transport.url)
            .field("state", &self.transport.state())
            .finish_non_exhaustive()
    }
}

impl UpstreamSession {
    /// Create a session publishing [`SessionEvent`]s on `event_tx`.
    ///
    /// Nothing connects until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        event_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let transport = Arc::new(TransportSession::new(config.transport.clone(), transport_tx));

        Self {
            policy: Mutex::new(ReconnectPolicy::new(config.reconnect.clone())),
            monitor: StalenessMonitor::new(config.stale_threshold),
            config,
            transport,
            transport_rx: Mutex::new(Some(transport_rx)),
            event_tx,
            cache: TodayCache::new(),
            directory: RwLock::new(SymbolDirectory::default()),
            quotes: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(UpstreamSubscriptions::default()),
            pending: Mutex::new(HashMap::new()),
            account: RwLock::new(None),
            status: RwLock::new(StatusUpdate::new(ConnectionStatus::Disconnected)),
            last_error: Mutex::new(None),
            fatal_error: RwLock::new(None),
            started: AtomicBool::new(false),
            cancel,
        }
    }

    /// Begin connecting. Calling it again has no effect.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("upstream session already started");
            return;
        }
        let Some(transport_rx) = self.transport_rx.lock().take() else {
            return;
        };

        tracing::info!(url = %self.config.transport.url, "starting upstream session");
        tokio::spawn(Arc::clone(self).pump(transport_rx));
        tokio::spawn(Arc::clone(self).connection_loop());
    }

    /// Stop the session: no further reconnects, the live connection closes.
    pub fn stop(&self) {
        tracing::info!("stopping upstream session");
        self.policy.lock().stop();
        self.cancel.cancel();
    }

    /// Current transport state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.transport.state()
    }

    /// Symbols currently held upstream, sorted.
    #[must_use]
    pub fn upstream_symbols(&self) -> Vec<Symbol> {
        self.subscriptions.lock().desired.iter().cloned().collect()
    }

    // =========================================================================
    // Connection Loop
    // =========================================================================

    async fn connection_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = self.transport.connect_and_run(&self.cancel).await;
            let now = Instant::now();
            {
                let mut policy = self.policy.lock();
                if let Some(ready_at) = self.transport.ready_at() {
                    policy.on_ready(ready_at);
                }
                policy.on_disconnected(now);
            }

            if self.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = &result
                && e.is_fatal()
            {
                tracing::error!(error = %e, "venue rejected the session, not reconnecting");
                self.give_up(e.to_string()).await;
                break;
            }

            let scheduled = {
                let mut policy = self.policy.lock();
                policy
                    .next_delay(now)
                    .map(|delay| (policy.attempt_count(), delay))
            };
            let Some((attempt, delay)) = scheduled else {
                tracing::error!("reconnect attempts exhausted");
                self.give_up("reconnect attempts exhausted".to_string())
                    .await;
                break;
            };

            metrics::record_reconnect_attempt();
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting to venue"
            );
            self.transport
                .emit(TransportEvent::Reconnecting { attempt, delay })
                .await;

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("venue connection loop stopped");
    }

    async fn give_up(&self, reason: String) {
        self.policy.lock().stop();
        *self.fatal_error.write() = Some(reason.clone());
        self.transport.emit(TransportEvent::Fatal(reason)).await;
    }

    // =========================================================================
    // Event Pump
    // =========================================================================

    async fn pump(self: Arc<Self>, mut transport_rx: mpsc::Receiver<TransportEvent>) {
        let every = self.monitor.sweep_interval();
        let mut sweep = tokio::time::interval_at(Instant::now() + every, every);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                event = transport_rx.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => break,
                    }
                }
                () = self.cancel.cancelled() => {
                    self.pending.lock().clear();
                    let stopped = StatusUpdate::new(ConnectionStatus::Disconnected)
                        .with_message("session stopped");
                    self.publish_status(stopped).await;
                    break;
                }
                _ = sweep.tick() => self.sweep_stale().await,
            }
        }

        tracing::debug!("upstream event pump stopped");
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.on_state_changed(state).await,
            TransportEvent::Authenticated { account, symbols } => {
                *self.account.write() = Some(account);
                self.directory.write().replace(symbols);
            }
            TransportEvent::Message(msg) => self.handle_message(msg).await,
            TransportEvent::Error(message) => {
                *self.last_error.lock() = Some(message);
            }
            TransportEvent::Reconnecting { attempt, delay } => {
                let mut update = StatusUpdate::new(ConnectionStatus::Connecting);
                update.reconnect_attempt = attempt;
                update.next_retry = Some(delay);
                update.message = self.last_error.lock().clone();
                self.publish_status(update).await;
            }
            TransportEvent::Fatal(reason) => {
                self.publish_status(StatusUpdate::new(ConnectionStatus::Error).with_message(reason))
                    .await;
            }
        }
    }

    async fn on_state_changed(&self, state: SessionState) {
        match state {
            SessionState::Ready => {
                *self.last_error.lock() = None;
                self.monitor.rearm(Instant::now());
                self.restore_subscriptions();
            }
            SessionState::Disconnected => {
                // Bars closed while the link is down never reach the cache
                self.cache.clear();
                self.quotes.write().clear();

                let failed = {
                    let mut pending = self.pending.lock();
                    let count = pending.len();
                    pending.clear();
                    count
                };
                if failed > 0 {
                    tracing::debug!(failed, "failing snapshot requests on disconnect");
                }
            }
            // Closing is always followed by Disconnected
            SessionState::Closing => return,
            SessionState::Connecting | SessionState::Authenticating => {}
        }

        let mut update = StatusUpdate::new(state.status());
        update.reconnect_attempt = self.policy.lock().attempt_count();
        if state == SessionState::Disconnected {
            update.message = self.last_error.lock().clone();
        }
        self.publish_status(update).await;
    }

    async fn handle_message(&self, msg: VenueMessage) {
        match msg {
            VenueMessage::Tick {
                symbol_id,
                bid,
                ask,
                timestamp,
            } => {
                let Some(symbol) = self.symbol_name(symbol_id) else {
                    tracing::debug!(symbol_id, "dropping tick for unknown symbol id");
                    return;
                };
                self.quotes.write().insert(symbol.clone(), Quote { bid, ask });

                if self
                    .monitor
                    .record_tick(&symbol, Instant::now(), Utc::now())
                {
                    tracing::info!(%symbol, "symbol resumed");
                    self.emit(SessionEvent::Resumed {
                        symbol: symbol.clone(),
                    })
                    .await;
                }

                self.emit(SessionEvent::Tick(Tick {
                    symbol,
                    bid,
                    ask,
                    timestamp,
                }))
                .await;
            }
            VenueMessage::Bar {
                symbol_id,
                open,
                high,
                low,
                close,
                timestamp,
            } => {
                let Some(symbol) = self.symbol_name(symbol_id) else {
                    tracing::debug!(symbol_id, "dropping bar for unknown symbol id");
                    return;
                };
                let bar = Bar {
                    symbol,
                    open,
                    high,
                    low,
                    close,
                    timestamp,
                };
                self.cache.push(&bar);
                self.emit(SessionEvent::BarClosed(bar)).await;
            }
            msg @ VenueMessage::Snapshot { .. } => self.on_snapshot(msg),
            VenueMessage::Error {
                code,
                message,
                request_id: Some(request_id),
            } => {
                tracing::warn!(code, %message, %request_id, "venue rejected request");
                if let Some(reply) = self.pending.lock().remove(&request_id) {
                    let _ = reply.send(Err(SessionError::SnapshotFailed { code, message }));
                }
            }
            VenueMessage::Error {
                code,
                message,
                request_id: None,
            } => {
                tracing::warn!(code, %message, "venue reported an error");
                let update = self.status.read().clone().with_message(message);
                self.publish_status(update).await;
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring unexpected venue frame");
            }
        }
    }

    fn on_snapshot(&self, msg: VenueMessage) {
        let quote = msg.snapshot_quote();
        let VenueMessage::Snapshot {
            request_id,
            symbol_id,
            bars,
            ..
        } = msg
        else {
            return;
        };

        let Some(reply) = self.pending.lock().remove(&request_id) else {
            tracing::debug!(%request_id, "dropping unsolicited snapshot");
            return;
        };
        let Some(info) = self.directory.read().by_id(symbol_id).cloned() else {
            let _ = reply.send(Err(SessionError::UnknownSymbol(symbol_id.to_string())));
            return;
        };

        let today = Utc::now().date_naive();
        let bars: Vec<Bar> = bars
            .into_iter()
            .map(|bar| bar.into_bar(&info.name))
            .collect();
        let bars = bars_for_day(&bars, today);

        if self.subscriptions.lock().desired.contains(&info.name) {
            self.cache.seed(&info.name, &bars, today);
            if let Some(quote) = quote {
                self.quotes.write().insert(info.name.clone(), quote);
            }
        }

        let _ = reply.send(Ok(SymbolSnapshot {
            symbol: info.name,
            precision: info.precision,
            quote,
            bars,
        }));
    }

    async fn sweep_stale(&self) {
        // Silence only counts while the venue link is up
        if self.transport.state() != SessionState::Ready {
            return;
        }
        let threshold_ms = u64::try_from(self.monitor.threshold().as_millis()).unwrap_or(u64::MAX);
        for stale in self.monitor.sweep(Instant::now()) {
            metrics::record_stale_episode();
            tracing::warn!(symbol = %stale.symbol, threshold_ms, "symbol is stale");
            self.emit(SessionEvent::Stale {
                symbol: stale.symbol,
                last_tick_at: stale.last_tick_at,
            })
            .await;
        }
    }

    /// Send `subscribe` for every held symbol not yet sent on this connection.
    fn restore_subscriptions(&self) {
        let epoch = self.transport.connection_epoch();
        let directory = self.directory.read();
        let mut subs = self.subscriptions.lock();

        let unsent: Vec<Symbol> = subs
            .desired
            .iter()
            .filter(|symbol| subs.live.get(*symbol) != Some(&epoch))
            .cloned()
            .collect();

        let mut restored = 0_usize;
        for symbol in unsent {
            let Some(info) = directory.get(&symbol) else {
                tracing::warn!(%symbol, "held symbol is not listed by the venue");
                continue;
            };
            if self
                .transport
                .send(VenueRequest::Subscribe {
                    symbol_id: info.venue_id,
                })
                .is_ok()
            {
                subs.live.insert(symbol, epoch);
                restored += 1;
            }
        }

        if restored > 0 {
            tracing::info!(restored, "restored upstream subscriptions");
        }
    }

    fn symbol_name(&self, id: SymbolId) -> Option<Symbol> {
        self.directory.read().by_id(id).map(|info| info.name.clone())
    }

    async fn publish_status(&self, update: StatusUpdate) {
        tracing::info!(
            status = update.status.as_str(),
            attempt = update.reconnect_attempt,
            message = update.message.as_deref().unwrap_or(""),
            "upstream status"
        );
        *self.status.write() = update.clone();
        self.emit(SessionEvent::Status(update)).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("session event channel closed");
        }
    }
}

#[async_trait]
impl UpstreamPort for UpstreamSession {
    fn subscribe_upstream(&self, symbol: &str) {
        let symbol = normalize_symbol(symbol);
        let venue_id = self.directory.read().get(&symbol).map(|info| info.venue_id);
        let mut subs = self.subscriptions.lock();

        if !subs.desired.insert(symbol.clone()) {
            tracing::debug!(%symbol, "already subscribed upstream");
            return;
        }
        self.monitor.track(&symbol, Instant::now());
        metrics::set_upstream_subscriptions(subs.desired.len());

        let Some(symbol_id) = venue_id else {
            tracing::debug!(%symbol, "symbol not listed yet, subscribe deferred");
            return;
        };
        let epoch = self.transport.connection_epoch();
        match self.transport.send(VenueRequest::Subscribe { symbol_id }) {
            Ok(()) => {
                tracing::debug!(%symbol, symbol_id, "subscribed upstream");
                subs.live.insert(symbol, epoch);
            }
            Err(_) => tracing::debug!(%symbol, "transport not ready, subscribe deferred"),
        }
    }

    fn unsubscribe_upstream(&self, symbol: &str) {
        let symbol = normalize_symbol(symbol);
        let venue_id = self.directory.read().get(&symbol).map(|info| info.venue_id);
        let mut subs = self.subscriptions.lock();

        if !subs.desired.remove(&symbol) {
            tracing::debug!(%symbol, "not subscribed upstream");
            return;
        }
        let epoch = self.transport.connection_epoch();
        let sent_on_this_connection = subs.live.remove(&symbol) == Some(epoch);
        metrics::set_upstream_subscriptions(subs.desired.len());
        drop(subs);

        self.monitor.untrack(&symbol);
        self.cache.evict(&symbol);
        self.quotes.write().remove(&symbol);

        if sent_on_this_connection
            && let Some(symbol_id) = venue_id
            && self
                .transport
                .send(VenueRequest::Unsubscribe { symbol_id })
                .is_ok()
        {
            tracing::debug!(%symbol, symbol_id, "unsubscribed upstream");
        }
    }

    async fn request_snapshot(&self, symbol: &str) -> Result<SymbolSnapshot, SessionError> {
        let symbol = normalize_symbol(symbol);
        if self.transport.state() != SessionState::Ready {
            return Err(SessionError::NotConnected);
        }
        let info = self
            .directory
            .read()
            .get(&symbol)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.clone()))?;

        let today = Utc::now().date_naive();
        let quote = self.quotes.read().get(&symbol).copied();
        if let Some(quote) = quote
            && let Some(bars) = self.cache.bars(&symbol, today)
        {
            metrics::record_snapshot(Duration::ZERO, "cached");
            return Ok(SymbolSnapshot {
                symbol,
                precision: info.precision,
                quote: Some(quote),
                bars,
            });
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), reply_tx);

        let request = VenueRequest::SnapshotRequest {
            request_id: request_id.clone(),
            symbol_id: info.venue_id,
        };
        if self.transport.send(request).is_err() {
            self.pending.lock().remove(&request_id);
            return Err(SessionError::NotConnected);
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.rpc_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::NotConnected),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                tracing::warn!(%symbol, %request_id, "snapshot request timed out");
                Err(SessionError::UpstreamTimeout(self.config.rpc_timeout))
            }
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::record_snapshot(started.elapsed(), outcome);
        result
    }

    fn available_symbols(&self) -> Vec<Symbol> {
        self.directory.read().names()
    }

    fn is_available(&self, symbol: &str) -> bool {
        self.directory.read().get(symbol).is_some()
    }

    fn current_status(&self) -> StatusUpdate {
        self.status.read().clone()
    }

    fn session_info(&self) -> SessionInfo {
        let now = Instant::now();
        let state = self.transport.state();
        let (reconnect_attempts, next_retry_in) = {
            let mut policy = self.policy.lock();
            if state == SessionState::Ready
                && let Some(ready_at) = self.transport.ready_at()
            {
                policy.on_ready(ready_at);
                policy.settle(now);
            }
            (policy.attempt_count(), policy.next_retry_in(now))
        };

        SessionInfo {
            state,
            account: self.account.read().clone(),
            last_activity: self.transport.last_activity(),
            reconnect_attempts,
            next_retry_in,
            fatal_error: self.fatal_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::venue::auth::Credentials;

    fn session() -> (UpstreamSession, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let transport = TransportConfig::new(
            "ws://127.0.0.1:9",
            Credentials::new("key", "secret").unwrap(),
        );
        (
            UpstreamSession::new(SessionConfig::new(transport), tx, CancellationToken::new()),
            rx,
        )
    }

    #[test]
    fn directory_maps_ids_and_sorts_names() {
        let mut directory = SymbolDirectory::default();
        directory.replace(vec![
            SymbolInfo {
                name: "USDJPY".to_string(),
                venue_id: 2,
                precision: 3,
            },
            SymbolInfo {
                name: "EURUSD".to_string(),
                venue_id: 1,
                precision: 5,
            },
        ]);

        assert_eq!(directory.names(), vec!["EURUSD", "USDJPY"]);
        assert_eq!(directory.by_id(2).map(|i| i.name.as_str()), Some("USDJPY"));
        assert!(directory.by_id(3).is_none());
        assert_eq!(directory.get("EURUSD").map(|i| i.precision), Some(5));
    }

    #[tokio::test]
    async fn snapshot_before_ready_is_not_connected() {
        let (session, _rx) = session();
        assert_eq!(
            session.request_snapshot("EURUSD").await,
            Err(SessionError::NotConnected)
        );
    }

    #[test]
    fn subscribe_while_disconnected_is_recorded_once() {
        let (session, _rx) = session();

        session.subscribe_upstream("eurusd");
        session.subscribe_upstream("EURUSD");

        assert_eq!(session.upstream_symbols(), vec!["EURUSD"]);
        assert_eq!(session.monitor.tracked_count(), 1);

        session.unsubscribe_upstream("EURUSD");
        assert!(session.upstream_symbols().is_empty());
        assert_eq!(session.monitor.tracked_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_venue_reports_no_stale_symbols() {
        let (tx, mut rx) = mpsc::channel(256);
        let transport = TransportConfig::new(
            "ws://127.0.0.1:9",
            Credentials::new("key", "secret").unwrap(),
        );
        let mut config = SessionConfig::new(transport);
        config.stale_threshold = Duration::from_millis(100);
        let session = Arc::new(UpstreamSession::new(config, tx, CancellationToken::new()));

        session.subscribe_upstream("EURUSD");
        session.start();
        tokio::time::sleep(Duration::from_millis(600)).await;
        session.stop();

        assert_ne!(session.state(), SessionState::Ready);
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, SessionEvent::Stale { .. }),
                "stale reported without a venue link: {event:?}"
            );
        }
    }

    #[test]
    fn info_before_start() {
        let (session, _rx) = session();
        let info = session.session_info();

        assert_eq!(info.state, SessionState::Disconnected);
        assert_eq!(info.reconnect_attempts, 0);
        assert!(info.account.is_none());
        assert!(info.fatal_error.is_none());
        assert_eq!(
            session.current_status().status,
            ConnectionStatus::Disconnected
        );
    }
}
