//! Venue Transport Session
//!
//! Owns one WebSocket connection to the venue at a time and walks it
//! through `Disconnected → Connecting → Authenticating → Ready → Closing`,
//! falling back to `Disconnected` from any state on close, error, or stop.
//!
//! Each call to [`TransportSession::connect_and_run`] drives exactly one
//! connection to completion; retry scheduling lives in the session manager.
//! Every state change and every inbound data frame is published as a
//! [`TransportEvent`] on a single ordered channel.
//!
//! # Stream URL
//!
//! Production venues use `wss://` (rustls, ring provider); `ws://` is
//! accepted for local venues.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{AUTH_TIMEOUT, AuthError, AuthHandler, Credentials};
use super::codec::{CodecError, JsonCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{VenueMessage, VenueRequest};
use crate::domain::streaming::{SessionState, SymbolInfo};
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a venue connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The venue rejected the handshake.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// No heartbeat acknowledgement within the timeout.
    #[error("heartbeat timed out after {0:?}")]
    HeartbeatTimeout(Duration),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The venue closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame was sent while the session was not `Ready`.
    #[error("transport is not ready")]
    NotReady,
}

impl TransportError {
    /// Whether reconnecting cannot help.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_fatal(),
            _ => false,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events published by the transport (and the reconnect loop driving it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection moved to a new state.
    StateChanged(SessionState),
    /// The handshake completed; emitted just before `StateChanged(Ready)`.
    Authenticated {
        /// Account identity.
        account: String,
        /// Symbols the venue lists.
        symbols: Vec<SymbolInfo>,
    },
    /// A data frame (tick, bar, snapshot, error).
    Message(VenueMessage),
    /// The connection failed; emitted just before `StateChanged(Disconnected)`.
    Error(String),
    /// A reconnect attempt was scheduled.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The session gave up for good.
    Fatal(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one venue transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Bound on the whole handshake.
    pub auth_timeout: Duration,
}

impl TransportConfig {
    /// Create a new configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            heartbeat: HeartbeatConfig::default(),
            auth_timeout: AUTH_TIMEOUT,
        }
    }
}

// =============================================================================
// Transport Session
// =============================================================================

/// A single venue connection state machine.
pub struct TransportSession {
    config: TransportConfig,
    codec: JsonCodec,
    state: RwLock<SessionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<VenueRequest>>>,
    event_tx: mpsc::Sender<TransportEvent>,
    epoch: AtomicU64,
    ready_at: Mutex<Option<Instant>>,
    last_activity: RwLock<Option<DateTime<Utc>>>,
}

impl TransportSession {
    /// Create a transport publishing on `event_tx`.
    #[must_use]
    pub fn new(config: TransportConfig, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            state: RwLock::new(SessionState::Disconnected),
            outbound: Mutex::new(None),
            event_tx,
            epoch: AtomicU64::new(0),
            ready_at: Mutex::new(None),
            last_activity: RwLock::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Identifier of the current (or most recent) connection.
    #[must_use]
    pub fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// When the current connection reached `Ready`, if it did.
    #[must_use]
    pub fn ready_at(&self) -> Option<Instant> {
        *self.ready_at.lock()
    }

    /// Wall-clock time of the last inbound frame.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        *self.last_activity.read()
    }

    /// Queue a frame for the venue.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotReady`] unless the session is `Ready`.
    pub fn send(&self, request: VenueRequest) -> Result<(), TransportError> {
        if self.state() != SessionState::Ready {
            return Err(TransportError::NotReady);
        }
        self.outbound
            .lock()
            .as_ref()
            .ok_or(TransportError::NotReady)?
            .send(request)
            .map_err(|_| TransportError::NotReady)
    }

    /// Publish an event on the transport channel.
    pub async fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("transport event channel closed");
        }
    }

    /// Connect, authenticate, and pump frames until the connection ends.
    ///
    /// Returns `Ok(())` when cancelled (or when a connection is already
    /// active, which makes repeated calls harmless). Returns the error that
    /// ended the connection otherwise. The state is always `Disconnected`
    /// on return from a call that actually connected.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why the connection ended.
    pub async fn connect_and_run(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        {
            let mut state = self.state.write();
            if *state != SessionState::Disconnected {
                tracing::debug!(state = %*state, "connect ignored, connection already active");
                return Ok(());
            }
            *state = SessionState::Connecting;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.ready_at.lock() = None;
        self.emit(TransportEvent::StateChanged(SessionState::Connecting))
            .await;
        metrics::set_session_state(SessionState::Connecting);

        let result = self.run_connection(cancel).await;

        *self.outbound.lock() = None;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "venue connection ended");
            self.emit(TransportEvent::Error(e.to_string())).await;
        }
        self.set_state(SessionState::Disconnected).await;

        result
    }

    async fn set_state(&self, next: SessionState) {
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            if !state.can_transition_to(next) {
                tracing::warn!(from = %*state, to = %next, "unexpected transport transition");
            }
            *state = next;
        }
        tracing::debug!(state = %next, "transport state changed");
        metrics::set_session_state(next);
        self.emit(TransportEvent::StateChanged(next)).await;
    }

    fn touch(&self) {
        *self.last_activity.write() = Some(Utc::now());
    }

    async fn run_connection(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        tracing::info!(url = %self.config.url, "connecting to venue");

        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            connected = tokio_tungstenite::connect_async(self.config.url.as_str()) => connected?,
        };
        let (mut write, mut read) = ws_stream.split();

        self.set_state(SessionState::Authenticating).await;

        let handshake = tokio::time::timeout(
            self.config.auth_timeout,
            self.handshake(&mut write, &mut read),
        );
        let (account, symbols) = tokio::select! {
            () = cancel.cancelled() => {
                self.set_state(SessionState::Closing).await;
                return Ok(());
            }
            outcome = handshake => outcome
                .map_err(|_| TransportError::HandshakeTimeout(self.config.auth_timeout))??,
        };

        tracing::info!(%account, symbols = symbols.len(), "venue session authenticated");
        self.emit(TransportEvent::Authenticated { account, symbols })
            .await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(outbound_tx);
        *self.ready_at.lock() = Some(Instant::now());
        self.set_state(SessionState::Ready).await;

        self.pump(cancel, &mut write, &mut read, outbound_rx).await
    }

    /// Authenticate and fetch the symbol list.
    async fn handshake(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
    ) -> Result<(String, Vec<SymbolInfo>), TransportError> {
        let mut auth = AuthHandler::new(self.config.credentials.clone());
        let request = auth.create_auth_request();
        write
            .send(Message::Text(self.codec.encode(&request)?.into()))
            .await?;

        loop {
            let text = match read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };
            self.touch();

            let messages = match self.codec.decode(text.as_str()) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping undecodable handshake frame");
                    continue;
                }
            };

            for msg in messages {
                match msg {
                    VenueMessage::Authenticated { account } => {
                        if let Some(symbols_request) = auth.on_authenticated(&account) {
                            write
                                .send(Message::Text(self.codec.encode(&symbols_request)?.into()))
                                .await?;
                        }
                    }
                    VenueMessage::Symbols {
                        request_id,
                        symbols,
                    } if auth.on_symbols(&request_id) => {
                        let account = auth.account().unwrap_or_default().to_string();
                        let symbols = symbols.into_iter().map(SymbolInfo::from).collect();
                        return Ok((account, symbols));
                    }
                    VenueMessage::Error { code, message, .. } => {
                        tracing::error!(code, %message, "venue rejected handshake");
                        return Err(auth.on_error(code, &message).into());
                    }
                    other => {
                        tracing::trace!(kind = other.kind(), "ignoring frame during handshake");
                    }
                }
            }
        }
    }

    /// Run the ready connection: heartbeats, outbound frames, inbound frames.
    async fn pump(
        &self,
        cancel: &CancellationToken,
        write: &mut WsWrite,
        read: &mut WsRead,
        mut outbound_rx: mpsc::UnboundedReceiver<VenueRequest>,
    ) -> Result<(), TransportError> {
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat,
                heartbeat_state.clone(),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.set_state(SessionState::Closing).await;
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            let frame = self.codec.encode(&VenueRequest::Heartbeat)?;
                            write.send(Message::Text(frame.into())).await?;
                        }
                        Some(HeartbeatEvent::Timeout(elapsed)) => {
                            metrics::record_heartbeat_timeout();
                            return Err(TransportError::HeartbeatTimeout(elapsed));
                        }
                        None => {
                            tracing::debug!("heartbeat channel closed");
                        }
                    }
                }
                Some(request) = outbound_rx.recv() => {
                    match self.codec.encode(&request) {
                        Ok(frame) => {
                            tracing::trace!(kind = request.kind(), "sending venue frame");
                            write.send(Message::Text(frame.into())).await?;
                        }
                        Err(e) => tracing::warn!(
                            error = %e,
                            kind = request.kind(),
                            "failed to encode venue frame"
                        ),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.touch();
                            self.handle_text(text.as_str(), &heartbeat_state).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.touch();
                            heartbeat_state.record_ack();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.touch();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("venue closed the connection");
                            return Err(TransportError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary and raw frames carry nothing in this protocol
                        }
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, heartbeat_state: &HeartbeatState) {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable venue frame");
                return;
            }
        };

        for msg in messages {
            metrics::record_upstream_message(msg.kind());
            if msg == VenueMessage::HeartbeatAck {
                heartbeat_state.record_ack();
            } else {
                self.emit(TransportEvent::Message(msg)).await;
            }
        }
    }
}
