//! Market Data Streaming Types
//!
//! Core domain types for market data: symbols, ticks, and bars, plus the
//! session events the upstream session emits towards the gateway.
//! These types are codec-agnostic and represent the canonical
//! internal representation of market data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Symbol name (e.g., "EURUSD").
pub type Symbol = String;

/// Normalise a client-supplied symbol name for lookup.
///
/// Symbols are matched case-insensitively; the canonical form is trimmed
/// upper case.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Symbol {
    raw.trim().to_ascii_uppercase()
}

// =============================================================================
// Instruments
// =============================================================================

/// A tradable instrument as listed by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    /// Canonical symbol name.
    pub name: Symbol,
    /// Venue-side numeric identifier.
    pub venue_id: i64,
    /// Number of decimal digits the venue quotes this symbol with.
    pub precision: u32,
}

/// Current best bid/ask for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
}

// =============================================================================
// Market Data Events
// =============================================================================

/// A single top-of-book update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Symbol name.
    pub symbol: Symbol,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Venue timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// The tick as a quote.
    #[must_use]
    pub const fn quote(&self) -> Quote {
        Quote {
            bid: self.bid,
            ask: self.ask,
        }
    }
}

/// An aggregated OHLC bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    /// Symbol name.
    pub symbol: Symbol,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Bar start timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Initial state handed to a new subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSnapshot {
    /// Symbol name.
    pub symbol: Symbol,
    /// Quote precision.
    pub precision: u32,
    /// Current best bid/ask, if the venue has one.
    pub quote: Option<Quote>,
    /// Today's completed bars in ascending timestamp order.
    pub bars: Vec<Bar>,
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the upstream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket connect in progress.
    Connecting,
    /// Socket open, handshake in progress.
    Authenticating,
    /// Handshake complete; frames may be sent.
    Ready,
    /// Graceful close in progress.
    Closing,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any state may fall back to `Disconnected`; forward progress never
    /// skips a step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Disconnected)
                | (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Ready)
                | (
                    Self::Connecting | Self::Authenticating | Self::Ready,
                    Self::Closing
                )
        )
    }

    /// Client-visible status for this state.
    #[must_use]
    pub const fn status(self) -> ConnectionStatus {
        match self {
            Self::Disconnected | Self::Closing => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Authenticating => ConnectionStatus::Authenticating,
            Self::Ready => ConnectionStatus::Connected,
        }
    }

    /// Lowercase name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status as presented to downstream clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Not connected to the venue.
    Disconnected,
    /// Connecting or waiting to reconnect.
    Connecting,
    /// Handshake in progress.
    Authenticating,
    /// Live.
    Connected,
    /// Permanently failed (credentials rejected, retries exhausted).
    Error,
}

impl ConnectionStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

/// A status change published to every client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New status.
    pub status: ConnectionStatus,
    /// Optional human-readable detail.
    pub message: Option<String>,
    /// Consecutive reconnect attempts so far.
    pub reconnect_attempt: u32,
    /// Time until the next reconnect attempt, if one is scheduled.
    pub next_retry: Option<Duration>,
}

impl StatusUpdate {
    /// A plain status without detail.
    #[must_use]
    pub const fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            message: None,
            reconnect_attempt: 0,
            next_retry: None,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Observable projection of the upstream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Transport state.
    pub state: SessionState,
    /// Authenticated account, once the handshake has completed.
    pub account: Option<String>,
    /// Wall-clock time of the last inbound frame.
    pub last_activity: Option<DateTime<Utc>>,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Time until the next reconnect attempt.
    pub next_retry_in: Option<Duration>,
    /// Set once the session has given up (fatal auth error, retries exhausted).
    pub fatal_error: Option<String>,
}

// =============================================================================
// Session Events
// =============================================================================

/// Events emitted by the upstream session towards the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new top-of-book update.
    Tick(Tick),
    /// A bar interval completed.
    BarClosed(Bar),
    /// The session status changed.
    Status(StatusUpdate),
    /// A subscribed symbol has gone silent past the stale threshold.
    Stale {
        /// Symbol name.
        symbol: Symbol,
        /// Wall-clock time of the last tick, if any arrived since tracking began.
        last_tick_at: Option<DateTime<Utc>>,
    },
    /// A previously stale symbol ticked again.
    Resumed {
        /// Symbol name.
        symbol: Symbol,
    },
}

impl SessionEvent {
    /// Symbol this event is scoped to, or `None` for broadcast events.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Tick(tick) => Some(&tick.symbol),
            Self::BarClosed(bar) => Some(&bar.symbol),
            Self::Stale { symbol, .. } | Self::Resumed { symbol } => Some(symbol),
            Self::Status(_) => None,
        }
    }

    /// Short kind name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "tick",
            Self::BarClosed(_) => "bar",
            Self::Status(_) => "status",
            Self::Stale { .. } => "stale",
            Self::Resumed { .. } => "resumed",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
