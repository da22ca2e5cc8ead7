//! Venue WebSocket Message Types
//!
//! Wire types for the venue's JSON protocol. Every frame is a JSON object
//! discriminated by its `type` field. Prices travel as decimal strings and
//! timestamps as integer milliseconds since the Unix epoch.
//!
//! # Outbound ([`VenueRequest`])
//!
//! - `auth {key, secret}`
//! - `symbolsRequest {requestId}`
//! - `subscribe {symbolId}` / `unsubscribe {symbolId}`
//! - `snapshotRequest {requestId, symbolId}`
//! - `heartbeat`
//!
//! # Inbound ([`VenueMessage`])
//!
//! - `authenticated {account}`
//! - `symbols {requestId, symbols}`
//! - `snapshot {requestId, symbolId, bid?, ask?, bars}`
//! - `heartbeatAck`
//! - `tick {symbolId, bid, ask, timestamp}`
//! - `bar {symbolId, open, high, low, close, timestamp}`
//! - `error {code, message, requestId?}`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{Bar, Quote, SymbolInfo};

/// Venue-side numeric symbol identifier.
pub type SymbolId = i64;

// =============================================================================
// Outbound Messages
// =============================================================================

/// Frames sent to the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VenueRequest {
    /// Credentials.
    Auth {
        /// API key.
        key: String,
        /// API secret.
        secret: String,
    },
    /// Request the available-symbol list.
    SymbolsRequest {
        /// Correlation id echoed in the response.
        request_id: String,
    },
    /// Start streaming a symbol.
    Subscribe {
        /// Venue symbol id.
        symbol_id: SymbolId,
    },
    /// Stop streaming a symbol.
    Unsubscribe {
        /// Venue symbol id.
        symbol_id: SymbolId,
    },
    /// Request today's bars and the current quote for a symbol.
    SnapshotRequest {
        /// Correlation id echoed in the response.
        request_id: String,
        /// Venue symbol id.
        symbol_id: SymbolId,
    },
    /// Keepalive probe; the venue answers with `heartbeatAck`.
    Heartbeat,
}

impl VenueRequest {
    /// Short kind name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::SymbolsRequest { .. } => "symbolsRequest",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SnapshotRequest { .. } => "snapshotRequest",
            Self::Heartbeat => "heartbeat",
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// An entry of the venue's symbol list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSymbol {
    /// Venue symbol id.
    pub id: SymbolId,
    /// Symbol name.
    pub name: String,
    /// Quote precision.
    pub digits: u32,
}

impl From<VenueSymbol> for SymbolInfo {
    fn from(symbol: VenueSymbol) -> Self {
        Self {
            name: crate::domain::streaming::normalize_symbol(&symbol.name),
            venue_id: symbol.id,
            precision: symbol.digits,
        }
    }
}

/// OHLC values as carried inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueBar {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Bar start time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl VenueBar {
    /// Attach a symbol name.
    #[must_use]
    pub fn into_bar(self, symbol: &str) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            timestamp: self.timestamp,
        }
    }
}

/// Frames received from the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VenueMessage {
    /// Credentials accepted.
    Authenticated {
        /// Account identity.
        account: String,
    },
    /// Available-symbol list.
    Symbols {
        /// Correlation id.
        request_id: String,
        /// Listed symbols.
        symbols: Vec<VenueSymbol>,
    },
    /// Snapshot response.
    Snapshot {
        /// Correlation id.
        request_id: String,
        /// Venue symbol id.
        symbol_id: SymbolId,
        /// Current bid, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bid: Option<Decimal>,
        /// Current ask, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ask: Option<Decimal>,
        /// Today's bars.
        #[serde(default)]
        bars: Vec<VenueBar>,
    },
    /// Heartbeat acknowledgement.
    HeartbeatAck,
    /// Top-of-book update.
    Tick {
        /// Venue symbol id.
        symbol_id: SymbolId,
        /// Best bid.
        bid: Decimal,
        /// Best ask.
        ask: Decimal,
        /// Venue time.
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Closed bar.
    Bar {
        /// Venue symbol id.
        symbol_id: SymbolId,
        /// Open price.
        open: Decimal,
        /// High price.
        high: Decimal,
        /// Low price.
        low: Decimal,
        /// Close price.
        close: Decimal,
        /// Bar start time.
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Error report, scoped to a request when `request_id` is set.
    Error {
        /// Error code.
        code: u16,
        /// Error message.
        message: String,
        /// Correlation id of the failed request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl VenueMessage {
    /// Short kind name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::Symbols { .. } => "symbols",
            Self::Snapshot { .. } => "snapshot",
            Self::HeartbeatAck => "heartbeatAck",
            Self::Tick { .. } => "tick",
            Self::Bar { .. } => "bar",
            Self::Error { .. } => "error",
        }
    }

    /// Quote carried by a snapshot, when both sides are present.
    #[must_use]
    pub const fn snapshot_quote(&self) -> Option<Quote> {
        match self {
            Self::Snapshot {
                bid: Some(bid),
                ask: Some(ask),
                ..
            } => Some(Quote {
                bid: *bid,
                ask: *ask,
            }),
            _ => None,
        }
    }
}
