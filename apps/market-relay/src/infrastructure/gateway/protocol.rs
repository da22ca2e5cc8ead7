//! Client Protocol
//!
//! JSON text frames exchanged with downstream clients, discriminated by
//! `type`. Prices are JSON numbers and timestamps are epoch milliseconds.
//!
//! # Client → Server ([`ClientFrame`])
//!
//! - `{"type":"connect"}`
//! - `{"type":"subscribe","symbols":["EURUSD"]}`
//! - `{"type":"unsubscribe","symbols":["EURUSD"]}`
//!
//! # Server → Client ([`ServerFrame`])
//!
//! `status`, `tick`, `bar`, `snapshot`, `subscribeResponse`, `stale`,
//! `resumed`, `error`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{Bar, StatusUpdate, Symbol, SymbolSnapshot, Tick};

// =============================================================================
// Error Type
// =============================================================================

/// A client frame the gateway could not interpret.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not valid JSON, or not a known frame.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Binary frames are not part of the protocol.
    #[error("binary frames are not supported")]
    BinaryFrame,
}

// =============================================================================
// Client Frames
// =============================================================================

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Handshake; answered with the current status.
    Connect,
    /// Subscribe to symbols.
    Subscribe {
        /// Symbol names (case-insensitive).
        symbols: Vec<String>,
    },
    /// Unsubscribe from symbols.
    Unsubscribe {
        /// Symbol names (case-insensitive).
        symbols: Vec<String>,
    },
}

impl ClientFrame {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for anything that is not a
    /// known client frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// =============================================================================
// Server Frames
// =============================================================================

/// Frames sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Upstream connection status.
    Status(StatusFrame),
    /// Top-of-book update.
    Tick(TickFrame),
    /// Closed bar.
    Bar(BarFrame),
    /// Initial state for a new subscription.
    Snapshot(SnapshotFrame),
    /// Per-symbol outcome of a subscribe or unsubscribe request.
    SubscribeResponse(SubscribeResponseFrame),
    /// A subscribed symbol went silent.
    Stale(StaleFrame),
    /// A stale symbol ticked again.
    Resumed(ResumedFrame),
    /// Client-scoped error.
    Error(ErrorFrame),
}

/// `status` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    /// `disconnected`, `connecting`, `authenticating`, `connected`, or `error`.
    pub status: String,
    /// Symbols clients may subscribe to.
    pub available_symbols: Vec<Symbol>,
    /// Optional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Consecutive reconnect attempts.
    pub reconnect_attempt: u32,
    /// Milliseconds until the next reconnect attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_ms: Option<u64>,
}

/// `tick` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickFrame {
    /// Symbol name.
    pub symbol: Symbol,
    /// Best bid.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid: Decimal,
    /// Best ask.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask: Decimal,
    /// Ask minus bid.
    #[serde(with = "rust_decimal::serde::float")]
    pub spread: Decimal,
    /// Venue time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// OHLC values of a bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarValues {
    /// Open price.
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    /// High price.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low price.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    /// Close price.
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    /// Bar start time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl From<&Bar> for BarValues {
    fn from(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            timestamp: bar.timestamp,
        }
    }
}

/// `bar` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarFrame {
    /// Symbol name.
    pub symbol: Symbol,
    /// OHLC values, inlined next to `symbol`.
    #[serde(flatten)]
    pub values: BarValues,
}

/// `snapshot` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    /// Symbol name.
    pub symbol: Symbol,
    /// Quote precision.
    pub precision: u32,
    /// Current bid.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub bid: Option<Decimal>,
    /// Current ask.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub ask: Option<Decimal>,
    /// Today's bars, oldest first.
    pub bars: Vec<BarValues>,
}

/// Outcome of one symbol in a subscribe/unsubscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeStatus {
    /// The client now holds the symbol.
    Subscribed,
    /// The client no longer holds the symbol.
    Unsubscribed,
    /// The request for this symbol failed.
    Error,
}

/// One entry of a `subscribeResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResult {
    /// Symbol name.
    pub symbol: Symbol,
    /// Outcome.
    pub status: SubscribeStatus,
    /// Reason for an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubscribeResult {
    /// A successful outcome.
    #[must_use]
    pub const fn ok(symbol: Symbol, status: SubscribeStatus) -> Self {
        Self {
            symbol,
            status,
            message: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn error(symbol: Symbol, message: impl Into<String>) -> Self {
        Self {
            symbol,
            status: SubscribeStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// `subscribeResponse` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponseFrame {
    /// One entry per requested symbol, in request order.
    pub results: Vec<SubscribeResult>,
}

/// `stale` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleFrame {
    /// Symbol name.
    pub symbol: Symbol,
    /// Last tick time, if any tick arrived.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// `resumed` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumedFrame {
    /// Symbol name.
    pub symbol: Symbol,
}

/// `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Human-readable reason.
    pub message: String,
}

impl ServerFrame {
    /// Build a `status` frame.
    #[must_use]
    pub fn status(update: &StatusUpdate, available_symbols: Vec<Symbol>) -> Self {
        Self::Status(StatusFrame {
            status: update.status.as_str().to_string(),
            available_symbols,
            message: update.message.clone(),
            reconnect_attempt: update.reconnect_attempt,
            next_retry_ms: update
                .next_retry
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        })
    }

    /// Build a `tick` frame.
    #[must_use]
    pub fn tick(tick: &Tick) -> Self {
        Self::Tick(TickFrame {
            symbol: tick.symbol.clone(),
            bid: tick.bid,
            ask: tick.ask,
            spread: tick.spread(),
            timestamp: tick.timestamp,
        })
    }

    /// Build a `bar` frame.
    #[must_use]
    pub fn bar(bar: &Bar) -> Self {
        Self::Bar(BarFrame {
            symbol: bar.symbol.clone(),
            values: BarValues::from(bar),
        })
    }

    /// Build a `snapshot` frame.
    #[must_use]
    pub fn snapshot(snapshot: &SymbolSnapshot) -> Self {
        Self::Snapshot(SnapshotFrame {
            symbol: snapshot.symbol.clone(),
            precision: snapshot.precision,
            bid: snapshot.quote.map(|q| q.bid),
            ask: snapshot.quote.map(|q| q.ask),
            bars: snapshot.bars.iter().map(BarValues::from).collect(),
        })
    }

    /// Build a `subscribeResponse` frame.
    #[must_use]
    pub const fn subscribe_response(results: Vec<SubscribeResult>) -> Self {
        Self::SubscribeResponse(SubscribeResponseFrame { results })
    }

    /// Build an `error` frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorFrame {
            message: message.into(),
        })
    }

    /// Wire `type` of this frame.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Tick(_) => "tick",
            Self::Bar(_) => "bar",
            Self::Snapshot(_) => "snapshot",
            Self::SubscribeResponse(_) => "subscribeResponse",
            Self::Stale(_) => "stale",
            Self::Resumed(_) => "resumed",
            Self::Error(_) => "error",
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::domain::streaming::{ConnectionStatus, Quote};

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_767_225_600_000).unwrap()
    }

    #[test]
    fn parses_client_frames() {
        assert_eq!(
            ClientFrame::parse(r#"{"type":"connect"}"#).unwrap(),
            ClientFrame::Connect
        );
        assert_eq!(
            ClientFrame::parse(r#"{"type":"subscribe","symbols":["EURUSD","NOTREAL"]}"#).unwrap(),
            ClientFrame::Subscribe {
                symbols: vec!["EURUSD".to_string(), "NOTREAL".to_string()]
            }
        );
    }

    #[test]
    fn rejects_malformed_client_frames() {
        assert!(ClientFrame::parse("not json").is_err());
        assert!(ClientFrame::parse(r#"{"type":"order"}"#).is_err());
        assert!(ClientFrame::parse(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn tick_frame_uses_numbers_and_millis() {
        let frame = ServerFrame::tick(&Tick {
            symbol: "EURUSD".to_string(),
            bid: Decimal::new(10850, 4),
            ask: Decimal::new(10852, 4),
            timestamp: ts(),
        });

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "tick");
        assert_eq!(value["symbol"], "EURUSD");
        assert!((value["bid"].as_f64().unwrap() - 1.085).abs() < 1e-12);
        assert!((value["ask"].as_f64().unwrap() - 1.0852).abs() < 1e-12);
        assert!((value["spread"].as_f64().unwrap() - 0.0002).abs() < 1e-12);
        assert_eq!(value["timestamp"], 1_767_225_600_000_i64);
    }

    #[test]
    fn bar_frame_is_flat() {
        let frame = ServerFrame::bar(&Bar {
            symbol: "USDJPY".to_string(),
            open: Decimal::new(151_200, 3),
            high: Decimal::new(151_350, 3),
            low: Decimal::new(151_100, 3),
            close: Decimal::new(151_300, 3),
            timestamp: ts(),
        });

        let value = serde_json::to_value(&frame).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["close", "high", "low", "open", "symbol", "timestamp", "type"]
        );
        assert_eq!(value["type"], "bar");
        assert_eq!(value["symbol"], "USDJPY");
        assert!((value["high"].as_f64().unwrap() - 151.35).abs() < 1e-9);
        assert!((value["close"].as_f64().unwrap() - 151.3).abs() < 1e-9);
        assert_eq!(value["timestamp"], 1_767_225_600_000_i64);
    }

    #[test]
    fn status_frame_shape() {
        let mut update = StatusUpdate::new(ConnectionStatus::Connecting);
        update.reconnect_attempt = 3;
        update.next_retry = Some(Duration::from_millis(2000));

        let value =
            serde_json::to_value(ServerFrame::status(&update, vec!["EURUSD".into()])).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "status",
                "status": "connecting",
                "availableSymbols": ["EURUSD"],
                "reconnectAttempt": 3,
                "nextRetryMs": 2000
            })
        );
    }

    #[test]
    fn subscribe_response_shape() {
        let frame = ServerFrame::subscribe_response(vec![
            SubscribeResult::ok("EURUSD".into(), SubscribeStatus::Subscribed),
            SubscribeResult::error("NOTREAL".into(), "unknown symbol"),
        ]);

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "type": "subscribeResponse",
                "results": [
                    {"symbol": "EURUSD", "status": "subscribed"},
                    {"symbol": "NOTREAL", "status": "error", "message": "unknown symbol"}
                ]
            })
        );
    }

    #[test]
    fn snapshot_frame_without_quote_omits_prices() {
        let frame = ServerFrame::snapshot(&SymbolSnapshot {
            symbol: "USDJPY".to_string(),
            precision: 3,
            quote: None,
            bars: vec![],
        });

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["precision"], 3);
        assert!(value.get("bid").is_none());
        assert_eq!(value["bars"], json!([]));
    }

    #[test]
    fn server_frames_parse_back() {
        let frame = ServerFrame::snapshot(&SymbolSnapshot {
            symbol: "EURUSD".to_string(),
            precision: 5,
            quote: Some(Quote {
                bid: Decimal::new(10850, 4),
                ask: Decimal::new(10852, 4),
            }),
            bars: vec![Bar {
                symbol: "EURUSD".to_string(),
                open: Decimal::new(1084, 3),
                high: Decimal::new(1086, 3),
                low: Decimal::new(1083, 3),
                close: Decimal::new(1085, 3),
                timestamp: ts(),
            }],
        });

        let parsed: ServerFrame = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        let ServerFrame::Snapshot(snapshot) = parsed else {
            panic!("expected snapshot, got {parsed:?}");
        };
        assert_eq!(snapshot.symbol, "EURUSD");
        assert_eq!(snapshot.precision, 5);
        assert_eq!(snapshot.bars.len(), 1);
        assert_eq!(snapshot.bars[0].timestamp, ts());
        let bid = snapshot.bid.unwrap();
        assert!((bid - Decimal::new(10850, 4)).abs() < Decimal::new(1, 9));
    }

    #[test]
    fn stale_frame_carries_optional_last_tick() {
        let frame = ServerFrame::Stale(StaleFrame {
            symbol: "GBPUSD".to_string(),
            last_tick_at: Some(ts()),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["lastTickAt"], 1_767_225_600_000_i64);

        let never = ServerFrame::Stale(StaleFrame {
            symbol: "GBPUSD".to_string(),
            last_tick_at: None,
        });
        assert!(serde_json::to_value(&never).unwrap().get("lastTickAt").is_none());
    }
}
