//! Scripted venue for integration tests.
//!
//! Listens on `127.0.0.1:0`, runs the auth/symbols handshake for every
//! accepted connection, and hands the live connection to the test.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use market_relay::domain::streaming::SessionEvent;
use market_relay::infrastructure::venue::{
    Credentials, ReconnectConfig, SessionConfig, TransportConfig, VenueBar, VenueMessage,
    VenueRequest, VenueSymbol,
};
use rust_decimal::Decimal;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Bound on any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// How the venue answers the `auth` frame.
#[derive(Debug, Clone, Copy)]
pub enum AuthReply {
    /// Accept and list [`symbols`].
    Accept,
    /// Reject with this error code.
    Reject(u16),
}

/// Symbols every mock venue lists.
pub fn symbols() -> Vec<VenueSymbol> {
    vec![
        VenueSymbol {
            id: 1,
            name: "EURUSD".to_string(),
            digits: 5,
        },
        VenueSymbol {
            id: 2,
            name: "USDJPY".to_string(),
            digits: 3,
        },
    ]
}

/// A listening mock venue.
pub struct MockVenue {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<VenueConnection>,
}

impl MockVenue {
    /// Start listening; every connection is answered with `reply`.
    pub async fn start(reply: AuthReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    if let Some(conn) = handshake(ws, reply).await {
                        let _ = tx.send(conn);
                    }
                });
            }
        });

        Self { addr, connections }
    }

    /// WebSocket URL of this venue.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next authenticated connection.
    pub async fn accept(&mut self) -> VenueConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("venue connection expected")
            .expect("venue listener stopped")
    }

    /// Assert no authenticated connection arrives within `within`.
    pub async fn assert_no_connection(&mut self, within: Duration) {
        assert!(
            timeout(within, self.connections.recv()).await.is_err(),
            "unexpected venue connection"
        );
    }

    /// Session configuration pointing at this venue, with fast retries.
    pub fn session_config(&self) -> SessionConfig {
        let credentials = Credentials::new("test-key", "test-secret").unwrap();
        let mut config = SessionConfig::new(TransportConfig::new(self.url(), credentials));
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            jitter_factor: 0.0,
            ..ReconnectConfig::default()
        };
        config
    }
}

async fn handshake(
    mut ws: WebSocketStream<TcpStream>,
    reply: AuthReply,
) -> Option<VenueConnection> {
    let Some(VenueRequest::Auth { key, .. }) = read_request(&mut ws).await else {
        return None;
    };
    assert_eq!(key, "test-key");

    if let AuthReply::Reject(code) = reply {
        let error = VenueMessage::Error {
            code,
            message: "invalid credentials".to_string(),
            request_id: None,
        };
        let _ = ws.send(text(&error)).await;
        return None;
    }

    ws.send(text(&VenueMessage::Authenticated {
        account: "demo-1".to_string(),
    }))
    .await
    .ok()?;

    let Some(VenueRequest::SymbolsRequest { request_id }) = read_request(&mut ws).await else {
        return None;
    };
    ws.send(text(&VenueMessage::Symbols {
        request_id,
        symbols: symbols(),
    }))
    .await
    .ok()?;

    Some(VenueConnection {
        ws,
        ack_heartbeats: true,
    })
}

async fn read_request(ws: &mut WebSocketStream<TcpStream>) -> Option<VenueRequest> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn text(msg: &VenueMessage) -> Message {
    Message::Text(serde_json::to_string(msg).unwrap().into())
}

/// An authenticated venue connection.
pub struct VenueConnection {
    ws: WebSocketStream<TcpStream>,
    ack_heartbeats: bool,
}

impl VenueConnection {
    /// Stop answering heartbeats.
    pub fn ignore_heartbeats(&mut self) {
        self.ack_heartbeats = false;
    }

    /// Next non-heartbeat request, or `None` once the relay disconnects.
    pub async fn next_request(&mut self) -> Option<VenueRequest> {
        loop {
            match read_request(&mut self.ws).await? {
                VenueRequest::Heartbeat => {
                    if self.ack_heartbeats {
                        let _ = self.ws.send(text(&VenueMessage::HeartbeatAck)).await;
                    }
                }
                request => return Some(request),
            }
        }
    }

    /// Wait for the next non-heartbeat request.
    pub async fn expect_request(&mut self) -> VenueRequest {
        timeout(WAIT, self.next_request())
            .await
            .expect("venue request expected")
            .expect("relay disconnected")
    }

    /// Assert no non-heartbeat request arrives within `within`.
    pub async fn assert_quiet(&mut self, within: Duration) {
        if let Ok(Some(request)) = timeout(within, self.next_request()).await {
            panic!("unexpected venue request: {request:?}");
        }
    }

    /// Wait until the relay drops the connection.
    pub async fn expect_disconnect(&mut self) {
        let closed = timeout(WAIT, async {
            while self.next_request().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "relay kept the connection open");
    }

    /// Send a frame to the relay.
    pub async fn send(&mut self, msg: &VenueMessage) {
        self.ws.send(text(msg)).await.unwrap();
    }

    /// Send a tick.
    pub async fn tick(&mut self, symbol_id: i64, bid: &str, ask: &str) {
        self.send(&VenueMessage::Tick {
            symbol_id,
            bid: bid.parse::<Decimal>().unwrap(),
            ask: ask.parse::<Decimal>().unwrap(),
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Close the connection from the venue side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// A bar for snapshot replies.
pub fn venue_bar(close: &str, timestamp: DateTime<Utc>) -> VenueBar {
    let price: Decimal = close.parse().unwrap();
    VenueBar {
        open: price,
        high: price,
        low: price,
        close: price,
        timestamp,
    }
}

/// Wait for the first session event matching `pred`, skipping the rest.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("session event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("session event expected")
}
