//! Subscription Management Integration Tests
//!
//! Tests reference counting across clients, disconnect cleanup, and
//! concurrent subscribe/unsubscribe against the upstream session contract.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use test_case::test_case;
use tokio::time::timeout;

use market_relay::application::ports::{SessionError, UpstreamPort};
use market_relay::application::services::SubscriptionRegistry;
use market_relay::domain::streaming::{
    ConnectionStatus, SessionInfo, SessionState, StatusUpdate, Symbol, SymbolSnapshot,
};
use market_relay::infrastructure::broadcast::{ClientHub, ClientReceiver};
use market_relay::infrastructure::gateway::{Gateway, ServerFrame, SubscribeStatus};

/// Upstream stand-in recording subscribe/unsubscribe calls.
#[derive(Default)]
struct RecordingUpstream {
    held: Mutex<BTreeSet<Symbol>>,
    log: Mutex<Vec<(String, Symbol)>>,
}

impl RecordingUpstream {
    fn held(&self) -> Vec<Symbol> {
        self.held.lock().iter().cloned().collect()
    }

    fn calls(&self, op: &str, symbol: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(o, s)| o == op && s == symbol)
            .count()
    }
}

#[async_trait]
impl UpstreamPort for RecordingUpstream {
    fn subscribe_upstream(&self, symbol: &str) {
        assert!(self.held.lock().insert(symbol.to_string()), "double subscribe of {symbol}");
        self.log.lock().push(("subscribe".into(), symbol.to_string()));
    }

    fn unsubscribe_upstream(&self, symbol: &str) {
        assert!(self.held.lock().remove(symbol), "unsubscribe of unheld {symbol}");
        self.log.lock().push(("unsubscribe".into(), symbol.to_string()));
    }

    async fn request_snapshot(&self, symbol: &str) -> Result<SymbolSnapshot, SessionError> {
        Ok(SymbolSnapshot {
            symbol: symbol.to_string(),
            precision: 5,
            quote: None,
            bars: vec![],
        })
    }

    fn available_symbols(&self) -> Vec<Symbol> {
        ["AUDUSD", "EURUSD", "GBPUSD", "USDJPY"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn current_status(&self) -> StatusUpdate {
        StatusUpdate::new(ConnectionStatus::Connected)
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            state: SessionState::Ready,
            account: Some("demo-1".to_string()),
            last_activity: None,
            reconnect_attempts: 0,
            next_retry_in: None,
            fatal_error: None,
        }
    }
}

fn setup() -> (Arc<RecordingUpstream>, Arc<Gateway>) {
    let upstream = Arc::new(RecordingUpstream::default());
    let port: Arc<dyn UpstreamPort> = upstream.clone();
    let gateway = Arc::new(Gateway::new(port, Arc::new(ClientHub::default())));
    (upstream, gateway)
}

async fn next_frame(rx: &mut ClientReceiver, kind: &str) -> Arc<ServerFrame> {
    timeout(Duration::from_secs(1), async {
        loop {
            let frame = rx.recv().await.expect("client queue open");
            if frame.kind() == kind {
                return frame;
            }
        }
    })
    .await
    .expect("frame expected")
}

// =============================================================================
// Reference Counting
// =============================================================================

#[tokio::test]
async fn test_symbol_subscribed_upstream_once_for_many_clients() {
    let (upstream, gateway) = setup();

    let clients: Vec<_> = (0..3).map(|_| gateway.connect_client()).collect();
    for (client, _) in &clients {
        gateway.handle_text(*client, r#"{"type":"subscribe","symbols":["EURUSD"]}"#);
    }

    assert_eq!(upstream.calls("subscribe", "EURUSD"), 1);
    assert_eq!(gateway.registry().subscribers("EURUSD").len(), 3);

    for (client, _) in &clients[..2] {
        gateway.handle_text(*client, r#"{"type":"unsubscribe","symbols":["EURUSD"]}"#);
    }
    assert_eq!(upstream.held(), vec!["EURUSD"]);

    gateway.handle_text(clients[2].0, r#"{"type":"unsubscribe","symbols":["EURUSD"]}"#);
    assert!(upstream.held().is_empty());
    assert_eq!(upstream.calls("unsubscribe", "EURUSD"), 1);
}

#[tokio::test]
async fn test_disconnect_releases_only_unshared_symbols() {
    let (upstream, gateway) = setup();
    let (alice, _alice_rx) = gateway.connect_client();
    let (bob, _bob_rx) = gateway.connect_client();

    gateway.handle_text(alice, r#"{"type":"subscribe","symbols":["EURUSD","GBPUSD"]}"#);
    gateway.handle_text(bob, r#"{"type":"subscribe","symbols":["GBPUSD"]}"#);

    gateway.disconnect_client(alice);

    assert_eq!(upstream.held(), vec!["GBPUSD"]);
    assert_eq!(upstream.calls("unsubscribe", "EURUSD"), 1);
    assert_eq!(upstream.calls("unsubscribe", "GBPUSD"), 0);

    let stats = gateway.stats();
    assert_eq!(stats.clients, 1);
    assert_eq!(stats.subscriptions.symbol_count, 1);
}

#[tokio::test]
async fn test_resubscribe_after_release_subscribes_again() {
    let (upstream, gateway) = setup();
    let (client, _rx) = gateway.connect_client();

    gateway.handle_text(client, r#"{"type":"subscribe","symbols":["USDJPY"]}"#);
    gateway.handle_text(client, r#"{"type":"unsubscribe","symbols":["USDJPY"]}"#);
    gateway.handle_text(client, r#"{"type":"subscribe","symbols":["USDJPY"]}"#);

    assert_eq!(upstream.calls("subscribe", "USDJPY"), 2);
    assert_eq!(upstream.calls("unsubscribe", "USDJPY"), 1);
    assert_eq!(upstream.held(), vec!["USDJPY"]);
}

// =============================================================================
// Subscribe Responses
// =============================================================================

#[test_case(&["EURUSD"], &[SubscribeStatus::Subscribed] ; "single known symbol")]
#[test_case(&["eurusd", " gbpusd "], &[SubscribeStatus::Subscribed, SubscribeStatus::Subscribed] ; "case and whitespace normalised")]
#[test_case(&["EURUSD", "XAUUSD"], &[SubscribeStatus::Subscribed, SubscribeStatus::Error] ; "partial success")]
#[test_case(&["", "BTCUSD"], &[SubscribeStatus::Error, SubscribeStatus::Error] ; "nothing valid")]
#[tokio::test]
async fn test_subscribe_response_per_symbol(symbols: &[&str], expected: &[SubscribeStatus]) {
    let (_upstream, gateway) = setup();
    let (client, mut rx) = gateway.connect_client();

    let frame = serde_json::json!({"type": "subscribe", "symbols": symbols}).to_string();
    gateway.handle_text(client, &frame);

    let frame = next_frame(&mut rx, "subscribeResponse").await;
    let ServerFrame::SubscribeResponse(response) = frame.as_ref() else {
        unreachable!();
    };
    let statuses: Vec<SubscribeStatus> = response.results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, expected);
}

#[tokio::test]
async fn test_new_subscription_gets_snapshot_repeat_does_not() {
    let (_upstream, gateway) = setup();
    let (client, mut rx) = gateway.connect_client();

    gateway.handle_text(client, r#"{"type":"subscribe","symbols":["AUDUSD"]}"#);
    let _ = next_frame(&mut rx, "subscribeResponse").await;
    let _ = next_frame(&mut rx, "snapshot").await;

    gateway.handle_text(client, r#"{"type":"subscribe","symbols":["AUDUSD"]}"#);
    let _ = next_frame(&mut rx, "subscribeResponse").await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(frame) = rx.try_recv() {
        assert_ne!(frame.kind(), "snapshot", "repeat subscribe produced a snapshot");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_leaves_upstream_consistent() {
    let upstream = Arc::new(RecordingUpstream::default());
    let port: Arc<dyn UpstreamPort> = upstream.clone();
    let registry = Arc::new(SubscriptionRegistry::new(port));
    let symbols = ["AUDUSD", "EURUSD", "GBPUSD", "USDJPY"];

    let mut tasks = Vec::new();
    for client in 1..=16_u64 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry.register_client(client);
            for round in 0..50_usize {
                let symbol = symbols[(round + usize::try_from(client).unwrap()) % symbols.len()];
                registry.add_subscription(client, symbol);
                if round % 3 == 0 {
                    registry.remove_subscription(client, symbol);
                }
                tokio::task::yield_now().await;
            }
            if client % 2 == 0 {
                registry.remove_client(client);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Upstream holds exactly the symbols some client still holds
    let held: BTreeSet<Symbol> = upstream.held().into_iter().collect();
    let active: BTreeSet<Symbol> = registry.active_symbols().into_iter().collect();
    assert_eq!(held, active);

    let mut net: HashMap<Symbol, i64> = HashMap::new();
    for (op, symbol) in upstream.log.lock().iter() {
        *net.entry(symbol.clone()).or_default() += if op == "subscribe" { 1 } else { -1 };
    }
    for (symbol, count) in net {
        assert_eq!(count, i64::from(held.contains(&symbol)), "{symbol}");
    }
}
