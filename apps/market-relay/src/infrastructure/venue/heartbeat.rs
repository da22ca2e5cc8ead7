//! Heartbeat Manager
//!
//! Keeps the venue connection honest while it is `Ready`. A `heartbeat`
//! frame is requested on a fixed interval; if no acknowledgement
//! (`heartbeatAck` or a WebSocket pong) arrives within the timeout while a
//! probe is outstanding, the connection is declared dead even though the
//! socket itself never reported closure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat frames.
    pub ping_interval: Duration,
    /// Time without an acknowledgement before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// How often the manager wakes up: the shorter of the ping interval
    /// and the timeout, so a dead link is noticed close to the deadline.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.ping_interval.min(self.pong_timeout)
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a heartbeat frame now.
    SendPing,
    /// No acknowledgement within the timeout; drop the connection.
    Timeout(Duration),
}

/// State shared between the heartbeat manager and the connection reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_ack: RwLock<Instant>,
    last_ping: RwLock<Instant>,
    waiting_for_ack: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_ack: RwLock::new(now),
            last_ping: RwLock::new(now),
            waiting_for_ack: AtomicBool::new(false),
        }
    }

    /// Record that an acknowledgement was received.
    pub fn record_ack(&self) {
        *self.last_ack.write() = Instant::now();
        self.waiting_for_ack.store(false, Ordering::SeqCst);
    }

    /// Mark that a heartbeat frame went out.
    pub fn mark_ping_sent(&self) {
        if !self.waiting_for_ack.swap(true, Ordering::SeqCst) {
            *self.last_ping.write() = Instant::now();
        }
    }

    /// Check if a heartbeat is awaiting acknowledgement.
    #[must_use]
    pub fn is_waiting_for_ack(&self) -> bool {
        self.waiting_for_ack.load(Ordering::SeqCst)
    }

    /// Time since the oldest unacknowledged heartbeat was sent.
    #[must_use]
    pub fn time_since_ping(&self) -> Duration {
        self.last_ping.read().elapsed()
    }

    /// Time since the last acknowledgement.
    #[must_use]
    pub fn time_since_ack(&self) -> Duration {
        self.last_ack.read().elapsed()
    }
}

/// Heartbeat manager that monitors connection health.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the heartbeat loop until cancelled or a timeout is detected.
    pub async fn run(self) {
        let check_every = self.config.check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + check_every, check_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut next_ping = Instant::now() + self.config.ping_interval;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat manager cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.state.is_waiting_for_ack() {
                        let elapsed = self.state.time_since_ping();
                        if elapsed >= self.config.pong_timeout {
                            tracing::warn!(
                                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                                timeout_ms = u64::try_from(self.config.pong_timeout.as_millis())
                                    .unwrap_or(u64::MAX),
                                "heartbeat timeout detected"
                            );
                            let _ = self.event_tx.send(HeartbeatEvent::Timeout(elapsed)).await;
                            break;
                        }
                    }

                    if Instant::now() >= next_ping {
                        next_ping = Instant::now() + self.config.ping_interval;
                        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
                            tracing::debug!("event channel closed, stopping heartbeat");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.pong_timeout, Duration::from_secs(20));
        assert_eq!(config.check_interval(), Duration::from_secs(10));
    }

    #[test]
    fn state_ack_clears_waiting() {
        let state = HeartbeatState::new();
        state.mark_ping_sent();
        assert!(state.is_waiting_for_ack());

        state.record_ack();
        assert!(!state.is_waiting_for_ack());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_pings_keep_oldest_send_time() {
        let state = HeartbeatState::new();
        state.mark_ping_sent();
        tokio::time::advance(Duration::from_secs(5)).await;
        state.mark_ping_sent();

        assert_eq!(state.time_since_ping(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn manager_requests_pings_on_interval() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(20));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state.clone(), event_tx, cancel.clone()).run(),
        );

        let started = Instant::now();
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event, HeartbeatEvent::SendPing);
        assert!(started.elapsed() >= Duration::from_secs(10));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manager_detects_silent_peer() {
        let config = HeartbeatConfig::new(Duration::from_secs(1), Duration::from_secs(3));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state.clone(), event_tx, cancel.clone()).run(),
        );

        let mut saw_timeout = false;
        while let Some(event) = event_rx.recv().await {
            match event {
                HeartbeatEvent::SendPing => state.mark_ping_sent(),
                HeartbeatEvent::Timeout(elapsed) => {
                    assert!(elapsed >= Duration::from_secs(3));
                    saw_timeout = true;
                    break;
                }
            }
        }

        assert!(saw_timeout, "silent peer should time out");
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_pings_never_time_out() {
        let config = HeartbeatConfig::new(Duration::from_secs(1), Duration::from_secs(2));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state.clone(), event_tx, cancel.clone()).run(),
        );

        for _ in 0..10 {
            let event = event_rx.recv().await.unwrap();
            assert_eq!(event, HeartbeatEvent::SendPing);
            state.mark_ping_sent();
            state.record_ack();
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn manager_cancellation() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let (event_tx, _event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, Arc::new(HeartbeatState::new()), event_tx, cancel.clone())
                .run(),
        );
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "manager should shut down on cancellation");
    }
}
