//! Client Fan-out Hub
//!
//! Holds one bounded outbound queue per connected client. Frames are
//! shared as `Arc<ServerFrame>` so a tick fanned out to many clients is
//! serialized per client but allocated once.
//!
//! Delivery never waits: a client whose queue is full misses that frame
//! (counted in `relay_frames_dropped_total`) while every other client
//! still receives it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::subscription::ClientId;
use crate::infrastructure::gateway::protocol::ServerFrame;
use crate::infrastructure::metrics;

/// Default per-client queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Receiving half of a client queue.
pub type ClientReceiver = mpsc::Receiver<Arc<ServerFrame>>;

/// Result of delivering a frame to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued.
    Queued,
    /// Dropped because the client's queue is full.
    Dropped,
    /// The client is gone.
    Closed,
}

/// Outbound queues keyed by client.
#[derive(Debug)]
pub struct ClientHub {
    capacity: usize,
    clients: RwLock<HashMap<ClientId, mpsc::Sender<Arc<ServerFrame>>>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ClientHub {
    /// Create a hub with the given per-client queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clients: RwLock::new(HashMap::new()),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open a queue for `client`, replacing any previous one.
    pub fn register(&self, client: ClientId) -> ClientReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        let count = {
            let mut clients = self.clients.write();
            clients.insert(client, tx);
            clients.len()
        };
        metrics::set_connected_clients(count);
        rx
    }

    /// Close the queue for `client`.
    pub fn remove(&self, client: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.write();
            let removed = clients.remove(&client).is_some();
            (removed, clients.len())
        };
        metrics::set_connected_clients(count);
        removed
    }

    /// Queue `frame` for one client.
    pub fn send_to(&self, client: ClientId, frame: Arc<ServerFrame>) -> Delivery {
        let sender = self.clients.read().get(&client).cloned();
        match sender {
            Some(sender) => self.deliver(client, &sender, frame),
            None => Delivery::Closed,
        }
    }

    /// Queue `frame` for each of `clients`. Returns how many accepted it.
    pub fn send_to_many<'a>(
        &self,
        clients: impl IntoIterator<Item = &'a ClientId>,
        frame: &Arc<ServerFrame>,
    ) -> usize {
        let senders: Vec<(ClientId, mpsc::Sender<Arc<ServerFrame>>)> = {
            let map = self.clients.read();
            clients
                .into_iter()
                .filter_map(|id| map.get(id).map(|tx| (*id, tx.clone())))
                .collect()
        };

        senders
            .iter()
            .filter(|(id, tx)| self.deliver(*id, tx, Arc::clone(frame)) == Delivery::Queued)
            .count()
    }

    /// Queue `frame` for every client. Returns how many accepted it.
    pub fn broadcast(&self, frame: &Arc<ServerFrame>) -> usize {
        let senders: Vec<(ClientId, mpsc::Sender<Arc<ServerFrame>>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        senders
            .iter()
            .filter(|(id, tx)| self.deliver(*id, tx, Arc::clone(frame)) == Delivery::Queued)
            .count()
    }

    fn deliver(
        &self,
        client: ClientId,
        sender: &mpsc::Sender<Arc<ServerFrame>>,
        frame: Arc<ServerFrame>,
    ) -> Delivery {
        let kind = frame.kind();
        match sender.try_send(frame) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                metrics::record_frame_sent(kind);
                Delivery::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_frame_dropped(kind);
                tracing::warn!(client, kind, "client queue full, dropping frame");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            clients: self.client_count(),
            frames_sent: self.sent.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Shared hub reference.
pub type SharedClientHub = Arc<ClientHub>;

/// Fan-out statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Connected clients.
    pub clients: usize,
    /// Frames queued since start.
    pub frames_sent: u64,
    /// Frames dropped on full queues since start.
    pub frames_dropped: u64,
}

// =============================================================================
// Tests
// =============================================================================
