//! Subscription table: maps connections to topic patterns and fans out
//! publishes to every matching subscriber.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pulse_common::{topic_matches, RelayFrame};
use tokio::sync::{mpsc, RwLock};

/// Identifies one WebSocket connection for its lifetime.
pub type ConnId = u64;

struct Subscriber {
    client_id: String,
    tx: mpsc::Sender<String>,
    patterns: BTreeSet<String>,
}

/// Thread-safe subscription table.
#[derive(Clone, Default)]
pub struct Broker {
    subscribers: Arc<RwLock<HashMap<ConnId, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel.
    pub async fn register(&self, client_id: &str, tx: mpsc::Sender<String>) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                client_id: client_id.to_string(),
                tx,
                patterns: BTreeSet::new(),
            },
        );
        id
    }

    pub async fn subscribe(&self, conn: ConnId, pattern: &str) {
        if let Some(sub) = self.subscribers.write().await.get_mut(&conn) {
            sub.patterns.insert(pattern.to_string());
        }
    }

    pub async fn unsubscribe(&self, conn: ConnId, pattern: &str) {
        if let Some(sub) = self.subscribers.write().await.get_mut(&conn) {
            sub.patterns.remove(pattern);
        }
    }

    /// Deliver `payload` to every connection with a pattern matching
    /// `topic`, the publisher included. Returns the number of deliveries.
    ///
    /// Delivery is at-most-once: a subscriber whose queue is full misses
    /// the message.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> usize {
        let frame = RelayFrame::Message {
            topic: topic.to_string(),
            payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(topic, error = %e, "Failed to encode message frame");
                return 0;
            }
        };

        let map = self.subscribers.read().await;
        let mut delivered = 0;
        for sub in map.values() {
            if !sub.patterns.iter().any(|p| topic_matches(p, topic)) {
                continue;
            }
            match sub.tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client = %sub.client_id, topic, "Subscriber queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(client = %sub.client_id, "Subscriber channel closed");
                }
            }
        }
        delivered
    }

    /// Remove a connection and all of its subscriptions.
    pub async fn unregister(&self, conn: ConnId) -> bool {
        self.subscribers.write().await.remove(&conn).is_some()
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
