//! In-process bus hub.
//!
//! Mirrors the relay's fan-out semantics (pattern subscriptions, echo to
//! the publisher, at-most-once delivery) without a network. Each
//! [`MemoryBusClient`] can be taken offline to exercise reconnect paths.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use pulse_common::topic_matches;

use super::types::{Bus, BusEvent};

const EVENT_CAPACITY: usize = 256;
const MAX_HELD: usize = 512;

struct Subscriber {
    tx: mpsc::Sender<BusEvent>,
    patterns: BTreeSet<String>,
    online: bool,
    held: VecDeque<(String, serde_json::Value)>,
}

#[derive(Default)]
struct Hub {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

impl Hub {
    fn deliver(&mut self, topic: &str, payload: &serde_json::Value) {
        let mut closed = Vec::new();
        for (id, sub) in &self.subscribers {
            if !sub.online || !sub.patterns.iter().any(|p| topic_matches(p, topic)) {
                continue;
            }
            let event = BusEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            match sub.tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, topic = %topic, "Subscriber queue full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            debug!(subscriber = id, "Removing closed subscriber");
            self.subscribers.remove(&id);
        }
    }
}

/// Shared in-memory hub. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct MemoryBus {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new client. It starts online and immediately receives
    /// [`BusEvent::Connected`].
    pub fn connect(&self) -> (MemoryBusClient, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let _ = tx.try_send(BusEvent::Connected);
        let mut hub = lock(&self.hub);
        let id = hub.next_id;
        hub.next_id += 1;
        hub.subscribers.insert(
            id,
            Subscriber {
                tx,
                patterns: BTreeSet::new(),
                online: true,
                held: VecDeque::new(),
            },
        );
        (
            MemoryBusClient {
                id,
                hub: Arc::clone(&self.hub),
            },
            rx,
        )
    }

    /// Publish from outside any client, as a remote participant would.
    pub fn inject(&self, topic: &str, payload: serde_json::Value) {
        lock(&self.hub).deliver(topic, &payload);
    }

    /// Number of attached clients.
    pub fn client_count(&self) -> usize {
        lock(&self.hub).subscribers.len()
    }
}

/// One client attached to a [`MemoryBus`]. Detaches on drop.
pub struct MemoryBusClient {
    id: u64,
    hub: Arc<Mutex<Hub>>,
}

impl MemoryBusClient {
    /// Simulate losing or regaining the link. Publishes made while offline
    /// are held and flushed in order when the client comes back.
    pub fn set_online(&self, online: bool) {
        let mut hub = lock(&self.hub);
        let Some(sub) = hub.subscribers.get_mut(&self.id) else {
            return;
        };
        if sub.online == online {
            return;
        }
        sub.online = online;
        let event = if online {
            BusEvent::Connected
        } else {
            BusEvent::Disconnected
        };
        let _ = sub.tx.try_send(event);
        if online {
            let held: Vec<_> = sub.held.drain(..).collect();
            for (topic, payload) in held {
                hub.deliver(&topic, &payload);
            }
        }
    }

    pub fn is_online(&self) -> bool {
        lock(&self.hub)
            .subscribers
            .get(&self.id)
            .is_some_and(|sub| sub.online)
    }
}

impl Bus for MemoryBusClient {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        let mut hub = lock(&self.hub);
        if let Some(sub) = hub.subscribers.get_mut(&self.id) {
            if !sub.online {
                if sub.held.len() >= MAX_HELD {
                    sub.held.pop_front();
                }
                sub.held.push_back((topic.to_string(), payload));
                return;
            }
        }
        hub.deliver(topic, &payload);
    }

    fn subscribe(&self, pattern: &str) {
        if let Some(sub) = lock(&self.hub).subscribers.get_mut(&self.id) {
            sub.patterns.insert(pattern.to_string());
        }
    }

    fn unsubscribe(&self, pattern: &str) {
        if let Some(sub) = lock(&self.hub).subscribers.get_mut(&self.id) {
            sub.patterns.remove(pattern);
        }
    }
}

impl Drop for MemoryBusClient {
    fn drop(&mut self) {
        lock(&self.hub).subscribers.remove(&self.id);
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn next_message(rx: &mut mpsc::Receiver<BusEvent>) -> (String, serde_json::Value) {
        loop {
            match rx.recv().await {
                Some(BusEvent::Message { topic, payload }) => return (topic, payload),
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    }

    #[tokio::test]
    async fn fan_out_respects_patterns_and_echoes() {
        let bus = MemoryBus::new();
        let (a, mut a_rx) = bus.connect();
        let (b, mut b_rx) = bus.connect();
        a.subscribe("room/+/presence");
        b.subscribe("room/#");

        a.publish("room/1/presence", json!({"n": 1}));
        assert_eq!(next_message(&mut a_rx).await.1, json!({"n": 1}));
        assert_eq!(next_message(&mut b_rx).await.0, "room/1/presence");

        b.publish("room/1/signal/x", json!({"n": 2}));
        assert_eq!(next_message(&mut b_rx).await.1, json!({"n": 2}));
        assert!(matches!(a_rx.try_recv(), Err(_)));
    }

    #[tokio::test]
    async fn offline_publishes_are_held_and_flushed() {
        let bus = MemoryBus::new();
        let (a, _a_rx) = bus.connect();
        let (b, mut b_rx) = bus.connect();
        b.subscribe("t");
        assert_eq!(b_rx.recv().await, Some(BusEvent::Connected));

        a.set_online(false);
        a.publish("t", json!(1));
        a.publish("t", json!(2));
        assert!(b_rx.try_recv().is_err());

        a.set_online(true);
        assert_eq!(next_message(&mut b_rx).await.1, json!(1));
        assert_eq!(next_message(&mut b_rx).await.1, json!(2));
    }

    #[tokio::test]
    async fn offline_client_misses_messages() {
        let bus = MemoryBus::new();
        let (a, mut a_rx) = bus.connect();
        a.subscribe("t");
        a.set_online(false);
        bus.inject("t", json!("lost"));
        a.set_online(true);
        bus.inject("t", json!("seen"));

        assert_eq!(a_rx.recv().await, Some(BusEvent::Connected));
        assert_eq!(a_rx.recv().await, Some(BusEvent::Disconnected));
        assert_eq!(a_rx.recv().await, Some(BusEvent::Connected));
        assert_eq!(next_message(&mut a_rx).await.1, json!("seen"));
    }

    #[test]
    fn dropping_client_detaches() {
        let bus = MemoryBus::new();
        let (a, _rx) = bus.connect();
        assert_eq!(bus.client_count(), 1);
        drop(a);
        assert_eq!(bus.client_count(), 0);
    }
}
