//! Configuration, the [`Bus`] seam, and event/command enums for the bus client.

use std::time::Duration;

use pulse_config::schema::BusConfig;

// ---------------------------------------------------------------------------
// Bus trait
// ---------------------------------------------------------------------------

/// Topic-based publish/subscribe transport.
///
/// Delivery is at-most-once and unordered across topics. All calls are
/// non-blocking; failures surface as [`BusEvent`]s on the receiver returned
/// when the client was created.
pub trait Bus: Send + Sync {
    fn publish(&self, topic: &str, payload: serde_json::Value);
    fn subscribe(&self, pattern: &str);
    fn unsubscribe(&self, pattern: &str);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`super::BusClient`].
#[derive(Debug, Clone)]
pub struct BusClientConfig {
    /// Relay WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Sent in the `hello` frame.
    pub client_id: String,
    pub connect_timeout: Duration,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    /// Publishes held while disconnected. Oldest are dropped past this.
    pub max_queued: usize,
    /// Keepalive ping period while connected.
    pub keepalive: Duration,
}

impl Default for BusClientConfig {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for BusClientConfig {
    fn from(config: &BusConfig) -> Self {
        Self {
            url: config.url.clone(),
            client_id: pulse_common::new_client_id(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
            max_queued: config.max_queued,
            keepalive: Duration::from_secs(20),
        }
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by a bus client.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Connection to the relay established (or re-established).
    Connected,
    /// Connection lost. Publishes are held until the next `Connected`.
    Disconnected,
    /// A message arrived on a subscribed topic.
    Message {
        topic: String,
        payload: serde_json::Value,
    },
    Error(String),
}

/// Commands sent from the handle to the connection task.
#[derive(Debug)]
pub(crate) enum BusCommand {
    Subscribe { pattern: String },
    Unsubscribe { pattern: String },
    Publish {
        topic: String,
        payload: serde_json::Value,
    },
    Disconnect,
}
