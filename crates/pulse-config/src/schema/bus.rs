//! Publish/subscribe bus connection settings.

use serde::{Deserialize, Serialize};

/// Bus client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// WebSocket URL of the relay.
    pub url: String,
    /// Prefix for every voice topic (`<scope>/presence/...`, `<scope>/signal/...`).
    pub topic_scope: String,
    /// Connect attempt timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Base reconnect delay in seconds; doubles up to the maximum.
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    /// Publishes held while disconnected. Oldest are dropped past this.
    pub max_queued: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".into(),
            topic_scope: "pulse/dev/voice".into(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            max_queued: 512,
        }
    }
}
