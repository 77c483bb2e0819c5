use serde::{Deserialize, Serialize};

/// Configuration for the bundled pub/sub relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Seconds a new connection has to send its hello frame.
    pub hello_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            hello_timeout_secs: 10,
        }
    }
}
