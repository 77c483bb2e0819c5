//! Bus wire protocol shared by the relay and its clients.
//!
//! Frames are JSON text messages tagged by `type`. Payloads are opaque
//! to the relay; it only looks at topics.

use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame on a connection.
    Hello { client_id: String },
    Subscribe { pattern: String },
    Unsubscribe { pattern: String },
    Publish {
        topic: String,
        payload: serde_json::Value,
    },
}

/// Frames the relay sends back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    Ready { client_id: String },
    Message {
        topic: String,
        payload: serde_json::Value,
    },
    Error { message: String },
}

/// MQTT-style topic matching over `/`-separated levels.
///
/// `+` matches exactly one level, `#` (only as the last level) matches
/// the remainder including zero levels.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pat = pattern.split('/');
    let mut top = topic.split('/');
    loop {
        match (pat.next(), top.next()) {
            (Some("#"), _) => return pat.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
