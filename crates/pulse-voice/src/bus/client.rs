//! Public handle for interacting with the relay connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::connection::connection_loop;
use super::types::{Bus, BusClientConfig, BusCommand, BusEvent};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the relay connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task. Cloning yields another handle onto the same connection.
#[derive(Clone)]
pub struct BusClient {
    command_tx: mpsc::UnboundedSender<BusCommand>,
    connected: Arc<AtomicBool>,
}

impl BusClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: BusClientConfig) -> (Self, mpsc::Receiver<BusEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    /// Check if the relay connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(BusCommand::Disconnect);
    }

    fn send(&self, command: BusCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::debug!("Bus connection task has stopped; command dropped");
        }
    }
}

impl Bus for BusClient {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        self.send(BusCommand::Publish {
            topic: topic.to_string(),
            payload,
        });
    }

    fn subscribe(&self, pattern: &str) {
        self.send(BusCommand::Subscribe {
            pattern: pattern.to_string(),
        });
    }

    fn unsubscribe(&self, pattern: &str) {
        self.send(BusCommand::Unsubscribe {
            pattern: pattern.to_string(),
        });
    }
}
