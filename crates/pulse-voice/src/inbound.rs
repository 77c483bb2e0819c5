//! Translates raw bus events into typed presence and signaling streams.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulse_common::ParticipantId;

use crate::bus::BusEvent;
use crate::protocol::{PresenceEvent, SignalingEnvelope, TopicKind, Topics};

/// Typed inbound streams for one channel.
pub struct Inbound {
    pub presence: mpsc::Receiver<PresenceEvent>,
    pub signals: mpsc::Receiver<SignalingEnvelope>,
}

/// Spawn the translator task. It ends when the bus event stream closes or
/// both typed receivers are dropped.
pub fn spawn_translator(
    mut bus_rx: mpsc::Receiver<BusEvent>,
    topics: Topics,
    local: ParticipantId,
) -> (Inbound, JoinHandle<()>) {
    let (presence_tx, presence_rx) = mpsc::channel(128);
    let (signal_tx, signal_rx) = mpsc::channel(256);

    let handle = tokio::spawn(async move {
        while let Some(event) = bus_rx.recv().await {
            if presence_tx.is_closed() && signal_tx.is_closed() {
                break;
            }
            match event {
                BusEvent::Connected => {
                    info!(channel = %topics.channel(), "Bus connected");
                }
                BusEvent::Disconnected => {
                    warn!(channel = %topics.channel(), "Bus disconnected, waiting for reconnect");
                }
                BusEvent::Error(message) => {
                    warn!(error = %message, "Bus error");
                }
                BusEvent::Message { topic, payload } => {
                    translate(&topics, &local, &topic, payload, &presence_tx, &signal_tx).await;
                }
            }
        }
        debug!("Inbound translator stopped");
    });

    (
        Inbound {
            presence: presence_rx,
            signals: signal_rx,
        },
        handle,
    )
}

async fn translate(
    topics: &Topics,
    local: &ParticipantId,
    topic: &str,
    payload: serde_json::Value,
    presence_tx: &mpsc::Sender<PresenceEvent>,
    signal_tx: &mpsc::Sender<SignalingEnvelope>,
) {
    match topics.classify(topic) {
        Some(TopicKind::Presence) => match serde_json::from_value::<PresenceEvent>(payload) {
            Ok(event) => {
                let _ = presence_tx.send(event).await;
            }
            Err(e) => debug!(topic = %topic, error = %e, "Ignoring malformed presence event"),
        },
        Some(TopicKind::Signal { to }) => {
            if &to != local {
                debug!(topic = %topic, "Ignoring signal addressed to another participant");
                return;
            }
            match SignalingEnvelope::from_wire(payload) {
                Ok(envelope) => {
                    let _ = signal_tx.send(envelope).await;
                }
                Err(e) => debug!(topic = %topic, error = %e, "Ignoring malformed signal"),
            }
        }
        None => debug!(topic = %topic, "Ignoring message on unrelated topic"),
    }
}
