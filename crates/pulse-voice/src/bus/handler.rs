//! Incoming relay frame handler.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use pulse_common::RelayFrame;

use super::types::BusEvent;

/// Handle a single text frame from the relay.
///
/// Unparseable frames are logged and skipped; they never tear down the
/// connection.
pub(crate) async fn handle_relay_text(text: &str, event_tx: &mpsc::Sender<BusEvent>) {
    let frame = match serde_json::from_str::<RelayFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Unrecognized frame from relay");
            return;
        }
    };

    match frame {
        RelayFrame::Ready { client_id } => {
            debug!(client_id = %client_id, "Relay acknowledged hello");
        }
        RelayFrame::Message { topic, payload } => {
            let _ = event_tx.send(BusEvent::Message { topic, payload }).await;
        }
        RelayFrame::Error { message } => {
            warn!(message = %message, "Relay reported an error");
            let _ = event_tx.send(BusEvent::Error(message)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn message_frame_becomes_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let text = json!({
            "type": "message",
            "topic": "pulse/dev/voice/presence/gaming",
            "payload": {"type": "join", "id": "a1"}
        })
        .to_string();
        handle_relay_text(&text, &tx).await;
        match rx.recv().await {
            Some(BusEvent::Message { topic, payload }) => {
                assert_eq!(topic, "pulse/dev/voice/presence/gaming");
                assert_eq!(payload["id"], "a1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_frame_becomes_error_event() {
        let (tx, mut rx) = mpsc::channel(4);
        handle_relay_text(r#"{"type":"error","message":"bad pattern"}"#, &tx).await;
        assert_eq!(rx.recv().await, Some(BusEvent::Error("bad pattern".into())));
    }

    #[tokio::test]
    async fn ready_and_garbage_emit_nothing() {
        let (tx, mut rx) = mpsc::channel(4);
        handle_relay_text(r#"{"type":"ready","client_id":"pulse_x"}"#, &tx).await;
        handle_relay_text("not json", &tx).await;
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
