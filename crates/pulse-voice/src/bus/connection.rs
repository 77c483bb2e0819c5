//! Background WebSocket connection loop with auto-reconnect.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use pulse_common::ClientFrame;

use super::handler::handle_relay_text;
use super::types::{BusClientConfig, BusCommand, BusEvent};

// ---------------------------------------------------------------------------
// Link State
// ---------------------------------------------------------------------------

/// State that survives reconnects: the subscription set and publishes held
/// while offline.
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    pub(crate) subscriptions: BTreeSet<String>,
    pub(crate) outbox: VecDeque<(String, serde_json::Value)>,
}

impl LinkState {
    /// Hold a publish until the next connect. Drops the oldest past `max`.
    pub(crate) fn queue(&mut self, topic: String, payload: serde_json::Value, max: usize) {
        if self.outbox.len() >= max {
            if let Some((dropped, _)) = self.outbox.pop_front() {
                warn!(topic = %dropped, max, "Bus outbox full, dropping oldest publish");
            }
        }
        self.outbox.push_back((topic, payload));
    }

    /// Apply a command while offline. Returns `false` on disconnect.
    pub(crate) fn apply_offline(&mut self, command: BusCommand, max: usize) -> bool {
        match command {
            BusCommand::Subscribe { pattern } => {
                self.subscriptions.insert(pattern);
            }
            BusCommand::Unsubscribe { pattern } => {
                self.subscriptions.remove(&pattern);
            }
            BusCommand::Publish { topic, payload } => self.queue(topic, payload, max),
            BusCommand::Disconnect => return false,
        }
        true
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the relay connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: BusClientConfig,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<BusEvent>,
    mut command_rx: mpsc::UnboundedReceiver<BusCommand>,
) {
    let mut state = LinkState::default();
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        info!(url = %config.url, client_id = %config.client_id, "Connecting to relay");

        match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                let end = run_session(
                    ws_stream,
                    &config,
                    &mut state,
                    &connected,
                    &event_tx,
                    &mut command_rx,
                )
                .await;
                let was_connected = connected.swap(false, Ordering::AcqRel);
                if was_connected {
                    let _ = event_tx.send(BusEvent::Disconnected).await;
                }
                if end == SessionEnd::Shutdown {
                    info!("Bus client disconnected");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to relay");
                let _ = event_tx
                    .send(BusEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                let secs = config.connect_timeout.as_secs();
                error!(timeout_secs = secs, "Relay connection timed out");
                let _ = event_tx
                    .send(BusEvent::Error(format!(
                        "Connection timed out after {secs}s"
                    )))
                    .await;
            }
        }

        // Exponential backoff reconnect, still accepting commands.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        if !wait_offline(
            &mut state,
            &mut command_rx,
            Duration::from_secs(reconnect_delay),
            config.max_queued,
        )
        .await
        {
            info!("Bus client disconnected while offline");
            return;
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

/// Sleep out the backoff delay while folding commands into `state`.
/// Returns `false` if the client asked to disconnect.
async fn wait_offline(
    state: &mut LinkState,
    command_rx: &mut mpsc::UnboundedReceiver<BusCommand>,
    delay: Duration,
    max_queued: usize,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = command_rx.recv() => match command {
                Some(command) => {
                    if !state.apply_offline(command, max_queued) {
                        return false;
                    }
                }
                None => return false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn run_session<S>(
    ws_stream: S,
    config: &BusClientConfig,
    state: &mut LinkState,
    connected: &AtomicBool,
    event_tx: &mpsc::Sender<BusEvent>,
    command_rx: &mut mpsc::UnboundedReceiver<BusCommand>,
) -> SessionEnd
where
    S: Sink<WsMessage>
        + futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let hello = ClientFrame::Hello {
        client_id: config.client_id.clone(),
    };
    if !send_frame(&mut ws_write, &hello).await {
        return SessionEnd::Lost;
    }

    // Re-subscribe everything, then flush held publishes in order.
    for pattern in &state.subscriptions {
        let frame = ClientFrame::Subscribe {
            pattern: pattern.clone(),
        };
        if !send_frame(&mut ws_write, &frame).await {
            return SessionEnd::Lost;
        }
    }
    while let Some((topic, payload)) = state.outbox.pop_front() {
        let frame = ClientFrame::Publish { topic, payload };
        if !send_frame(&mut ws_write, &frame).await {
            if let ClientFrame::Publish { topic, payload } = frame {
                state.outbox.push_front((topic, payload));
            }
            return SessionEnd::Lost;
        }
    }

    connected.store(true, Ordering::Release);
    let _ = event_tx.send(BusEvent::Connected).await;
    info!(
        subscriptions = state.subscriptions.len(),
        "Connected to relay"
    );

    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + config.keepalive,
        config.keepalive,
    );

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    let _ = ws_write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                match command {
                    BusCommand::Subscribe { pattern } => {
                        state.subscriptions.insert(pattern.clone());
                        if !send_frame(&mut ws_write, &ClientFrame::Subscribe { pattern }).await {
                            return SessionEnd::Lost;
                        }
                    }
                    BusCommand::Unsubscribe { pattern } => {
                        state.subscriptions.remove(&pattern);
                        if !send_frame(&mut ws_write, &ClientFrame::Unsubscribe { pattern }).await {
                            return SessionEnd::Lost;
                        }
                    }
                    BusCommand::Publish { topic, payload } => {
                        let frame = ClientFrame::Publish { topic, payload };
                        if !send_frame(&mut ws_write, &frame).await {
                            if let ClientFrame::Publish { topic, payload } = frame {
                                state.queue(topic, payload, config.max_queued);
                            }
                            return SessionEnd::Lost;
                        }
                    }
                    BusCommand::Disconnect => {
                        let _ = ws_write.send(WsMessage::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
            incoming = ws_read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    handle_relay_text(text.as_str(), event_tx).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Relay closed connection");
                    return SessionEnd::Lost;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
            },
            _ = keepalive.tick() => {
                if ws_write.send(WsMessage::Ping(Default::default())).await.is_err() {
                    debug!("Keepalive ping failed");
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

/// Serialize and send one frame. Returns `false` if the link is gone.
async fn send_frame<W>(ws_write: &mut W, frame: &ClientFrame) -> bool
where
    W: Sink<WsMessage> + Unpin,
{
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to encode bus frame");
            return true;
        }
    };
    ws_write.send(WsMessage::Text(json.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbox_drops_oldest_when_full() {
        let mut state = LinkState::default();
        for i in 0..4 {
            state.queue(format!("t/{i}"), json!(i), 3);
        }
        let topics: Vec<_> = state.outbox.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(topics, vec!["t/1", "t/2", "t/3"]);
    }

    #[test]
    fn offline_commands_update_subscriptions() {
        let mut state = LinkState::default();
        assert!(state.apply_offline(
            BusCommand::Subscribe {
                pattern: "a/#".into()
            },
            8
        ));
        assert!(state.apply_offline(
            BusCommand::Subscribe {
                pattern: "b/+".into()
            },
            8
        ));
        assert!(state.apply_offline(
            BusCommand::Unsubscribe {
                pattern: "a/#".into()
            },
            8
        ));
        assert_eq!(
            state.subscriptions.iter().collect::<Vec<_>>(),
            vec!["b/+"]
        );
        assert!(!state.apply_offline(BusCommand::Disconnect, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_offline_returns_false_on_disconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = LinkState::default();
        tx.send(BusCommand::Publish {
            topic: "t".into(),
            payload: json!(1),
        })
        .unwrap();
        tx.send(BusCommand::Disconnect).unwrap();
        let keep_going =
            wait_offline(&mut state, &mut rx, Duration::from_secs(30), 8).await;
        assert!(!keep_going);
        assert_eq!(state.outbox.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_offline_elapses() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut state = LinkState::default();
        assert!(wait_offline(&mut state, &mut rx, Duration::from_secs(2), 8).await);
    }
}
