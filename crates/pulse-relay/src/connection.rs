//! Per-connection handler: read hello, register, then forward frames.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pulse_common::{ClientFrame, RelayFrame};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broker::{Broker, ConnId};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 256;

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    broker: Broker,
    hello_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    let client_id = match read_hello(&mut stream, addr, hello_timeout).await {
        Some(id) => id,
        None => {
            let _ = send_frame(
                &mut sink,
                &RelayFrame::Error {
                    message: "expected hello".into(),
                },
            )
            .await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let conn = broker.register(&client_id, tx).await;
    tracing::info!(peer = %addr, client = %client_id, "Client registered");

    if send_frame(
        &mut sink,
        &RelayFrame::Ready {
            client_id: client_id.clone(),
        },
    )
    .await
    .is_err()
    {
        broker.unregister(conn).await;
        return;
    }

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(message) = handle_frame(&broker, conn, &client_id, &text).await {
                            if send_frame(&mut sink, &RelayFrame::Error { message }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, client = %client_id, "Client disconnected");
    broker.unregister(conn).await;
}

/// Apply one client frame. Errors are reported back to the client.
async fn handle_frame(
    broker: &Broker,
    conn: ConnId,
    client_id: &str,
    text: &str,
) -> Result<(), String> {
    let frame: ClientFrame =
        serde_json::from_str(text).map_err(|e| format!("invalid frame: {e}"))?;
    match frame {
        ClientFrame::Hello { .. } => return Err("duplicate hello".into()),
        ClientFrame::Subscribe { pattern } => {
            tracing::debug!(client = %client_id, %pattern, "Subscribe");
            broker.subscribe(conn, &pattern).await;
        }
        ClientFrame::Unsubscribe { pattern } => {
            tracing::debug!(client = %client_id, %pattern, "Unsubscribe");
            broker.unsubscribe(conn, &pattern).await;
        }
        ClientFrame::Publish { topic, payload } => {
            if topic.contains(['+', '#']) {
                return Err(format!("wildcards not allowed in publish topic: {topic}"));
            }
            let delivered = broker.publish(&topic, payload).await;
            tracing::trace!(client = %client_id, %topic, delivered, "Publish");
        }
    }
    Ok(())
}

/// Read and parse the first frame as a hello.
async fn read_hello(
    stream: &mut WsStream,
    addr: SocketAddr,
    hello_timeout: Duration,
) -> Option<String> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Hello { client_id }) if !client_id.is_empty() => Some(client_id),
            Ok(other) => {
                tracing::warn!(peer = %addr, frame = ?other, "First frame was not a hello");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid hello message");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text hello, got binary");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during hello");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before hello");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout = ?hello_timeout, "Hello timeout");
            None
        }
    }
}

async fn send_frame(
    sink: &mut WsSink,
    frame: &RelayFrame,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = serde_json::to_string(frame).map_err(|e| {
        tokio_tungstenite::tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e,
        ))
    })?;
    sink.send(Message::Text(json.into())).await
}
