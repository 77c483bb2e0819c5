//! Media seams.
//!
//! Capture, the peer transport, and audio output live on the platform side
//! (a browser engine, a native WebRTC stack, or test fakes). The mesh only
//! sees these traits. Transports report back asynchronously through a
//! [`PeerEventSink`], which is tagged with the registry key of the
//! connection it belongs to so events from torn-down connections can be
//! recognised and ignored.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pulse_common::{MediaError, ParticipantId, VoiceError};

use crate::peer::SlotKey;

/// Anything a speaking detector can sample.
pub trait AmplitudeSource: Send + Sync {
    /// Fill `window` with frequency-bin magnitudes on a 0-255 scale.
    fn read_magnitudes(&self, window: &mut [f32]);
}

/// The local capture stream.
pub trait LocalStream: AmplitudeSource {
    /// Enable or disable outgoing audio without releasing the device.
    fn set_enabled(&self, enabled: bool);
    /// Release the device. Called once when the session ends.
    fn stop(&self);
}

pub type LocalMedia = Arc<dyn LocalStream>;

/// Audio received from one peer.
pub trait RemoteStream: AmplitudeSource {}

pub type RemoteMedia = Arc<dyn RemoteStream>;

/// Acquires the local microphone.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture(&self) -> Result<LocalMedia, MediaError>;
}

/// Creates peer connections.
pub trait MediaTransport: Send + Sync {
    /// Open a connection to `peer`. An initiator starts negotiation on its
    /// own by emitting a local signal through `events`. `local` is `None`
    /// when capture is unavailable; the connection is then receive-only.
    fn create_connection(
        &self,
        peer: &ParticipantId,
        is_initiator: bool,
        local: Option<LocalMedia>,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerTransport>, VoiceError>;
}

/// One negotiated (or negotiating) connection.
pub trait PeerTransport: Send {
    /// Apply a signal received from the remote side.
    fn apply_signal(&mut self, payload: serde_json::Value) -> Result<(), VoiceError>;
    /// Tear down. Must be idempotent.
    fn close(&mut self);
}

/// Plays remote audio.
pub trait AudioOutput: Send + Sync {
    fn attach(&self, peer: &ParticipantId, stream: RemoteMedia) -> Box<dyn AudioSink>;
}

/// One attached playback sink.
pub trait AudioSink: Send {
    /// 0.0 silences, 1.0 is full volume.
    fn set_volume(&mut self, volume: f32);
    fn detach(&mut self);
}

// ---------------------------------------------------------------------------
// Transport events
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) enum TransportEventKind {
    LocalSignal(serde_json::Value),
    RemoteStream(RemoteMedia),
    Error(String),
}

impl std::fmt::Debug for TransportEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalSignal(payload) => f.debug_tuple("LocalSignal").field(payload).finish(),
            Self::RemoteStream(_) => f.write_str("RemoteStream"),
            Self::Error(reason) => f.debug_tuple("Error").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TransportEvent {
    pub(crate) key: SlotKey,
    pub(crate) peer: ParticipantId,
    pub(crate) kind: TransportEventKind,
}

/// Callback handle given to a [`PeerTransport`]. Events sent after the
/// connection is closed are dropped by the session.
#[derive(Clone)]
pub struct PeerEventSink {
    peer: ParticipantId,
    key: SlotKey,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerEventSink {
    pub(crate) fn new(
        peer: ParticipantId,
        key: SlotKey,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self { peer, key, tx }
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    /// A negotiation message to relay to the remote side.
    pub fn local_signal(&self, payload: serde_json::Value) {
        self.emit(TransportEventKind::LocalSignal(payload));
    }

    /// The remote side's audio is available.
    pub fn remote_stream(&self, stream: RemoteMedia) {
        self.emit(TransportEventKind::RemoteStream(stream));
    }

    /// Negotiation or the connection failed.
    pub fn error(&self, reason: impl Into<String>) {
        self.emit(TransportEventKind::Error(reason.into()));
    }

    fn emit(&self, kind: TransportEventKind) {
        let _ = self.tx.send(TransportEvent {
            key: self.key,
            peer: self.peer.clone(),
            kind,
        });
    }
}

impl std::fmt::Debug for PeerEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEventSink")
            .field("peer", &self.peer)
            .field("key", &self.key)
            .finish()
    }
}
