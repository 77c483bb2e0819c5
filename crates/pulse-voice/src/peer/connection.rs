use std::collections::VecDeque;

use tracing::{debug, warn};

use pulse_common::{ParticipantId, VoiceError};

use crate::media::{AudioSink, PeerTransport};
use crate::speaking::{SamplerGuard, SamplerId};

use super::types::{PeerSnapshot, PeerState};

/// What happened to an inbound signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    Applied,
    /// Held until the transport exists.
    Buffered,
}

/// One connection to a remote participant.
pub struct PeerConnection {
    peer: ParticipantId,
    state: PeerState,
    is_initiator: bool,
    transport: Option<Box<dyn PeerTransport>>,
    audio_sink: Option<Box<dyn AudioSink>>,
    sampler: Option<SamplerGuard>,
    pending_envelopes: VecDeque<serde_json::Value>,
    max_pending: usize,
    signal_received: bool,
}

impl PeerConnection {
    pub fn new(peer: ParticipantId, is_initiator: bool, max_pending: usize) -> Self {
        Self {
            peer,
            state: PeerState::Pending,
            is_initiator,
            transport: None,
            audio_sink: None,
            sampler: None,
            pending_envelopes: VecDeque::new(),
            max_pending: max_pending.max(1),
            signal_received: false,
        }
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn pending_len(&self) -> usize {
        self.pending_envelopes.len()
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            id: self.peer.clone(),
            state: self.state,
            is_initiator: self.is_initiator,
        }
    }

    /// A pending connection may negotiate once local media has resolved
    /// and either we initiate or the remote side has already signalled.
    pub fn ready_to_negotiate(&self, media_resolved: bool) -> bool {
        self.state == PeerState::Pending
            && media_resolved
            && (self.is_initiator || self.signal_received)
    }

    /// Install the transport and flush buffered signals in receipt order.
    pub fn begin_negotiation(&mut self, transport: Box<dyn PeerTransport>) -> Result<(), VoiceError> {
        self.transport = Some(transport);
        self.state = PeerState::Negotiating;
        debug!(
            peer = %self.peer,
            initiator = self.is_initiator,
            buffered = self.pending_envelopes.len(),
            "Negotiation started"
        );
        while let Some(payload) = self.pending_envelopes.pop_front() {
            self.apply(payload)?;
        }
        Ok(())
    }

    /// Apply a remote signal, or buffer it while the transport is not
    /// created yet. The buffer is bounded; overflow drops the oldest.
    pub fn receive_signal(
        &mut self,
        payload: serde_json::Value,
    ) -> Result<SignalDisposition, VoiceError> {
        self.signal_received = true;
        if self.state.is_terminal() {
            return Err(VoiceError::NegotiationFailure {
                peer: self.peer.clone(),
                reason: format!("connection is {}", self.state),
            });
        }
        if self.transport.is_some() {
            self.apply(payload)?;
            return Ok(SignalDisposition::Applied);
        }
        if self.pending_envelopes.len() >= self.max_pending {
            self.pending_envelopes.pop_front();
            warn!(
                peer = %self.peer,
                max = self.max_pending,
                "Pending signal buffer full, dropped oldest envelope"
            );
        }
        self.pending_envelopes.push_back(payload);
        Ok(SignalDisposition::Buffered)
    }

    /// Route remote audio. Replaces any previous sink and sampler.
    pub fn attach_stream(&mut self, sink: Box<dyn AudioSink>, sampler: SamplerGuard) {
        self.sampler = None;
        if let Some(mut old) = self.audio_sink.take() {
            old.detach();
        }
        self.audio_sink = Some(sink);
        self.sampler = Some(sampler);
        self.state = PeerState::Connected;
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = self.audio_sink.as_mut() {
            sink.set_volume(volume);
        }
    }

    /// Id of the live sampler, if the remote stream is attached.
    pub fn sampler_id(&self) -> Option<SamplerId> {
        self.sampler.as_ref().map(SamplerGuard::id)
    }

    /// Release everything: sampler, then sink, then transport. Idempotent;
    /// returns `false` if already closed.
    pub fn close(&mut self, errored: bool) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.sampler = None;
        if let Some(mut sink) = self.audio_sink.take() {
            sink.detach();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.pending_envelopes.clear();
        self.state = if errored {
            PeerState::Errored
        } else {
            PeerState::Closed
        };
        debug!(peer = %self.peer, state = %self.state, "Peer connection closed");
        true
    }

    fn apply(&mut self, payload: serde_json::Value) -> Result<(), VoiceError> {
        match self.transport.as_mut() {
            Some(transport) => transport.apply_signal(payload),
            None => Err(VoiceError::NegotiationFailure {
                peer: self.peer.clone(),
                reason: "no transport".into(),
            }),
        }
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close(false);
    }
}
