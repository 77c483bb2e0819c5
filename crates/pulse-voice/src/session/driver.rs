//! The session driver: a single task that owns every piece of mesh state.
//!
//! Inputs arrive on channels (handle commands, presence, signals, transport
//! callbacks, speaking samples, the capture result) and are handled one at
//! a time, so no state is shared across tasks.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use pulse_common::{MediaError, ParticipantId, VoiceError};

use crate::bus::Bus;
use crate::control::ControlState;
use crate::media::{
    AudioOutput, LocalMedia, MediaTransport, PeerEventSink, TransportEvent, TransportEventKind,
};
use crate::mesh::{is_initiator, MeshPlanner};
use crate::peer::{PeerConnection, PeerState, Registry, SignalDisposition, SlotKey};
use crate::presence::{PresenceAnnouncement, Roster, RosterChange};
use crate::protocol::{PresenceEvent, PresenceKind, SignalingEnvelope, Topics};
use crate::signaling::{Route, SignalingRelay};
use crate::speaking::{SamplerGuard, SpeakingDetector, SpeakingSample, SpeakingSet};

use super::types::{Command, MediaStatus, SessionConfig, SessionView, VoiceEvent};

pub(crate) type CaptureResult = Result<LocalMedia, MediaError>;

enum MediaState {
    Pending,
    Available(LocalMedia),
    Unavailable,
    Released,
}

impl MediaState {
    fn status(&self) -> MediaStatus {
        match self {
            MediaState::Pending => MediaStatus::Pending,
            MediaState::Available(_) => MediaStatus::Available,
            MediaState::Unavailable => MediaStatus::Unavailable,
            MediaState::Released => MediaStatus::Released,
        }
    }
}

/// Receivers the driver selects over.
pub(crate) struct DriverInputs {
    pub(crate) commands: mpsc::Receiver<Command>,
    pub(crate) media: oneshot::Receiver<CaptureResult>,
    pub(crate) presence: mpsc::Receiver<PresenceEvent>,
    pub(crate) signals: mpsc::Receiver<SignalingEnvelope>,
    pub(crate) transport: mpsc::UnboundedReceiver<TransportEvent>,
    pub(crate) samples: mpsc::UnboundedReceiver<SpeakingSample>,
}

pub(crate) struct Driver {
    local: ParticipantId,
    config: SessionConfig,
    topics: Topics,
    bus: Arc<dyn Bus>,
    transport: Arc<dyn MediaTransport>,
    output: Arc<dyn AudioOutput>,
    announcement: Option<PresenceAnnouncement>,
    roster: Roster,
    planner: MeshPlanner,
    relay: SignalingRelay,
    peers: Registry<PeerConnection>,
    speaking: SpeakingSet,
    detector: SpeakingDetector,
    control: ControlState,
    media: MediaState,
    local_sampler: Option<SamplerGuard>,
    capture_task: Option<JoinHandle<()>>,
    translator: Option<JoinHandle<()>>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    view_tx: watch::Sender<SessionView>,
    event_tx: mpsc::Sender<VoiceEvent>,
    closed: bool,
}

/// Everything needed to build a [`Driver`]; keeps construction in one place.
pub(crate) struct DriverParts {
    pub(crate) local: ParticipantId,
    pub(crate) config: SessionConfig,
    pub(crate) topics: Topics,
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) transport: Arc<dyn MediaTransport>,
    pub(crate) output: Arc<dyn AudioOutput>,
    pub(crate) announcement: PresenceAnnouncement,
    pub(crate) detector: SpeakingDetector,
    pub(crate) capture_task: JoinHandle<()>,
    pub(crate) translator: JoinHandle<()>,
    pub(crate) transport_tx: mpsc::UnboundedSender<TransportEvent>,
    pub(crate) view_tx: watch::Sender<SessionView>,
    pub(crate) event_tx: mpsc::Sender<VoiceEvent>,
}

impl Driver {
    pub(crate) fn new(parts: DriverParts) -> Self {
        let relay = SignalingRelay::new(
            parts.local.clone(),
            Arc::clone(&parts.bus),
            parts.topics.clone(),
            parts.config.log_signal_payloads,
        );
        Self {
            roster: Roster::new(parts.local.clone()),
            local: parts.local,
            config: parts.config,
            topics: parts.topics,
            bus: parts.bus,
            transport: parts.transport,
            output: parts.output,
            announcement: Some(parts.announcement),
            planner: MeshPlanner::new(),
            relay,
            peers: Registry::new(),
            speaking: SpeakingSet::default(),
            detector: parts.detector,
            control: ControlState::default(),
            media: MediaState::Pending,
            local_sampler: None,
            capture_task: Some(parts.capture_task),
            translator: Some(parts.translator),
            transport_tx: parts.transport_tx,
            view_tx: parts.view_tx,
            event_tx: parts.event_tx,
            closed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    pub(crate) async fn run(mut self, mut inputs: DriverInputs) -> Result<(), VoiceError> {
        let mut media_done = false;
        info!(
            participant = %self.local,
            channel = %self.topics.channel(),
            "Voice session started"
        );

        loop {
            tokio::select! {
                command = inputs.commands.recv() => match command {
                    Some(Command::SetMuted(muted)) => self.set_muted(muted),
                    Some(Command::SetDeafened(deafened)) => self.set_deafened(deafened),
                    Some(Command::Leave(ack)) => {
                        self.finish(&mut inputs.media, media_done);
                        let _ = ack.send(());
                        return Ok(());
                    }
                    None => {
                        debug!("All voice handles dropped, leaving");
                        self.finish(&mut inputs.media, media_done);
                        return Ok(());
                    }
                },
                result = &mut inputs.media, if !media_done => {
                    media_done = true;
                    let result = result.unwrap_or_else(|_| {
                        Err(MediaError::Unavailable("capture task ended without a result".into()))
                    });
                    if let Err(e) = self.on_media(result) {
                        self.shutdown();
                        return Err(e);
                    }
                }
                Some(event) = inputs.presence.recv() => self.on_presence(event),
                Some(envelope) = inputs.signals.recv() => self.on_signal(envelope),
                Some(event) = inputs.transport.recv() => self.on_transport_event(event),
                Some(sample) = inputs.samples.recv() => self.on_speaking_sample(sample),
            }
        }
    }

    /// Shut down, releasing media that resolved but was never received.
    fn finish(&mut self, media: &mut oneshot::Receiver<CaptureResult>, media_done: bool) {
        if !media_done {
            // Closing first makes a late capture fail to send and stop itself.
            media.close();
            if let Ok(Ok(stream)) = media.try_recv() {
                stream.stop();
            }
        }
        self.shutdown();
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    fn on_media(&mut self, result: CaptureResult) -> Result<(), VoiceError> {
        match result {
            Ok(media) => {
                media.set_enabled(self.control.capture_enabled());
                self.local_sampler = Some(self.detector.start(self.local.clone(), Arc::clone(&media)));
                self.media = MediaState::Available(media);
                info!(muted = self.control.muted, "Local media acquired");
            }
            Err(MediaError::Unavailable(reason)) => {
                warn!(reason = %reason, "Local media unavailable, continuing receive-only");
                self.media = MediaState::Unavailable;
                self.emit(VoiceEvent::MediaUnavailable(reason));
            }
            Err(err @ MediaError::Backend(_)) => {
                error!(error = %err, "Capture backend failed, ending session");
                self.emit(VoiceEvent::MediaUnavailable(err.to_string()));
                return Err(err.into());
            }
        }
        for key in self.peers.keys() {
            self.advance_peer(key);
        }
        self.publish_view();
        Ok(())
    }

    fn media_resolved(&self) -> bool {
        matches!(self.media, MediaState::Available(_) | MediaState::Unavailable)
    }

    fn local_media(&self) -> Option<LocalMedia> {
        match &self.media {
            MediaState::Available(media) => Some(Arc::clone(media)),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    fn on_presence(&mut self, event: PresenceEvent) {
        match self.roster.apply(&event) {
            RosterChange::Joined(entry) => {
                let id = entry.participant_id.clone();
                info!(peer = %id, name = %entry.display_name, "Participant joined");
                self.relay.mark_joined(&id);
                self.emit(VoiceEvent::ParticipantJoined(entry));
                if self.config.reannounce_on_join {
                    if let Some(announcement) = &self.announcement {
                        announcement.reannounce();
                    }
                }
                self.reconcile();
            }
            RosterChange::Left(entry) => {
                info!(peer = %entry.participant_id, "Participant left");
                self.on_departure(&entry.participant_id);
                self.emit(VoiceEvent::ParticipantLeft(entry.participant_id));
            }
            RosterChange::Unchanged => {
                // A leave for an id we never saw join can still own a
                // responder created from an early signal.
                if event.kind == PresenceKind::Leave && event.participant_id != self.local {
                    self.on_departure(&event.participant_id);
                }
            }
        }
        self.publish_view();
    }

    fn on_departure(&mut self, id: &ParticipantId) {
        self.relay.mark_departed(id);
        self.planner.forget(id);
        self.close_peer(id);
        if self.speaking.remove(id) {
            self.emit(VoiceEvent::SpeakingChanged {
                participant: id.clone(),
                speaking: false,
            });
        }
    }

    /// Open a connection for every roster member that lacks one.
    fn reconcile(&mut self) {
        let peers = &self.peers;
        let plan = match self
            .planner
            .plan(&self.local, &self.roster, |id| peers.contains(id))
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "Cannot plan mesh");
                return;
            }
        };
        for planned in plan {
            self.open_peer(planned.id, planned.is_initiator);
        }
    }

    // -----------------------------------------------------------------------
    // Peers
    // -----------------------------------------------------------------------

    fn open_peer(&mut self, id: ParticipantId, is_initiator: bool) -> Option<SlotKey> {
        let max_pending = self.config.max_pending_envelopes;
        let peer = id.clone();
        let key = self.peers.insert_with(id, |_| {
            PeerConnection::new(peer.clone(), is_initiator, max_pending)
        })?;
        debug!(peer = %peer, initiator = is_initiator, "Peer connection created");
        self.emit(VoiceEvent::PeerStateChanged {
            peer,
            state: PeerState::Pending,
        });
        self.advance_peer(key);
        Some(key)
    }

    /// Move a pending connection to negotiating if it is ready.
    fn advance_peer(&mut self, key: SlotKey) {
        let resolved = self.media_resolved();
        let local = self.local_media();
        let Some(conn) = self.peers.get_mut(key) else {
            return;
        };
        if !conn.ready_to_negotiate(resolved) {
            return;
        }
        let peer = conn.peer().clone();
        let events = PeerEventSink::new(peer.clone(), key, self.transport_tx.clone());
        let result = self
            .transport
            .create_connection(&peer, conn.is_initiator(), local, events)
            .and_then(|transport| conn.begin_negotiation(transport));
        match result {
            Ok(()) => self.emit(VoiceEvent::PeerStateChanged {
                peer,
                state: PeerState::Negotiating,
            }),
            Err(e) => self.fail_peer(key, e.to_string()),
        }
    }

    fn deliver(&mut self, key: SlotKey, payload: serde_json::Value) {
        let Some(conn) = self.peers.get_mut(key) else {
            return;
        };
        match conn.receive_signal(payload) {
            Ok(SignalDisposition::Applied) => {}
            Ok(SignalDisposition::Buffered) => self.advance_peer(key),
            Err(e) => self.fail_peer(key, e.to_string()),
        }
    }

    /// Tear down a failed connection and stop retrying it until the peer
    /// leaves and joins again.
    fn fail_peer(&mut self, key: SlotKey, reason: String) {
        let Some(conn) = self.peers.get_mut(key) else {
            return;
        };
        conn.close(true);
        let peer = conn.peer().clone();
        self.peers.remove(key);
        warn!(peer = %peer, reason = %reason, "Peer connection failed");
        self.planner.mark_failed(&peer);
        if self.speaking.remove(&peer) {
            self.emit(VoiceEvent::SpeakingChanged {
                participant: peer.clone(),
                speaking: false,
            });
        }
        self.emit(VoiceEvent::PeerStateChanged {
            peer: peer.clone(),
            state: PeerState::Errored,
        });
        self.emit(VoiceEvent::PeerFailed { peer, reason });
        self.publish_view();
    }

    fn close_peer(&mut self, id: &ParticipantId) {
        let Some(key) = self.peers.key_of(id) else {
            return;
        };
        let closed = self
            .peers
            .get_mut(key)
            .is_some_and(|conn| conn.close(false));
        self.peers.remove(key);
        if closed {
            self.emit(VoiceEvent::PeerStateChanged {
                peer: id.clone(),
                state: PeerState::Closed,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Signaling
    // -----------------------------------------------------------------------

    fn on_signal(&mut self, envelope: SignalingEnvelope) {
        let has_connection = self.peers.contains(&envelope.from);
        match self.relay.route(&envelope, has_connection) {
            Route::Deliver => {
                if let Some(key) = self.peers.key_of(&envelope.from) {
                    self.deliver(key, envelope.payload);
                }
            }
            Route::CreateResponder => {
                let from = envelope.from;
                if self.planner.is_failed(&from) {
                    debug!(peer = %from, "Ignoring signal from failed peer");
                    return;
                }
                match is_initiator(&self.local, &from) {
                    Ok(false) => {
                        debug!(peer = %from, "Signal before join, creating responder");
                        if let Some(key) = self.open_peer(from, false) {
                            self.deliver(key, envelope.payload);
                        }
                    }
                    Ok(true) => {
                        warn!(
                            peer = %from,
                            "Unsolicited signal from a peer we initiate to, dropped"
                        );
                    }
                    Err(e) => error!(error = %e, "Dropping signal"),
                }
            }
            Route::Drop(err @ VoiceError::IdentityCollision(_)) => {
                error!(error = %err, "Dropping signal");
            }
            Route::Drop(err) => {
                debug!(error = %err, "Dropping signal");
                return;
            }
        }
        self.publish_view();
    }

    // -----------------------------------------------------------------------
    // Transport callbacks
    // -----------------------------------------------------------------------

    fn on_transport_event(&mut self, event: TransportEvent) {
        let TransportEvent { key, peer, kind } = event;
        let Some(conn) = self.peers.get_mut(key) else {
            trace!(peer = %peer, "Ignoring event from a closed connection");
            return;
        };
        match kind {
            TransportEventKind::LocalSignal(payload) => {
                self.relay.send_signal(&peer, payload);
            }
            TransportEventKind::RemoteStream(stream) => {
                let mut sink = self.output.attach(&peer, Arc::clone(&stream));
                sink.set_volume(self.control.sink_volume());
                let sampler = self.detector.start(peer.clone(), stream);
                conn.attach_stream(sink, sampler);
                info!(peer = %peer, "Peer connected");
                if self.speaking.remove(&peer) {
                    self.emit(VoiceEvent::SpeakingChanged {
                        participant: peer.clone(),
                        speaking: false,
                    });
                }
                self.emit(VoiceEvent::PeerStateChanged {
                    peer,
                    state: PeerState::Connected,
                });
                self.publish_view();
            }
            TransportEventKind::Error(reason) => self.fail_peer(key, reason),
        }
    }

    // -----------------------------------------------------------------------
    // Speaking
    // -----------------------------------------------------------------------

    fn on_speaking_sample(&mut self, sample: SpeakingSample) {
        let live = if sample.owner == self.local {
            self.local_sampler.as_ref().map(SamplerGuard::id)
        } else {
            self.peers
                .get_by_id(&sample.owner)
                .and_then(PeerConnection::sampler_id)
        };
        if live != Some(sample.sampler) {
            trace!(owner = %sample.owner, "Ignoring sample from a stopped sampler");
            return;
        }
        if self.speaking.set(&sample.owner, sample.speaking) {
            self.emit(VoiceEvent::SpeakingChanged {
                participant: sample.owner,
                speaking: sample.speaking,
            });
            self.publish_view();
        }
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    fn set_muted(&mut self, muted: bool) {
        if self.control.set_muted(muted) {
            self.apply_capture_enabled();
            info!(muted, "Mute changed");
            self.emit(VoiceEvent::MuteChanged(muted));
            self.publish_view();
        }
    }

    fn set_deafened(&mut self, deafened: bool) {
        let outcome = self.control.set_deafened(deafened);
        if outcome.mute_changed {
            self.apply_capture_enabled();
            self.emit(VoiceEvent::MuteChanged(true));
        }
        if outcome.deafen_changed {
            let volume = self.control.sink_volume();
            for conn in self.peers.iter_mut() {
                conn.set_volume(volume);
            }
            info!(deafened, "Deafen changed");
            self.emit(VoiceEvent::DeafenChanged(deafened));
        }
        if outcome.mute_changed || outcome.deafen_changed {
            self.publish_view();
        }
    }

    fn apply_capture_enabled(&self) {
        if let MediaState::Available(media) = &self.media {
            media.set_enabled(self.control.capture_enabled());
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Leave the channel. Idempotent. Order: retract presence, close every
    /// peer, stop the local sampler, release media, drop subscriptions.
    pub(crate) fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut announcement) = self.announcement.take() {
            announcement.retract();
        }
        for key in self.peers.keys() {
            if let Some(conn) = self.peers.get_mut(key) {
                conn.close(false);
            }
            self.peers.remove(key);
        }
        self.speaking.clear();
        self.local_sampler = None;
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let MediaState::Available(media) = std::mem::replace(&mut self.media, MediaState::Released) {
            media.stop();
        }
        self.bus.unsubscribe(&self.topics.presence());
        self.bus.unsubscribe(&self.relay.inbox_topic());
        if let Some(task) = self.translator.take() {
            task.abort();
        }
        self.roster.clear();

        info!(participant = %self.local, channel = %self.topics.channel(), "Left voice channel");
        self.emit(VoiceEvent::Left);
        self.publish_view();
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn emit(&self, event: VoiceEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            trace!(error = %e, "Voice event dropped");
        }
    }

    fn publish_view(&self) {
        let view = SessionView {
            local_id: self.local.clone(),
            channel: self.topics.channel().to_string(),
            roster: self.roster.entries().cloned().collect(),
            speaking: self.speaking.to_set(),
            peers: self.peers.iter().map(|(_, _, conn)| conn.snapshot()).collect(),
            muted: self.control.muted,
            deafened: self.control.deafened,
            media: self.media.status(),
            left: self.closed,
        };
        self.view_tx.send_replace(view);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
