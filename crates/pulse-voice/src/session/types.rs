//! Session configuration, dependencies, and the UI-facing view and events.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use pulse_common::ParticipantId;
use pulse_config::PulseConfig;

use crate::bus::Bus;
use crate::identity::IdentityProvider;
use crate::media::{AudioOutput, MediaCapture, MediaTransport};
use crate::peer::{PeerSnapshot, PeerState};
use crate::presence::RosterEntry;
use crate::speaking::SpeakingSettings;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for one voice session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channel name; a single topic level.
    pub channel: String,
    pub topic_scope: String,
    pub max_pending_envelopes: usize,
    /// Re-publish our join when an unknown participant joins.
    pub reannounce_on_join: bool,
    pub speaking: SpeakingSettings,
    /// Log opaque signal payloads at trace level.
    pub log_signal_payloads: bool,
}

impl SessionConfig {
    /// Defaults for `channel`.
    pub fn new(channel: &str) -> Self {
        Self::from_config(&PulseConfig::default(), Some(channel))
    }

    /// Build from loaded config. `channel` overrides `voice.default_channel`.
    pub fn from_config(config: &PulseConfig, channel: Option<&str>) -> Self {
        Self {
            channel: channel
                .unwrap_or(&config.voice.default_channel)
                .to_string(),
            topic_scope: config.bus.topic_scope.clone(),
            max_pending_envelopes: config.voice.max_pending_envelopes,
            reannounce_on_join: config.voice.reannounce_on_join,
            speaking: SpeakingSettings::from(&config.voice.speaking),
            log_signal_payloads: config.logging.log_signal_payloads,
        }
    }
}

/// Platform collaborators injected into a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub identity: Arc<dyn IdentityProvider>,
    pub bus: Arc<dyn Bus>,
    pub capture: Arc<dyn MediaCapture>,
    pub transport: Arc<dyn MediaTransport>,
    pub output: Arc<dyn AudioOutput>,
}

// ---------------------------------------------------------------------------
// View & Events
// ---------------------------------------------------------------------------

/// State of the local capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    /// Capture requested, not resolved yet.
    Pending,
    Available,
    /// Capture failed; the session continues receive-only.
    Unavailable,
    /// Released on leave.
    Released,
}

/// Snapshot published to the UI after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub local_id: ParticipantId,
    pub channel: String,
    pub roster: Vec<RosterEntry>,
    pub speaking: BTreeSet<ParticipantId>,
    pub peers: Vec<PeerSnapshot>,
    pub muted: bool,
    pub deafened: bool,
    pub media: MediaStatus,
    pub left: bool,
}

impl SessionView {
    pub(crate) fn initial(local_id: ParticipantId, channel: String) -> Self {
        Self {
            local_id,
            channel,
            roster: Vec::new(),
            speaking: BTreeSet::new(),
            peers: Vec::new(),
            muted: false,
            deafened: false,
            media: MediaStatus::Pending,
            left: false,
        }
    }

    pub fn peer_state(&self, id: &ParticipantId) -> Option<PeerState> {
        self.peers.iter().find(|p| &p.id == id).map(|p| p.state)
    }

    pub fn in_roster(&self, id: &ParticipantId) -> bool {
        self.roster.iter().any(|e| &e.participant_id == id)
    }
}

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    ParticipantJoined(RosterEntry),
    ParticipantLeft(ParticipantId),
    PeerStateChanged {
        peer: ParticipantId,
        state: PeerState,
    },
    PeerFailed {
        peer: ParticipantId,
        reason: String,
    },
    SpeakingChanged {
        participant: ParticipantId,
        speaking: bool,
    },
    MuteChanged(bool),
    DeafenChanged(bool),
    MediaUnavailable(String),
    Left,
}

/// Requests from handles to the driver.
#[derive(Debug)]
pub(crate) enum Command {
    SetMuted(bool),
    SetDeafened(bool),
    Leave(oneshot::Sender<()>),
}
