//! Protocol types for the voice mesh.
//!
//! These payloads ride inside bus `publish` frames. Presence events are
//! broadcast on one topic per channel; signaling envelopes are addressed
//! to a single participant's signal topic.

use serde::{Deserialize, Serialize};

use pulse_common::{ParticipantId, VoiceError};

use crate::identity::Profile;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Join,
    Leave,
}

/// Join/leave broadcast. Wire form: `{"type":"join","id":..,"name":..,"avatar":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    #[serde(rename = "type")]
    pub kind: PresenceKind,
    #[serde(rename = "id")]
    pub participant_id: ParticipantId,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "avatar", default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl PresenceEvent {
    pub fn join(profile: &Profile) -> Self {
        Self {
            kind: PresenceKind::Join,
            participant_id: profile.participant_id.clone(),
            display_name: Some(profile.display_name.clone()),
            avatar_ref: profile.avatar_ref.clone(),
        }
    }

    pub fn leave(participant_id: &ParticipantId) -> Self {
        Self {
            kind: PresenceKind::Leave,
            participant_id: participant_id.clone(),
            display_name: None,
            avatar_ref: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Addressed negotiation message. `payload` is opaque to the mesh and is
/// produced and consumed by the media-transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingEnvelope {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SignalWire {
    Signal {
        from: ParticipantId,
        to: ParticipantId,
        data: serde_json::Value,
    },
}

impl SignalingEnvelope {
    /// Encode as `{"type":"signal","from":..,"to":..,"data":..}`.
    pub fn to_wire(&self) -> serde_json::Value {
        let wire = SignalWire::Signal {
            from: self.from.clone(),
            to: self.to.clone(),
            data: self.payload.clone(),
        };
        serde_json::to_value(wire).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_wire(value: serde_json::Value) -> Result<Self, VoiceError> {
        let SignalWire::Signal { from, to, data } = serde_json::from_value(value)
            .map_err(|e| VoiceError::Protocol(format!("malformed signal envelope: {e}")))?;
        if data.is_null() {
            return Err(VoiceError::Protocol(format!("signal from {from} has no data")));
        }
        Ok(Self {
            from,
            to,
            payload: data,
        })
    }
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// What an inbound topic carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    Presence,
    Signal { to: ParticipantId },
}

/// Topic namespace for one channel:
/// `<scope>/presence/<channel>` and `<scope>/signal/<channel>/<to>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    scope: String,
    channel: String,
}

impl Topics {
    pub fn new(scope: &str, channel: &str) -> Self {
        Self {
            scope: scope.trim_end_matches('/').to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn presence(&self) -> String {
        format!("{}/presence/{}", self.scope, self.channel)
    }

    pub fn signal_to(&self, to: &ParticipantId) -> String {
        format!("{}/signal/{}/{}", self.scope, self.channel, to)
    }

    /// Classify an inbound topic. Topics outside this channel return `None`.
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.presence() {
            return Some(TopicKind::Presence);
        }
        let prefix = format!("{}/signal/{}/", self.scope, self.channel);
        let to = topic.strip_prefix(&prefix)?;
        if to.is_empty() || to.contains('/') {
            return None;
        }
        Some(TopicKind::Signal {
            to: ParticipantId::from(to),
        })
    }
}
