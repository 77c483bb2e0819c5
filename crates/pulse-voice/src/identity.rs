use serde::{Deserialize, Serialize};

use pulse_common::ParticipantId;
use pulse_config::schema::VoiceConfig;

/// Public profile of a participant, as announced in presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// Supplies the local participant's id and profile.
///
/// The id must stay stable for the lifetime of the process.
pub trait IdentityProvider: Send + Sync {
    fn get(&self) -> Profile;
}

/// Fixed in-memory identity.
#[derive(Debug, Clone)]
pub struct Identity {
    profile: Profile,
}

impl Identity {
    /// Generate a fresh participant id. An empty display name falls back to the id.
    pub fn generate(display_name: &str) -> Self {
        Self::with_id(ParticipantId::generate(), display_name, None)
    }

    /// Generate a fresh id carrying the profile from the `voice` config section.
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::with_id(
            ParticipantId::generate(),
            &config.display_name,
            config.avatar_ref.clone(),
        )
    }

    pub fn with_id(
        participant_id: ParticipantId,
        display_name: &str,
        avatar_ref: Option<String>,
    ) -> Self {
        let display_name = if display_name.trim().is_empty() {
            participant_id.to_string()
        } else {
            display_name.to_string()
        };
        Self {
            profile: Profile {
                participant_id,
                display_name,
                avatar_ref,
            },
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.profile.participant_id
    }
}

impl IdentityProvider for Identity {
    fn get(&self) -> Profile {
        self.profile.clone()
    }
}

/// A profile supplied verbatim by the host application.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Profile);

impl IdentityProvider for StaticIdentity {
    fn get(&self) -> Profile {
        self.0.clone()
    }
}
