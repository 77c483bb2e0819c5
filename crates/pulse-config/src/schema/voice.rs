//! Voice session configuration types.

use serde::{Deserialize, Serialize};

/// Speaking-detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakingConfig {
    /// Sampling period in milliseconds.
    pub sample_interval_ms: u64,
    /// Number of magnitude bins averaged per sample.
    pub window: usize,
    /// Average magnitude (0-255 scale) above which a stream counts as speaking.
    pub threshold: f32,
}

impl Default for SpeakingConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 50,
            window: 128,
            threshold: 18.0,
        }
    }
}

/// Voice session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Channel joined when none is given explicitly.
    pub default_channel: String,
    /// Display name used when the profile has none.
    pub display_name: String,
    /// Avatar reference forwarded in presence events.
    pub avatar_ref: Option<String>,
    /// Envelopes buffered per peer while its connection object is not ready.
    pub max_pending_envelopes: usize,
    /// Re-publish our own join when an unknown participant joins.
    pub reannounce_on_join: bool,
    pub speaking: SpeakingConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_channel: "gaming".into(),
            display_name: String::new(),
            avatar_ref: None,
            max_pending_envelopes: 64,
            reannounce_on_join: true,
            speaking: SpeakingConfig::default(),
        }
    }
}
