use std::path::PathBuf;

use crate::id::ParticipantId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures reported by the platform capture layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    /// No capture device or permission denied. The session continues silently.
    #[error("capture unavailable: {0}")]
    Unavailable(String),

    /// The capture backend itself could not be initialised.
    #[error("capture backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceError {
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("negotiation with {peer} failed: {reason}")]
    NegotiationFailure { peer: ParticipantId, reason: String },

    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("stale signal from departed participant {0}")]
    StaleSignal(ParticipantId),

    #[error("participant id collides with the local id: {0}")]
    IdentityCollision(ParticipantId),

    #[error("voice session is closed")]
    SessionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<MediaError> for VoiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Unavailable(msg) => VoiceError::MediaUnavailable(msg),
            MediaError::Backend(msg) => VoiceError::MediaUnavailable(format!("backend: {msg}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}
