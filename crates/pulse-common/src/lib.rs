pub mod errors;
pub mod id;
pub mod wire;

pub use errors::{ConfigError, MediaError, PulseError, VoiceError};
pub use id::{new_client_id, new_id, ParticipantId};
pub use wire::{topic_matches, ClientFrame, RelayFrame};

pub type Result<T> = std::result::Result<T, PulseError>;
