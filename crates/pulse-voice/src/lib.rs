//! Presence and mesh signaling for multi-party voice channels.
//!
//! Participants discover each other through join/leave broadcasts on a
//! publish/subscribe bus, build a full mesh of peer connections with a
//! deterministic initiator per pair, relay negotiation messages over
//! addressed topics, and track who is speaking.
//!
//! Media itself is out of scope: capture, peer transport, and playback
//! are injected through the traits in [`media`].

pub mod bus;
pub mod control;
pub mod identity;
pub mod inbound;
pub mod media;
pub mod mesh;
pub mod peer;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod signaling;
pub mod speaking;

pub use bus::{Bus, BusClient, BusClientConfig, BusEvent, MemoryBus, MemoryBusClient};
pub use control::ControlState;
pub use identity::{Identity, IdentityProvider, Profile, StaticIdentity};
pub use media::{
    AmplitudeSource, AudioOutput, AudioSink, LocalMedia, LocalStream, MediaCapture,
    MediaTransport, PeerEventSink, PeerTransport, RemoteMedia, RemoteStream,
};
pub use mesh::{is_initiator, MeshPlanner, PlannedPeer};
pub use peer::{PeerSnapshot, PeerState};
pub use presence::{announce_join, PresenceAnnouncement, Roster, RosterChange, RosterEntry};
pub use protocol::{PresenceEvent, PresenceKind, SignalingEnvelope, Topics};
pub use session::{
    MediaStatus, SessionConfig, SessionDeps, SessionView, VoiceEvent, VoiceHandle, VoiceSession,
};
pub use speaking::{SpeakingSet, SpeakingSettings};
