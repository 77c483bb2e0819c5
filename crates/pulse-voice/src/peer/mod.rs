//! Peer connection lifecycle.
//!
//! One [`PeerConnection`] per remote participant, held in a generational
//! [`Registry`] owned by the session driver. Registry keys are handed to
//! transports so late callbacks from a replaced connection can be told
//! apart from the current one.

mod connection;
mod registry;
mod types;

pub use connection::{PeerConnection, SignalDisposition};
pub use registry::{Registry, SlotKey};
pub use types::{PeerSnapshot, PeerState};
