use serde::Serialize;

use pulse_common::ParticipantId;

/// Lifecycle of one peer connection.
///
/// `Pending -> Negotiating -> Connected -> Closed`, with `Errored` reachable
/// from any live state. `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// Waiting for local media to resolve, or (as responder) for the first signal.
    Pending,
    Negotiating,
    Connected,
    Closed,
    Errored,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Closed | PeerState::Errored)
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PeerState::Pending => "pending",
            PeerState::Negotiating => "negotiating",
            PeerState::Connected => "connected",
            PeerState::Closed => "closed",
            PeerState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Read-only view of a connection for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    pub id: ParticipantId,
    pub state: PeerState,
    pub is_initiator: bool,
}
