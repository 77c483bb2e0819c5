//! Full-mesh planning.
//!
//! Every pair of participants in a channel needs exactly one connection.
//! Exactly one side of each pair initiates, decided by comparing ids, so
//! both peers reach the same answer without coordinating.

use std::collections::HashSet;

use pulse_common::{ParticipantId, VoiceError};

use crate::presence::Roster;

/// Whether `local` initiates the connection with `remote`.
///
/// The lower id initiates. Equal ids mean two processes share an identity,
/// which the mesh cannot resolve.
pub fn is_initiator(local: &ParticipantId, remote: &ParticipantId) -> Result<bool, VoiceError> {
    if local == remote {
        return Err(VoiceError::IdentityCollision(remote.clone()));
    }
    Ok(local < remote)
}

/// A connection the mesh needs but does not have yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPeer {
    pub id: ParticipantId,
    pub is_initiator: bool,
}

/// Decides which peer connections to open.
///
/// Peers whose negotiation failed are remembered and skipped until they
/// leave and join again.
#[derive(Debug, Default)]
pub struct MeshPlanner {
    failed: HashSet<ParticipantId>,
}

impl MeshPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections to open for every roster member that has none.
    ///
    /// Output is in roster (id) order. A roster entry equal to the local id
    /// yields `IdentityCollision`.
    pub fn plan(
        &self,
        local: &ParticipantId,
        roster: &Roster,
        has_connection: impl Fn(&ParticipantId) -> bool,
    ) -> Result<Vec<PlannedPeer>, VoiceError> {
        let mut planned = Vec::new();
        for id in roster.ids() {
            if has_connection(id) || self.failed.contains(id) {
                continue;
            }
            planned.push(PlannedPeer {
                id: id.clone(),
                is_initiator: is_initiator(local, id)?,
            });
        }
        Ok(planned)
    }

    pub fn mark_failed(&mut self, id: &ParticipantId) {
        self.failed.insert(id.clone());
    }

    pub fn is_failed(&self, id: &ParticipantId) -> bool {
        self.failed.contains(id)
    }

    /// Clear the failure mark, typically on leave.
    pub fn forget(&mut self, id: &ParticipantId) {
        self.failed.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PresenceEvent;
    use proptest::prelude::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn roster_with(local: &str, ids: &[&str]) -> Roster {
        let mut roster = Roster::new(id(local));
        for other in ids {
            roster.apply(&PresenceEvent {
                kind: crate::protocol::PresenceKind::Join,
                participant_id: id(other),
                display_name: None,
                avatar_ref: None,
            });
        }
        roster
    }

    #[test]
    fn lower_id_initiates() {
        assert!(is_initiator(&id("a1"), &id("b2")).unwrap());
        assert!(!is_initiator(&id("b2"), &id("a1")).unwrap());
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(is_initiator(&id("B"), &id("a")).unwrap());
        assert!(is_initiator(&id("a1"), &id("a10")).unwrap());
    }

    #[test]
    fn equal_ids_collide() {
        let err = is_initiator(&id("a1"), &id("a1")).unwrap_err();
        assert!(matches!(err, VoiceError::IdentityCollision(ref p) if p == &id("a1")));
    }

    #[test]
    fn plan_skips_connected_and_failed() {
        let roster = roster_with("m", &["a", "b", "x", "z"]);
        let mut planner = MeshPlanner::new();
        planner.mark_failed(&id("x"));
        let planned = planner.plan(&id("m"), &roster, |p| p == &id("b")).unwrap();
        assert_eq!(
            planned,
            vec![
                PlannedPeer { id: id("a"), is_initiator: false },
                PlannedPeer { id: id("z"), is_initiator: true },
            ]
        );

        planner.forget(&id("x"));
        let planned = planner.plan(&id("m"), &roster, |_| false).unwrap();
        assert_eq!(planned.len(), 4);
    }

    proptest! {
        #[test]
        fn exactly_one_side_initiates(a in "[a-zA-Z0-9_-]{1,16}", b in "[a-zA-Z0-9_-]{1,16}") {
            let (a, b) = (id(&a), id(&b));
            if a == b {
                prop_assert!(is_initiator(&a, &b).is_err());
            } else {
                let ab = is_initiator(&a, &b).unwrap();
                let ba = is_initiator(&b, &a).unwrap();
                prop_assert!(ab != ba);
            }
        }
    }
}
