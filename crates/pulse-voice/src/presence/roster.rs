use std::collections::BTreeMap;

use serde::Serialize;

use pulse_common::ParticipantId;

use crate::protocol::{PresenceEvent, PresenceKind};

/// A remote participant currently in the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// Result of applying one presence event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Joined(RosterEntry),
    Left(RosterEntry),
    Unchanged,
}

/// Remote participants of one channel, keyed by id. Never contains the
/// local participant.
#[derive(Debug, Clone)]
pub struct Roster {
    local: ParticipantId,
    entries: BTreeMap<ParticipantId, RosterEntry>,
}

impl Roster {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            entries: BTreeMap::new(),
        }
    }

    /// Fold a presence event into the roster.
    ///
    /// Our own echoes, repeated joins, and leaves for unknown ids are all
    /// `Unchanged`. A repeated join refreshes the stored profile.
    pub fn apply(&mut self, event: &PresenceEvent) -> RosterChange {
        let id = &event.participant_id;
        if id == &self.local || id.is_empty() {
            return RosterChange::Unchanged;
        }
        match event.kind {
            PresenceKind::Join => {
                let entry = RosterEntry {
                    participant_id: id.clone(),
                    display_name: event
                        .display_name
                        .clone()
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| id.to_string()),
                    avatar_ref: event.avatar_ref.clone(),
                };
                match self.entries.insert(id.clone(), entry.clone()) {
                    Some(_) => RosterChange::Unchanged,
                    None => RosterChange::Joined(entry),
                }
            }
            PresenceKind::Leave => match self.entries.remove(id) {
                Some(entry) => RosterChange::Left(entry),
                None => RosterChange::Unchanged,
            },
        }
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RosterEntry> {
        self.entries.get(id)
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
