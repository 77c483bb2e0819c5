//! Channel presence: the roster of participants and our own announcement.
//!
//! Presence is a plain broadcast on the channel's presence topic. Every
//! participant keeps its own [`Roster`] by folding join/leave events; the
//! [`PresenceAnnouncement`] guard owns the local participant's join and
//! publishes the matching leave exactly once.

mod announce;
mod roster;

pub use announce::{announce_join, PresenceAnnouncement};
pub use roster::{Roster, RosterChange, RosterEntry};
