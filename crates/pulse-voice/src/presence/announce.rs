use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::Bus;
use crate::identity::Profile;
use crate::protocol::{PresenceEvent, Topics};

/// Publish our join on the channel's presence topic and return the guard
/// that owns the matching leave.
pub fn announce_join(bus: Arc<dyn Bus>, topics: &Topics, profile: Profile) -> PresenceAnnouncement {
    let topic = topics.presence();
    let announcement = PresenceAnnouncement {
        bus,
        topic,
        profile,
        retracted: false,
    };
    announcement.publish_join();
    info!(
        participant = %announcement.profile.participant_id,
        topic = %announcement.topic,
        "Announced presence"
    );
    announcement
}

/// Our own presence on a channel. The leave is published at most once,
/// either through [`retract`](Self::retract) or on drop.
pub struct PresenceAnnouncement {
    bus: Arc<dyn Bus>,
    topic: String,
    profile: Profile,
    retracted: bool,
}

impl PresenceAnnouncement {
    /// Publish our join again so late joiners learn about us.
    pub fn reannounce(&self) {
        if self.retracted {
            return;
        }
        debug!(topic = %self.topic, "Re-announcing presence");
        self.publish_join();
    }

    /// Publish the leave. Returns `false` if it was already published.
    pub fn retract(&mut self) -> bool {
        if self.retracted {
            return false;
        }
        self.retracted = true;
        let leave = PresenceEvent::leave(&self.profile.participant_id);
        match serde_json::to_value(&leave) {
            Ok(payload) => self.bus.publish(&self.topic, payload),
            Err(e) => tracing::warn!(error = %e, "Failed to encode leave"),
        }
        info!(participant = %self.profile.participant_id, "Retracted presence");
        true
    }

    pub fn is_retracted(&self) -> bool {
        self.retracted
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn publish_join(&self) {
        match serde_json::to_value(PresenceEvent::join(&self.profile)) {
            Ok(payload) => self.bus.publish(&self.topic, payload),
            Err(e) => tracing::warn!(error = %e, "Failed to encode join"),
        }
    }
}

impl Drop for PresenceAnnouncement {
    fn drop(&mut self) {
        self.retract();
    }
}
