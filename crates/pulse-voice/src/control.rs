//! Mute and deafen state.
//!
//! Deafening implies muting. Undeafening restores playback but leaves the
//! microphone as it was, so a participant who muted before deafening stays
//! muted afterwards.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub muted: bool,
    pub deafened: bool,
}

/// What a deafen request changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeafenOutcome {
    pub deafen_changed: bool,
    pub mute_changed: bool,
}

impl ControlState {
    /// Returns whether the mute flag changed.
    pub fn set_muted(&mut self, muted: bool) -> bool {
        let changed = self.muted != muted;
        self.muted = muted;
        changed
    }

    pub fn set_deafened(&mut self, deafened: bool) -> DeafenOutcome {
        let deafen_changed = self.deafened != deafened;
        self.deafened = deafened;
        let mute_changed = deafened && self.set_muted(true);
        DeafenOutcome {
            deafen_changed,
            mute_changed,
        }
    }

    /// Volume applied to every remote audio sink.
    pub fn sink_volume(&self) -> f32 {
        if self.deafened {
            0.0
        } else {
            1.0
        }
    }

    pub fn capture_enabled(&self) -> bool {
        !self.muted
    }
}
