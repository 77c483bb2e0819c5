//! Speaking detection.
//!
//! Each audio stream gets its own sampling task. A task reads a fixed
//! window of magnitudes every interval, averages them, and reports only
//! when the speaking flag flips. Samples carry the id of the sampler that
//! produced them; the session drops samples whose sampler is no longer the
//! live one for that participant.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use pulse_common::ParticipantId;
use pulse_config::schema::SpeakingConfig;

use crate::media::AmplitudeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(u64);

/// Edge-triggered speaking report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakingSample {
    pub sampler: SamplerId,
    pub owner: ParticipantId,
    pub speaking: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakingSettings {
    pub interval: Duration,
    pub window: usize,
    pub threshold: f32,
}

impl Default for SpeakingSettings {
    fn default() -> Self {
        Self::from(&SpeakingConfig::default())
    }
}

impl From<&SpeakingConfig> for SpeakingSettings {
    fn from(config: &SpeakingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.sample_interval_ms),
            window: config.window.max(1),
            threshold: config.threshold,
        }
    }
}

/// Mean of the window. Empty windows are silent.
pub fn average_magnitude(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f32>() / window.len() as f32
}

/// Spawns sampling tasks that all report into one channel.
pub struct SpeakingDetector {
    settings: SpeakingSettings,
    next_id: u64,
    tx: mpsc::UnboundedSender<SpeakingSample>,
}

impl SpeakingDetector {
    pub fn new(settings: SpeakingSettings) -> (Self, mpsc::UnboundedReceiver<SpeakingSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                settings,
                next_id: 1,
                tx,
            },
            rx,
        )
    }

    /// Start sampling `source` on behalf of `owner`. Dropping the guard
    /// stops the task.
    pub fn start<S>(&mut self, owner: ParticipantId, source: Arc<S>) -> SamplerGuard
    where
        S: AmplitudeSource + ?Sized + 'static,
    {
        let id = SamplerId(self.next_id);
        self.next_id += 1;
        let handle = tokio::spawn(sample_loop(
            id,
            owner,
            source,
            self.settings.clone(),
            self.tx.clone(),
        ));
        SamplerGuard { id, handle }
    }
}

async fn sample_loop<S>(
    id: SamplerId,
    owner: ParticipantId,
    source: Arc<S>,
    settings: SpeakingSettings,
    tx: mpsc::UnboundedSender<SpeakingSample>,
) where
    S: AmplitudeSource + ?Sized,
{
    let mut interval = tokio::time::interval(settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut window = vec![0.0_f32; settings.window];
    let mut speaking = false;

    loop {
        interval.tick().await;
        source.read_magnitudes(&mut window);
        let now = average_magnitude(&window) > settings.threshold;
        if now == speaking {
            continue;
        }
        speaking = now;
        let sample = SpeakingSample {
            sampler: id,
            owner: owner.clone(),
            speaking,
        };
        if tx.send(sample).is_err() {
            break;
        }
    }
}

/// Owns a sampling task; aborts it on drop.
#[derive(Debug)]
pub struct SamplerGuard {
    id: SamplerId,
    handle: JoinHandle<()>,
}

impl SamplerGuard {
    pub fn id(&self) -> SamplerId {
        self.id
    }
}

impl Drop for SamplerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Participants currently speaking, including the local id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakingSet {
    speaking: BTreeSet<ParticipantId>,
}

impl SpeakingSet {
    /// Returns whether membership changed.
    pub fn set(&mut self, id: &ParticipantId, speaking: bool) -> bool {
        if speaking {
            self.speaking.insert(id.clone())
        } else {
            self.speaking.remove(id)
        }
    }

    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        self.speaking.remove(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.speaking.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantId> {
        self.speaking.iter()
    }

    pub fn to_set(&self) -> BTreeSet<ParticipantId> {
        self.speaking.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.speaking.is_empty()
    }

    pub fn clear(&mut self) {
        self.speaking.clear();
    }
}
