//! Voice session: joins a channel and runs the mesh until leave.
//!
//! [`VoiceSession::join`] wires the bus, presence, signaling, media, and
//! speaking detection to a single driver task. The UI talks to it through
//! a [`VoiceHandle`], watches [`SessionView`] snapshots, and reads
//! [`VoiceEvent`] notifications.

mod driver;
mod handle;
mod types;

pub use handle::VoiceHandle;
pub use types::{MediaStatus, SessionConfig, SessionDeps, SessionView, VoiceEvent};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pulse_common::VoiceError;

use crate::bus::BusEvent;
use crate::inbound::spawn_translator;
use crate::media::MediaCapture;
use crate::presence::announce_join;
use crate::protocol::Topics;
use crate::speaking::SpeakingDetector;

use driver::{CaptureResult, Driver, DriverInputs, DriverParts};

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 256;

/// A joined voice channel.
pub struct VoiceSession {
    handle: VoiceHandle,
    events: mpsc::Receiver<VoiceEvent>,
    task: JoinHandle<Result<(), VoiceError>>,
}

impl VoiceSession {
    /// Join `config.channel`: subscribe, announce presence, request the
    /// microphone, and start the driver. `bus_events` is the receiver that
    /// came with `deps.bus`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join(
        config: SessionConfig,
        deps: SessionDeps,
        bus_events: mpsc::Receiver<BusEvent>,
    ) -> Result<Self, VoiceError> {
        if config.channel.is_empty() || config.channel.contains(['/', '+', '#']) {
            return Err(VoiceError::Protocol(format!(
                "invalid channel name: {:?}",
                config.channel
            )));
        }
        let profile = deps.identity.get();
        let id = profile.participant_id.as_str();
        if id.is_empty() || id.contains(['/', '+', '#']) {
            return Err(VoiceError::Protocol(format!("invalid participant id: {id:?}")));
        }
        let local = profile.participant_id.clone();
        let topics = Topics::new(&config.topic_scope, &config.channel);

        deps.bus.subscribe(&topics.presence());
        deps.bus.subscribe(&topics.signal_to(&local));
        let (inbound, translator) = spawn_translator(bus_events, topics.clone(), local.clone());

        let announcement = announce_join(Arc::clone(&deps.bus), &topics, profile);

        let (media_tx, media_rx) = oneshot::channel();
        let capture_task = tokio::spawn(run_capture(Arc::clone(&deps.capture), media_tx));

        let (detector, samples) = SpeakingDetector::new(config.speaking.clone());
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (view_tx, view_rx) =
            watch::channel(SessionView::initial(local.clone(), config.channel.clone()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        info!(participant = %local, channel = %config.channel, "Joining voice channel");

        let driver = Driver::new(DriverParts {
            local: local.clone(),
            config,
            topics,
            bus: deps.bus,
            transport: deps.transport,
            output: deps.output,
            announcement,
            detector,
            capture_task,
            translator,
            transport_tx,
            view_tx,
            event_tx,
        });
        let inputs = DriverInputs {
            commands: command_rx,
            media: media_rx,
            presence: inbound.presence,
            signals: inbound.signals,
            transport: transport_rx,
            samples,
        };
        let task = tokio::spawn(driver.run(inputs));

        Ok(Self {
            handle: VoiceHandle::new(command_tx, view_rx, local),
            events: event_rx,
            task,
        })
    }

    pub fn handle(&self) -> VoiceHandle {
        self.handle.clone()
    }

    pub fn events(&mut self) -> &mut mpsc::Receiver<VoiceEvent> {
        &mut self.events
    }

    /// Split into the handle, the event stream, and the driver task.
    pub fn into_parts(
        self,
    ) -> (
        VoiceHandle,
        mpsc::Receiver<VoiceEvent>,
        JoinHandle<Result<(), VoiceError>>,
    ) {
        (self.handle, self.events, self.task)
    }

    /// Leave and wait for the driver to finish.
    pub async fn leave(self) -> Result<(), VoiceError> {
        self.handle.leave().await?;
        self.task.await.map_err(|_| VoiceError::SessionClosed)?
    }
}

/// Request the microphone and hand the result to the driver. A stream that
/// arrives after the driver stopped listening is released here.
async fn run_capture(capture: Arc<dyn MediaCapture>, media_tx: oneshot::Sender<CaptureResult>) {
    if let Err(Ok(stream)) = media_tx.send(capture.capture().await) {
        debug!("Capture finished after leave, releasing stream");
        stream.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pulse_common::MediaError;

    use super::*;
    use crate::media::{AmplitudeSource, LocalMedia, LocalStream};

    #[derive(Default)]
    struct Stream {
        stops: AtomicUsize,
    }

    impl AmplitudeSource for Stream {
        fn read_magnitudes(&self, window: &mut [f32]) {
            window.fill(0.0);
        }
    }

    impl LocalStream for Stream {
        fn set_enabled(&self, _enabled: bool) {}

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Ready(Arc<Stream>);

    #[async_trait]
    impl MediaCapture for Ready {
        async fn capture(&self) -> Result<LocalMedia, MediaError> {
            let stream: LocalMedia = self.0.clone();
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn capture_delivered_to_a_listener_is_not_stopped() {
        let stream = Arc::new(Stream::default());
        let (tx, mut rx) = oneshot::channel();
        run_capture(Arc::new(Ready(stream.clone())), tx).await;
        assert!(matches!(rx.try_recv(), Ok(Ok(_))));
        assert_eq!(stream.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn capture_after_receiver_closed_is_stopped() {
        let stream = Arc::new(Stream::default());
        let (tx, mut rx) = oneshot::channel();
        rx.close();
        run_capture(Arc::new(Ready(stream.clone())), tx).await;
        assert_eq!(stream.stops.load(Ordering::SeqCst), 1);
    }
}
