//! Fakes and helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use pulse_common::{MediaError, ParticipantId, VoiceError};
use pulse_voice::{
    AmplitudeSource, AudioOutput, AudioSink, Bus, BusEvent, Identity, LocalMedia, LocalStream,
    MediaCapture, MediaTransport, MemoryBus, PeerEventSink, PeerTransport, RemoteMedia,
    RemoteStream, SessionConfig, SessionDeps, SessionView, VoiceHandle, VoiceSession,
};

pub const SCOPE: &str = "pulse/dev/voice";
pub const CHANNEL: &str = "gaming";

pub fn presence_topic() -> String {
    format!("{SCOPE}/presence/{CHANNEL}")
}

pub fn signal_topic(to: &str) -> String {
    format!("{SCOPE}/signal/{CHANNEL}/{to}")
}

pub fn id(s: &str) -> ParticipantId {
    ParticipantId::from(s)
}

/// Global ordering stamp for release steps (sink detach, transport close).
static RELEASE_SEQ: AtomicUsize = AtomicUsize::new(1);

fn stamp(slot: &AtomicUsize) {
    slot.store(RELEASE_SEQ.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
}

fn stamped(slot: &AtomicUsize) -> Option<usize> {
    match slot.load(Ordering::SeqCst) {
        0 => None,
        n => Some(n),
    }
}

// ---------------------------------------------------------------------------
// Amplitude
// ---------------------------------------------------------------------------

/// Adjustable constant magnitude.
#[derive(Default)]
pub struct Level(AtomicU32);

impl Level {
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLocalStream {
    pub level: Level,
    enabled: AtomicBool,
    stops: AtomicUsize,
}

impl FakeLocalStream {
    pub fn new() -> Arc<Self> {
        let stream = Self::default();
        stream.enabled.store(true, Ordering::SeqCst);
        Arc::new(stream)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AmplitudeSource for FakeLocalStream {
    fn read_magnitudes(&self, window: &mut [f32]) {
        let value = if self.is_enabled() { self.level.get() } else { 0.0 };
        window.fill(value);
    }
}

impl LocalStream for FakeLocalStream {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

type CaptureOutcome = Result<LocalMedia, MediaError>;

/// Capture whose result is decided by the test.
pub struct FakeCapture {
    outcome: Mutex<Option<oneshot::Receiver<CaptureOutcome>>>,
}

/// Resolves a delayed [`FakeCapture`].
pub struct CaptureRelease(oneshot::Sender<CaptureOutcome>);

impl CaptureRelease {
    pub fn resolve(self, outcome: CaptureOutcome) {
        let _ = self.0.send(outcome);
    }
}

impl FakeCapture {
    pub fn delayed() -> (Arc<Self>, CaptureRelease) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                outcome: Mutex::new(Some(rx)),
            }),
            CaptureRelease(tx),
        )
    }

    pub fn ready(stream: Arc<FakeLocalStream>) -> Arc<Self> {
        let (capture, release) = Self::delayed();
        release.resolve(Ok(stream));
        capture
    }

    pub fn unavailable() -> Arc<Self> {
        let (capture, release) = Self::delayed();
        release.resolve(Err(MediaError::Unavailable("no microphone".into())));
        capture
    }

    pub fn backend_failure() -> Arc<Self> {
        let (capture, release) = Self::delayed();
        release.resolve(Err(MediaError::Backend("driver crashed".into())));
        capture
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn capture(&self) -> Result<LocalMedia, MediaError> {
        let rx = self.outcome.lock().unwrap().take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(MediaError::Unavailable("release dropped".into()))),
            None => Err(MediaError::Unavailable("already captured".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote streams & output
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRemoteStream {
    pub level: Level,
}

impl AmplitudeSource for FakeRemoteStream {
    fn read_magnitudes(&self, window: &mut [f32]) {
        window.fill(self.level.get());
    }
}

impl RemoteStream for FakeRemoteStream {}

pub struct SinkRecord {
    pub peer: ParticipantId,
    pub volume: Arc<Mutex<f32>>,
    pub detached: Arc<AtomicBool>,
    pub detached_at: Arc<AtomicUsize>,
}

#[derive(Default)]
pub struct FakeOutput {
    sinks: Mutex<Vec<SinkRecord>>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Volume of the most recent sink for `peer`.
    pub fn volume(&self, peer: &str) -> Option<f32> {
        let sinks = self.sinks.lock().unwrap();
        sinks
            .iter()
            .rev()
            .find(|s| s.peer.as_str() == peer)
            .map(|s| *s.volume.lock().unwrap())
    }

    pub fn attached(&self, peer: &str) -> usize {
        let sinks = self.sinks.lock().unwrap();
        sinks
            .iter()
            .filter(|s| s.peer.as_str() == peer && !s.detached.load(Ordering::SeqCst))
            .count()
    }

    /// Release stamp of the most recent sink for `peer`.
    pub fn detached_at(&self, peer: &str) -> Option<usize> {
        let sinks = self.sinks.lock().unwrap();
        sinks
            .iter()
            .rev()
            .find(|s| s.peer.as_str() == peer)
            .and_then(|s| stamped(&s.detached_at))
    }

    pub fn total(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

struct FakeSink {
    volume: Arc<Mutex<f32>>,
    detached: Arc<AtomicBool>,
    detached_at: Arc<AtomicUsize>,
}

impl AudioSink for FakeSink {
    fn set_volume(&mut self, volume: f32) {
        *self.volume.lock().unwrap() = volume;
    }

    fn detach(&mut self) {
        self.detached.store(true, Ordering::SeqCst);
        stamp(&self.detached_at);
    }
}

impl AudioOutput for FakeOutput {
    fn attach(&self, peer: &ParticipantId, _stream: RemoteMedia) -> Box<dyn AudioSink> {
        let volume = Arc::new(Mutex::new(1.0));
        let detached = Arc::new(AtomicBool::new(false));
        let detached_at = Arc::new(AtomicUsize::new(0));
        self.sinks.lock().unwrap().push(SinkRecord {
            peer: peer.clone(),
            volume: Arc::clone(&volume),
            detached: Arc::clone(&detached),
            detached_at: Arc::clone(&detached_at),
        });
        Box::new(FakeSink {
            volume,
            detached,
            detached_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// A connection created through [`FakeTransport`]; the test drives its
/// callbacks through `events`.
#[derive(Clone)]
pub struct Created {
    pub peer: ParticipantId,
    pub is_initiator: bool,
    pub had_local: bool,
    pub events: PeerEventSink,
    pub applied: Arc<Mutex<Vec<Value>>>,
    pub closed: Arc<AtomicBool>,
    pub closed_at: Arc<AtomicUsize>,
}

impl Created {
    pub fn applied(&self) -> Vec<Value> {
        self.applied.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn closed_at(&self) -> Option<usize> {
        stamped(&self.closed_at)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    created: Mutex<Vec<Created>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> Vec<Created> {
        self.created.lock().unwrap().clone()
    }

    pub fn for_peer(&self, peer: &str) -> Vec<Created> {
        self.created()
            .into_iter()
            .filter(|c| c.peer.as_str() == peer)
            .collect()
    }
}

struct ScriptedConnection {
    applied: Arc<Mutex<Vec<Value>>>,
    closed: Arc<AtomicBool>,
    closed_at: Arc<AtomicUsize>,
}

impl PeerTransport for ScriptedConnection {
    fn apply_signal(&mut self, payload: Value) -> Result<(), VoiceError> {
        self.applied.lock().unwrap().push(payload);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        stamp(&self.closed_at);
    }
}

impl MediaTransport for FakeTransport {
    fn create_connection(
        &self,
        peer: &ParticipantId,
        is_initiator: bool,
        local: Option<LocalMedia>,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerTransport>, VoiceError> {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let closed_at = Arc::new(AtomicUsize::new(0));
        self.created.lock().unwrap().push(Created {
            peer: peer.clone(),
            is_initiator,
            had_local: local.is_some(),
            events,
            applied: Arc::clone(&applied),
            closed: Arc::clone(&closed),
            closed_at: Arc::clone(&closed_at),
        });
        Ok(Box::new(ScriptedConnection {
            applied,
            closed,
            closed_at,
        }))
    }
}

// ---------------------------------------------------------------------------
// Loopback transport
// ---------------------------------------------------------------------------

/// Negotiates by itself: the initiator sends an offer and a candidate, the
/// responder answers with an answer and a candidate, and each side reports
/// the remote stream after two remote signals.
pub struct LoopbackTransport {
    pub remote_level: f32,
}

struct LoopbackConnection {
    is_initiator: bool,
    events: PeerEventSink,
    received: usize,
    remote_level: f32,
    answered: bool,
}

impl PeerTransport for LoopbackConnection {
    fn apply_signal(&mut self, payload: Value) -> Result<(), VoiceError> {
        self.received += 1;
        if !self.is_initiator && payload["type"] == "offer" && !self.answered {
            self.answered = true;
            self.events.local_signal(json!({"type": "answer", "sdp": "answer"}));
            self.events.local_signal(json!({"type": "candidate", "candidate": "responder"}));
        }
        if self.received == 2 {
            let stream = FakeRemoteStream::default();
            stream.level.set(self.remote_level);
            self.events.remote_stream(Arc::new(stream));
        }
        Ok(())
    }

    fn close(&mut self) {}
}

impl MediaTransport for LoopbackTransport {
    fn create_connection(
        &self,
        _peer: &ParticipantId,
        is_initiator: bool,
        _local: Option<LocalMedia>,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerTransport>, VoiceError> {
        if is_initiator {
            events.local_signal(json!({"type": "offer", "sdp": "offer"}));
            events.local_signal(json!({"type": "candidate", "candidate": "initiator"}));
        }
        Ok(Box::new(LoopbackConnection {
            is_initiator,
            events,
            received: 0,
            remote_level: self.remote_level,
            answered: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub struct Participant {
    pub session: VoiceSession,
    pub handle: VoiceHandle,
}

/// Route driver logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> SessionConfig {
    let mut config = SessionConfig::new(CHANNEL);
    config.topic_scope = SCOPE.into();
    config
}

pub fn join(
    bus: &MemoryBus,
    participant: &str,
    capture: Arc<dyn MediaCapture>,
    transport: Arc<dyn MediaTransport>,
    output: Arc<dyn AudioOutput>,
) -> Participant {
    join_with(bus, participant, config(), capture, transport, output)
}

pub fn join_with(
    bus: &MemoryBus,
    participant: &str,
    config: SessionConfig,
    capture: Arc<dyn MediaCapture>,
    transport: Arc<dyn MediaTransport>,
    output: Arc<dyn AudioOutput>,
) -> Participant {
    init_tracing();
    let (client, events) = bus.connect();
    let deps = SessionDeps {
        identity: Arc::new(Identity::with_id(id(participant), participant, None)),
        bus: Arc::new(client),
        capture,
        transport,
        output,
    };
    let session = VoiceSession::join(config, deps, events).expect("join");
    let handle = session.handle();
    Participant { session, handle }
}

/// A bus client that records everything published on the channel.
pub struct Observer {
    _client: pulse_voice::MemoryBusClient,
    rx: mpsc::Receiver<BusEvent>,
    seen: Vec<(String, Value)>,
}

impl Observer {
    pub fn new(bus: &MemoryBus) -> Self {
        let (client, rx) = bus.connect();
        client.subscribe(&format!("{SCOPE}/#"));
        Self {
            _client: client,
            rx,
            seen: Vec::new(),
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            if let BusEvent::Message { topic, payload } = event {
                self.seen.push((topic, payload));
            }
        }
    }

    /// Presence payloads of `kind` published by `from`.
    pub fn presence_count(&mut self, kind: &str, from: &str) -> usize {
        self.drain();
        let topic = presence_topic();
        self.seen
            .iter()
            .filter(|(t, p)| t == &topic && p["type"] == kind && p["id"] == from)
            .count()
    }
}

/// Remote participant simulated with raw bus publishes.
pub struct Remote {
    pub id: &'static str,
    bus: MemoryBus,
}

impl Remote {
    pub fn new(bus: &MemoryBus, id: &'static str) -> Self {
        Self {
            id,
            bus: bus.clone(),
        }
    }

    pub fn join(&self) {
        self.bus.inject(
            &presence_topic(),
            json!({"type": "join", "id": self.id, "name": self.id.to_uppercase()}),
        );
    }

    pub fn leave(&self) {
        self.bus
            .inject(&presence_topic(), json!({"type": "leave", "id": self.id}));
    }

    pub fn signal(&self, to: &str, data: Value) {
        self.bus.inject(
            &signal_topic(to),
            json!({"type": "signal", "from": self.id, "to": to, "data": data}),
        );
    }
}

/// Wait until `predicate` holds for the session view.
pub async fn wait_view(
    handle: &VoiceHandle,
    what: &str,
    predicate: impl Fn(&SessionView) -> bool,
) -> SessionView {
    let mut rx = handle.watch();
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                let view = rx.borrow().clone();
                assert!(predicate(&view), "session ended while waiting for {what}");
                return view;
            }
        }
    })
    .await;
    match waited {
        Ok(view) => view,
        Err(_) => panic!("timed out waiting for {what}: {:?}", handle.view()),
    }
}

/// Poll `check` until it holds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Give the driver a moment to process anything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
