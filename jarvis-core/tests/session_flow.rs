use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use jarvis_core::buffering::{create_mic_ring, MicProducer, Producer};
use jarvis_core::codec::{ChunkTag, EncodedChunk, CAPTURE_FRAME_SAMPLES};
use jarvis_core::engine::events::{
    event_queue, Control, EngineEvent, EventQueue, EventSender, LinkEvents, LinkId, SpeechNotice,
    UtteranceId,
};
use jarvis_core::engine::{orchestrator::Orchestrator, presenter::Presenter};
use jarvis_core::ipc::events::{LINK_INTERRUPTED, SYSTEM_FAILURE};
use jarvis_core::playback::UnitKey;
use jarvis_core::transport::{LinkEvent, Outbound};
use jarvis_core::{
    AssistantEngine, AudioInput, Captioner, Collaborators, EngineConfig, FallbackSpeech,
    JarvisError, LiveLink, LiveTransport, MicStream, PlaybackSink, PresentationEvent, Role, Status,
};
use parking_lot::Mutex;

// ── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Log {
    mic_opens: usize,
    mic_flags: Vec<Arc<AtomicBool>>,
    mic_producers: Vec<MicProducer>,
    connects: Vec<LinkEvents>,
    links: Vec<Arc<FakeLink>>,
    now: f64,
    scheduled: Vec<(UnitKey, usize, f64)>,
    stopped: Vec<UnitKey>,
    spoken: Vec<(UtteranceId, String)>,
    speech_cancels: usize,
    caption_starts: usize,
    caption_stops: usize,
}

type Shared = Arc<Mutex<Log>>;

struct FakeMic {
    log: Shared,
    fail: bool,
    /// Pushed at open, i.e. captured before the link is up.
    samples: Vec<f32>,
}

impl AudioInput for FakeMic {
    fn open(&self) -> jarvis_core::error::Result<MicStream> {
        let mut log = self.log.lock();
        log.mic_opens += 1;
        if self.fail {
            return Err(JarvisError::AudioDevice("permission denied".into()));
        }
        let (mut producer, consumer) = create_mic_ring();
        producer.push_slice(&self.samples);
        let running = Arc::new(AtomicBool::new(true));
        log.mic_flags.push(Arc::clone(&running));
        log.mic_producers.push(producer);
        Ok(MicStream::new(consumer, 16_000, running))
    }
}

#[derive(Default)]
struct FakeLink {
    sent: Mutex<Vec<Outbound>>,
    closed: AtomicBool,
}

impl LiveLink for FakeLink {
    fn send(&self, message: Outbound) -> jarvis_core::error::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JarvisError::LinkClosed);
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct FakeTransport {
    log: Shared,
    fail: bool,
}

impl LiveTransport for FakeTransport {
    fn connect(&self, events: LinkEvents) -> jarvis_core::error::Result<Arc<dyn LiveLink>> {
        if self.fail {
            return Err(JarvisError::Session("handshake refused".into()));
        }
        let link = Arc::new(FakeLink::default());
        let mut log = self.log.lock();
        log.connects.push(events);
        log.links.push(Arc::clone(&link));
        Ok(link)
    }
}

struct FakeSink {
    log: Shared,
}

impl PlaybackSink for FakeSink {
    fn now(&self) -> f64 {
        self.log.lock().now
    }

    fn schedule(
        &mut self,
        key: UnitKey,
        samples: Vec<f32>,
        _sample_rate: u32,
        start_at: f64,
    ) -> jarvis_core::error::Result<()> {
        self.log.lock().scheduled.push((key, samples.len(), start_at));
        Ok(())
    }

    fn stop(&mut self, key: UnitKey) {
        self.log.lock().stopped.push(key);
    }
}

struct RecordingSpeech {
    log: Shared,
}

impl FallbackSpeech for RecordingSpeech {
    fn speak(&mut self, utterance: UtteranceId, text: &str) {
        self.log.lock().spoken.push((utterance, text.to_string()));
    }

    fn cancel(&mut self) {
        self.log.lock().speech_cancels += 1;
    }
}

struct RecordingCaptions {
    log: Shared,
}

impl Captioner for RecordingCaptions {
    fn start(&mut self) {
        self.log.lock().caption_starts += 1;
    }

    fn stop(&mut self) {
        self.log.lock().caption_stops += 1;
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Options {
    mic_fails: bool,
    connect_fails: bool,
    mic_samples: Vec<f32>,
}

fn collaborators(log: &Shared, opts: Options) -> Collaborators {
    Collaborators {
        input: Arc::new(FakeMic {
            log: Arc::clone(log),
            fail: opts.mic_fails,
            samples: opts.mic_samples,
        }),
        transport: Arc::new(FakeTransport {
            log: Arc::clone(log),
            fail: opts.connect_fails,
        }),
        sink: Box::new(FakeSink {
            log: Arc::clone(log),
        }),
        speech: Box::new(RecordingSpeech {
            log: Arc::clone(log),
        }),
        captions: Box::new(RecordingCaptions {
            log: Arc::clone(log),
        }),
    }
}

struct Harness {
    orch: Orchestrator,
    presenter: Presenter,
    log: Shared,
    _events: EventSender,
    _queue: EventQueue,
}

impl Harness {
    fn new(opts: Options) -> Self {
        let log = Shared::default();
        let (events, queue) = event_queue();
        let presenter = Presenter::new(64);
        let orch = Orchestrator::new(
            EngineConfig::default(),
            collaborators(&log, opts),
            presenter.clone(),
            events.clone(),
        );
        Self {
            orch,
            presenter,
            log,
            _events: events,
            _queue: queue,
        }
    }

    async fn control(&mut self, control: Control) {
        assert!(self.orch.handle(EngineEvent::Control(control)).await);
    }

    async fn link(&mut self, link: LinkId, event: LinkEvent) {
        self.orch.handle(EngineEvent::Link { link, event }).await;
    }

    /// Wake and open link 1.
    async fn open_session(&mut self) {
        self.control(Control::Wake).await;
        self.link(1, LinkEvent::Open).await;
        assert_eq!(self.status(), Status::Listening);
    }

    async fn unit_ended(&mut self, key: UnitKey) {
        self.orch.handle(EngineEvent::UnitEnded(key)).await;
    }

    async fn speech(&mut self, notice: SpeechNotice) {
        self.orch.handle(EngineEvent::Speech(notice)).await;
    }

    fn status(&self) -> Status {
        self.presenter.status()
    }

    fn current_link(&self) -> Arc<FakeLink> {
        Arc::clone(self.log.lock().links.last().expect("a link was opened"))
    }

    /// Feed the most recently opened microphone.
    fn speak_into_mic(&self, samples: &[f32]) {
        let mut log = self.log.lock();
        let producer = log.mic_producers.last_mut().expect("a microphone was opened");
        producer.push_slice(samples);
    }
}

/// 0.1 s of 24 kHz mono speech.
fn speech_chunk() -> LinkEvent {
    LinkEvent::AssistantAudio(EncodedChunk::from_samples(
        &vec![0.1; 2400],
        ChunkTag::pcm16(24_000, 1),
    ))
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    done()
}

// ── Session lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn wake_opens_link_and_open_starts_capture() {
    let mut h = Harness::new(Options::default());

    h.control(Control::Wake).await;
    assert!(h.orch.is_awake());
    assert_eq!(h.log.lock().connects.len(), 1);
    assert_eq!(h.status(), Status::Idle);

    h.link(1, LinkEvent::Open).await;
    assert_eq!(h.status(), Status::Listening);
    assert_eq!(h.log.lock().caption_starts, 1);

    h.speak_into_mic(&vec![0.2; CAPTURE_FRAME_SAMPLES]);
    let link = h.current_link();
    let watch = Arc::clone(&link);
    assert!(wait_until(move || !watch.sent.lock().is_empty()).await);
    let sent = link.sent.lock();
    let Outbound::Audio(chunk) = &sent[0] else {
        panic!("expected an audio frame, got {:?}", sent[0]);
    };
    assert_eq!(chunk.tag, ChunkTag::pcm16(16_000, 1));
}

#[tokio::test]
async fn audio_captured_before_open_is_never_sent() {
    let mut h = Harness::new(Options {
        mic_samples: vec![0.8; CAPTURE_FRAME_SAMPLES * 3],
        ..Options::default()
    });
    h.control(Control::Wake).await;
    h.speak_into_mic(&vec![0.8; CAPTURE_FRAME_SAMPLES]);
    h.link(1, LinkEvent::Open).await;

    let link = h.current_link();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(link.sent.lock().is_empty());

    h.speak_into_mic(&vec![-0.3; CAPTURE_FRAME_SAMPLES]);
    let watch = Arc::clone(&link);
    assert!(wait_until(move || !watch.sent.lock().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = link.sent.lock();
    assert_eq!(sent.len(), 1);
    let Outbound::Audio(chunk) = &sent[0] else {
        panic!("expected an audio frame, got {:?}", sent[0]);
    };
    let frame = &chunk.decode().expect("valid pcm")[0];
    assert!(frame.iter().all(|s| (s + 0.3).abs() < 1e-3));
}

#[tokio::test]
async fn wake_while_awake_is_ignored() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.control(Control::Wake).await;
    let log = h.log.lock();
    assert_eq!(log.mic_opens, 1);
    assert_eq!(log.connects.len(), 1);
}

#[tokio::test]
async fn remote_error_before_open_leaves_error_and_no_session() {
    let mut h = Harness::new(Options {
        mic_samples: vec![0.2; CAPTURE_FRAME_SAMPLES * 2],
        ..Options::default()
    });

    h.control(Control::Wake).await;
    h.link(1, LinkEvent::Error("quota exceeded".into())).await;

    assert_eq!(h.status(), Status::Error);
    let snapshot = h.presenter.snapshot();
    assert_eq!(snapshot.last_error.as_deref(), Some(LINK_INTERRUPTED));
    assert!(!snapshot.awake);

    let link = h.current_link();
    assert!(link.closed.load(Ordering::Acquire));
    assert!(!h.log.lock().mic_flags[0].load(Ordering::Acquire));

    // A late open from the dead link must not start capture.
    h.link(1, LinkEvent::Open).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.status(), Status::Error);
    assert!(link.sent.lock().is_empty());
    assert_eq!(h.log.lock().caption_starts, 0);
}

#[tokio::test]
async fn microphone_denial_fails_wake_without_connecting() {
    let mut h = Harness::new(Options {
        mic_fails: true,
        ..Options::default()
    });
    h.control(Control::Wake).await;

    assert_eq!(h.status(), Status::Error);
    assert_eq!(h.presenter.snapshot().last_error.as_deref(), Some(SYSTEM_FAILURE));
    assert!(!h.orch.is_awake());
    assert!(h.log.lock().connects.is_empty());
}

#[tokio::test]
async fn connect_failure_releases_microphone() {
    let mut h = Harness::new(Options {
        connect_fails: true,
        ..Options::default()
    });
    h.control(Control::Wake).await;

    assert_eq!(h.status(), Status::Error);
    assert_eq!(h.presenter.snapshot().last_error.as_deref(), Some(SYSTEM_FAILURE));
    let log = h.log.lock();
    assert_eq!(log.mic_opens, 1);
    assert!(!log.mic_flags[0].load(Ordering::Acquire));
}

#[tokio::test]
async fn rewake_after_error_clears_error_on_open() {
    let mut h = Harness::new(Options::default());
    let mut rx = h.presenter.subscribe();
    h.control(Control::Wake).await;
    h.link(1, LinkEvent::Error("boom".into())).await;
    assert_eq!(h.status(), Status::Error);

    h.control(Control::Wake).await;
    h.link(2, LinkEvent::Open).await;
    assert_eq!(h.status(), Status::Listening);
    assert!(h.presenter.snapshot().last_error.is_none());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let surfaced = events
        .iter()
        .position(|e| matches!(e, PresentationEvent::Error { code } if code == LINK_INTERRUPTED))
        .expect("error surfaced");
    let cleared = events
        .iter()
        .position(|e| matches!(e, PresentationEvent::ErrorCleared))
        .expect("clearing broadcast");
    assert!(surfaced < cleared);
}

#[tokio::test]
async fn shutdown_twice_is_idle_with_one_cancel() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.orch
        .handle(EngineEvent::Caption("what is".into()))
        .await;
    assert_eq!(h.presenter.snapshot().caption, "what is");

    h.control(Control::Shutdown).await;
    assert_eq!(h.status(), Status::Idle);
    h.control(Control::Shutdown).await;
    assert_eq!(h.status(), Status::Idle);

    let snapshot = h.presenter.snapshot();
    assert!(snapshot.caption.is_empty());
    assert!(!snapshot.awake);
    let log = h.log.lock();
    assert_eq!(log.speech_cancels, 1);
    assert_eq!(log.caption_stops, 1);
    assert!(log.links[0].closed.load(Ordering::Acquire));
}

#[tokio::test]
async fn remote_close_clears_awake_but_lets_playback_finish() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, speech_chunk()).await;
    assert_eq!(h.status(), Status::Speaking);

    h.link(1, LinkEvent::Closed).await;
    assert!(!h.orch.is_awake());
    assert_eq!(h.status(), Status::Speaking);
    assert!(h.log.lock().stopped.is_empty());

    let key = h.log.lock().scheduled[0].0;
    h.unit_ended(key).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn events_from_previous_link_are_dropped() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.control(Control::Shutdown).await;
    h.control(Control::Wake).await;
    h.link(2, LinkEvent::Open).await;

    h.link(1, speech_chunk()).await;
    h.link(1, LinkEvent::AssistantTranscript("ghost".into())).await;
    h.link(1, LinkEvent::TurnComplete).await;

    assert!(h.log.lock().scheduled.is_empty());
    assert!(h.presenter.snapshot().messages.is_empty());
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn manual_listen_wakes_when_asleep_and_refocuses_when_awake() {
    let mut h = Harness::new(Options::default());
    h.control(Control::ManualListen).await;
    assert!(h.orch.is_awake());
    assert_eq!(h.log.lock().connects.len(), 1);

    h.link(1, LinkEvent::Open).await;
    h.link(1, LinkEvent::UserTranscript("hm".into())).await;
    assert_eq!(h.status(), Status::Thinking);

    h.control(Control::ManualListen).await;
    assert_eq!(h.status(), Status::Listening);
    let log = h.log.lock();
    assert_eq!(log.connects.len(), 1);
    assert_eq!(log.caption_starts, 2);
    assert_eq!(log.caption_stops, 1);
}

// ── Turns ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_only_turn_falls_back_to_local_speech() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;

    h.link(1, LinkEvent::AssistantTranscript("Hello".into())).await;
    h.link(1, LinkEvent::AssistantTranscript(" sir".into())).await;
    h.link(1, LinkEvent::TurnComplete).await;

    let messages = h.presenter.snapshot().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].text, "Hello sir");
    assert_eq!(h.status(), Status::Listening);

    let (utterance, text) = h.log.lock().spoken[0].clone();
    assert_eq!(h.log.lock().spoken.len(), 1);
    assert_eq!(text, "Hello sir");

    h.speech(SpeechNotice::Started(utterance)).await;
    assert_eq!(h.status(), Status::Speaking);
    h.speech(SpeechNotice::Ended(utterance)).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn turn_with_audio_emits_both_messages_without_fallback() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;

    h.link(1, LinkEvent::UserTranscript("what time".into())).await;
    assert_eq!(h.status(), Status::Thinking);
    h.orch.handle(EngineEvent::Caption("what ti".into())).await;
    h.link(1, speech_chunk()).await;
    assert_eq!(h.status(), Status::Speaking);
    h.link(1, LinkEvent::AssistantTranscript("Nine, sir.".into())).await;
    h.link(1, LinkEvent::TurnComplete).await;

    let snapshot = h.presenter.snapshot();
    let roles: Vec<Role> = snapshot.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(snapshot.messages[0].text, "what time");
    assert!(snapshot.caption.is_empty());
    assert!(h.log.lock().spoken.is_empty());
    // Still playing: turn-complete does not pre-empt SPEAKING.
    assert_eq!(h.status(), Status::Speaking);

    let key = h.log.lock().scheduled[0].0;
    h.unit_ended(key).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn stale_fallback_notices_are_ignored() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, LinkEvent::AssistantTranscript("First.".into())).await;
    h.link(1, LinkEvent::TurnComplete).await;
    let first = h.log.lock().spoken[0].0;

    h.link(1, LinkEvent::Interrupted).await;
    h.speech(SpeechNotice::Started(first)).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn user_speech_wins_over_drained_playback() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, speech_chunk()).await;
    h.link(1, LinkEvent::UserTranscript("wait".into())).await;
    assert_eq!(h.status(), Status::Thinking);

    let key = h.log.lock().scheduled[0].0;
    h.unit_ended(key).await;
    assert_eq!(h.status(), Status::Thinking);
}

#[tokio::test]
async fn blank_user_delta_does_not_change_status() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, LinkEvent::UserTranscript("   ".into())).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn malformed_chunk_is_dropped_silently() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    let bad = EncodedChunk {
        data: "AAE=AAE".into(),
        tag: ChunkTag::pcm16(24_000, 1),
    };
    h.link(1, LinkEvent::AssistantAudio(bad)).await;
    let odd = EncodedChunk {
        data: "AAEC".into(), // three bytes
        tag: ChunkTag::pcm16(24_000, 1),
    };
    h.link(1, LinkEvent::AssistantAudio(odd)).await;

    assert_eq!(h.status(), Status::Listening);
    assert_eq!(h.orch.playback().live_len(), 0);
    assert!(h.presenter.snapshot().last_error.is_none());
}

#[tokio::test]
async fn text_query_is_sent_and_logged_once_open() {
    let mut h = Harness::new(Options::default());
    h.control(Control::Wake).await;
    h.control(Control::SendText("too early".into())).await;
    assert!(h.current_link().sent.lock().is_empty());

    h.link(1, LinkEvent::Open).await;
    h.control(Control::SendText("  weather in London ".into())).await;

    assert_eq!(h.status(), Status::Thinking);
    let messages = h.presenter.snapshot().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "weather in London");
    let sent = h.current_link().sent.lock().clone();
    assert!(sent.contains(&Outbound::Text("weather in London".into())));
}

#[tokio::test]
async fn feedback_tags_existing_message() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, LinkEvent::AssistantTranscript("Done.".into())).await;
    h.link(1, LinkEvent::TurnComplete).await;

    h.control(Control::Feedback {
        index: 0,
        feedback: jarvis_core::Feedback::Up,
    })
    .await;
    let messages = h.presenter.snapshot().messages;
    assert_eq!(messages[0].feedback, Some(jarvis_core::Feedback::Up));
    assert_eq!(messages[0].text, "Done.");
}

// ── Playback & interruption ─────────────────────────────────────────────────

#[tokio::test]
async fn consecutive_chunks_are_scheduled_back_to_back() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.log.lock().now = 1.0;

    for _ in 0..3 {
        h.link(1, speech_chunk()).await;
    }
    let starts: Vec<f64> = h.log.lock().scheduled.iter().map(|s| s.2).collect();
    assert_eq!(starts.len(), 3);
    assert!((starts[0] - 1.0).abs() < 1e-9);
    assert!((starts[1] - 1.1).abs() < 1e-9);
    assert!((starts[2] - 1.2).abs() < 1e-9);

    // Finishing everything but the newest unit keeps SPEAKING.
    let keys: Vec<UnitKey> = h.log.lock().scheduled.iter().map(|s| s.0).collect();
    h.unit_ended(keys[0]).await;
    h.unit_ended(keys[1]).await;
    assert_eq!(h.status(), Status::Speaking);
    h.unit_ended(keys[2]).await;
    assert_eq!(h.status(), Status::Listening);
}

#[tokio::test]
async fn interruption_flushes_playback_and_resets_timeline() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.log.lock().now = 5.0;
    h.link(1, speech_chunk()).await;
    h.link(1, speech_chunk()).await;
    let old: Vec<UnitKey> = h.log.lock().scheduled.iter().map(|s| s.0).collect();

    h.link(1, LinkEvent::Interrupted).await;
    assert_eq!(h.status(), Status::Listening);
    assert_eq!(h.orch.playback().live_len(), 0);
    assert_eq!(h.orch.playback().next_start(), 0.0);
    {
        let log = h.log.lock();
        assert_eq!(log.stopped, old);
        assert_eq!(log.speech_cancels, 1);
    }

    // The next unit starts at the clock, not after the flushed backlog.
    h.log.lock().now = 5.05;
    h.link(1, speech_chunk()).await;
    let (fresh, _, start_at) = *h.log.lock().scheduled.last().unwrap();
    assert!((start_at - 5.05).abs() < 1e-9);
    assert_ne!(fresh.generation, old[0].generation);

    // Late completions from the flushed units are no-ops.
    for key in old {
        h.unit_ended(key).await;
    }
    assert_eq!(h.status(), Status::Speaking);
    assert_eq!(h.orch.playback().live_len(), 1);
}

#[tokio::test]
async fn remote_error_flushes_playback() {
    let mut h = Harness::new(Options::default());
    h.open_session().await;
    h.link(1, speech_chunk()).await;
    h.link(1, LinkEvent::Error("internal".into())).await;

    assert_eq!(h.status(), Status::Error);
    assert_eq!(h.orch.playback().live_len(), 0);
    assert_eq!(h.log.lock().stopped.len(), 1);
    assert!(!h.orch.is_awake());
}

// ── Engine handle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn engine_handle_drives_loop_and_broadcasts_status() {
    let log = Shared::default();
    let (events, queue) = event_queue();
    let engine = AssistantEngine::spawn(
        EngineConfig::default(),
        collaborators(&log, Options::default()),
        events,
        queue,
    );
    let mut rx = engine.subscribe();

    engine.wake().expect("engine running");
    let watch = Arc::clone(&log);
    assert!(wait_until(move || !watch.lock().connects.is_empty()).await);
    let link_events = log.lock().connects[0].clone();
    assert!(link_events.emit(LinkEvent::Open));

    let status = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(PresentationEvent::Status { status }) => break status,
                Ok(_) => continue,
                Err(e) => panic!("presentation stream ended: {e}"),
            }
        }
    })
    .await
    .expect("status event");
    assert_eq!(status, Status::Listening);
    assert_eq!(engine.status(), Status::Listening);

    engine.terminate().await;
    assert_eq!(engine.status(), Status::Idle);
    assert!(engine.wake().is_err());
}
