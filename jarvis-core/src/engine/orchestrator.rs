//! The coordination loop: sole owner and writer of session state.
//!
//! ## State machine
//!
//! ```text
//!            wake ok            link open
//!  IDLE ─────────────▶ (awake) ───────────▶ LISTENING ⇄ THINKING ⇄ SPEAKING
//!   ▲                     │                      │
//!   │ shutdown            │ acquisition failure  │ remote error
//!   └──── any state       ▼                      ▼
//!                       ERROR ◀──────────────────┘
//! ```
//!
//! Every input arrives as one [`EngineEvent`] on a single queue and is
//! applied to completion before the next is read, so turn boundaries,
//! interruption and scheduling never interleave. The only suspension
//! point inside a handler is microphone acquisition during wake.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{
    events::{Control, EngineEvent, EventQueue, EventSender, LinkId, SpeechNotice, UtteranceId},
    presenter::Presenter,
    Collaborators, EngineConfig,
};
use crate::{
    audio::{AudioInput, MicStream},
    capture::CaptureHandle,
    codec::EncodedChunk,
    error::JarvisError,
    ipc::events::{Feedback, Message, Role, Status, LINK_INTERRUPTED, SYSTEM_FAILURE},
    playback::{PlaybackScheduler, UnitEnd, UnitKey},
    speech::{Captioner, FallbackSpeech},
    transport::{LinkEvent, LiveLink, LiveTransport, Outbound},
    turn::TurnAggregator,
};

/// The one live link of the current awake period.
struct Session {
    id: LinkId,
    link: Arc<dyn LiveLink>,
    /// Held from wake until the link reports open, then moved into capture.
    mic: Option<MicStream>,
    capture: Option<CaptureHandle>,
}

impl Session {
    fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    /// Stop capture and close the link. Idempotent.
    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let stats = capture.diagnostics();
            capture.stop();
            debug!(
                link = self.id,
                frames_sent = stats.frames_sent,
                frames_dropped = stats.frames_dropped,
                "session capture closed"
            );
        }
        self.mic.take();
        self.link.close();
    }
}

pub struct Orchestrator {
    config: EngineConfig,
    presenter: Presenter,
    events: EventSender,
    input: Arc<dyn AudioInput>,
    transport: Arc<dyn LiveTransport>,
    speech: Box<dyn FallbackSpeech>,
    captions: Box<dyn Captioner>,
    playback: PlaybackScheduler,
    turns: TurnAggregator,
    session: Option<Session>,
    next_link: LinkId,
    utterance: Option<UtteranceId>,
    next_utterance: UtteranceId,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        presenter: Presenter,
        events: EventSender,
    ) -> Self {
        let Collaborators {
            input,
            transport,
            sink,
            speech,
            captions,
        } = collaborators;
        let playback = PlaybackScheduler::new(sink, config.output_sample_rate);
        Self {
            config,
            presenter,
            events,
            input,
            transport,
            speech,
            captions,
            playback,
            turns: TurnAggregator::new(),
            session: None,
            next_link: 0,
            utterance: None,
            next_utterance: 0,
        }
    }

    /// Drain `queue` until `Control::Terminate`.
    pub async fn run(mut self, mut queue: EventQueue) {
        info!("coordination loop started");
        while let Some(event) = queue.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        self.shutdown();
        info!("coordination loop stopped");
    }

    /// Apply one event. Returns `false` when the loop should exit.
    pub async fn handle(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Control(Control::Terminate) => return false,
            EngineEvent::Control(control) => self.on_control(control).await,
            EngineEvent::Link { link, event } => {
                if self.session.as_ref().map(|s| s.id) == Some(link) {
                    info_span!("link", link).in_scope(|| self.on_link(event));
                } else {
                    debug!(link, ?event, "event from stale link dropped");
                }
            }
            EngineEvent::UnitEnded(key) => self.on_unit_ended(key),
            EngineEvent::Speech(notice) => self.on_speech(notice),
            EngineEvent::Caption(text) => {
                if self.presenter.awake() {
                    self.presenter.set_caption(text);
                }
            }
        }
        true
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn is_awake(&self) -> bool {
        self.presenter.awake()
    }

    // ── Controls ────────────────────────────────────────────────────────────

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::Wake => self.wake().await,
            Control::ManualListen => self.manual_listen().await,
            Control::Shutdown => self.shutdown(),
            Control::SendText(text) => self.send_text(text),
            Control::Feedback { index, feedback } => self.set_feedback(index, feedback),
            Control::Terminate => {}
        }
    }

    async fn wake(&mut self) {
        if self.presenter.awake() {
            debug!("wake ignored: already awake");
            return;
        }

        let input = Arc::clone(&self.input);
        let acquired = tokio::task::spawn_blocking(move || input.open())
            .instrument(info_span!("acquire_microphone"))
            .await;
        let mic = match acquired {
            Ok(Ok(mic)) => mic,
            Ok(Err(e)) => return self.fail_wake(JarvisError::Acquisition(e.to_string())),
            Err(e) => return self.fail_wake(JarvisError::Acquisition(e.to_string())),
        };

        self.next_link += 1;
        let id = self.next_link;
        match self.transport.connect(self.events.for_link(id)) {
            Ok(link) => {
                info!(link = id, capture_rate = mic.sample_rate, "session opening");
                self.session = Some(Session {
                    id,
                    link,
                    mic: Some(mic),
                    capture: None,
                });
                self.presenter.set_awake(true);
            }
            Err(e) => {
                drop(mic);
                self.fail_wake(JarvisError::Acquisition(e.to_string()));
            }
        }
    }

    fn fail_wake(&mut self, err: JarvisError) {
        error!("wake failed: {err}");
        self.session = None;
        self.presenter.set_status(Status::Error);
        self.presenter.set_error(SYSTEM_FAILURE);
    }

    async fn manual_listen(&mut self) {
        if !self.presenter.awake() {
            self.wake().await;
            return;
        }
        self.presenter.set_status(Status::Listening);
        self.captions.restart();
    }

    /// Explicit sleep. No-op when nothing is running.
    fn shutdown(&mut self) {
        if !self.presenter.awake()
            && self.session.is_none()
            && self.presenter.status() == Status::Idle
        {
            debug!("shutdown ignored: already idle");
            return;
        }
        info!("shutting down session");
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.captions.stop();
        self.speech.cancel();
        self.utterance = None;
        self.presenter.clear_caption();
        self.playback.cancel_all();
        self.turns.reset();
        self.presenter.set_awake(false);
        self.presenter.set_status(Status::Idle);
    }

    fn send_text(&mut self, text: String) {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }
        let Some(session) = self.session.as_ref().filter(|s| s.is_open()) else {
            warn!("text query ignored: no open session");
            return;
        };
        if let Err(e) = session.link.send(Outbound::Text(text.clone())) {
            warn!("text query dropped: {e}");
            return;
        }
        self.presenter.push_message(Message::new(Role::User, text, now_ms()));
        self.presenter.set_status(Status::Thinking);
    }

    fn set_feedback(&mut self, index: usize, feedback: Feedback) {
        self.presenter.set_feedback(index, feedback);
    }

    // ── Inbound link traffic ────────────────────────────────────────────────

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Open => self.on_open(),
            LinkEvent::AssistantAudio(chunk) => self.on_assistant_audio(&chunk),
            LinkEvent::AssistantTranscript(delta) => self.turns.push_assistant(&delta),
            LinkEvent::UserTranscript(delta) => {
                if self.turns.push_user(&delta) {
                    self.presenter.set_status(Status::Thinking);
                }
            }
            LinkEvent::TurnComplete => self.on_turn_complete(),
            LinkEvent::Interrupted => self.interrupt(),
            LinkEvent::Error(reason) => self.on_remote_error(&reason),
            LinkEvent::Closed => self.on_remote_closed(),
        }
    }

    fn on_open(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_open() {
            debug!("duplicate open ignored");
            return;
        }
        let Some(mic) = session.mic.take() else {
            warn!("link opened without a microphone");
            return;
        };
        session.capture = Some(CaptureHandle::start(
            mic,
            Arc::clone(&session.link),
            self.config.input_sample_rate,
            self.config.frame_samples,
        ));
        info!("session open");
        self.captions.start();
        self.presenter.clear_error();
        self.presenter.set_status(Status::Listening);
    }

    fn on_assistant_audio(&mut self, chunk: &EncodedChunk) {
        match self.playback.enqueue(chunk) {
            Ok(Some(_)) => {
                self.turns.mark_audio_received();
                self.presenter.set_status(Status::Speaking);
            }
            Ok(None) => {}
            Err(e) => warn!("inbound audio chunk dropped: {e}"),
        }
    }

    fn on_turn_complete(&mut self) {
        let outcome = self.turns.complete(now_ms());
        if let Some(user) = outcome.user {
            self.presenter.push_message(user);
            self.presenter.clear_caption();
        }
        if let Some(assistant) = outcome.assistant {
            self.presenter.push_message(assistant);
        }
        if let Some(text) = outcome.fallback_speech {
            self.next_utterance += 1;
            let utterance = self.next_utterance;
            debug!(utterance, "no audio this turn; speaking locally");
            self.utterance = Some(utterance);
            self.speech.speak(utterance, &text);
        }
        if self.presenter.status() != Status::Speaking {
            self.presenter.set_status(Status::Listening);
        }
    }

    /// Barge-in: flush everything audible and return to listening.
    fn interrupt(&mut self) {
        let cancelled = self.playback.cancel_all();
        self.speech.cancel();
        self.utterance = None;
        info!(cancelled, "assistant interrupted");
        self.presenter.set_status(Status::Listening);
    }

    fn on_remote_error(&mut self, reason: &str) {
        error!("live session error: {reason}");
        self.presenter.set_status(Status::Error);
        self.presenter.set_error(LINK_INTERRUPTED);
        self.teardown(true);
    }

    fn on_remote_closed(&mut self) {
        info!("live session closed by remote");
        self.teardown(false);
    }

    /// Drop the current session after a remote-side end. Status is left to
    /// the caller.
    fn teardown(&mut self, flush_playback: bool) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.captions.stop();
        if flush_playback {
            self.playback.cancel_all();
            self.speech.cancel();
            self.utterance = None;
        }
        self.turns.reset();
        self.presenter.set_awake(false);
    }

    // ── Device / capability notifications ──────────────────────────────────

    fn on_unit_ended(&mut self, key: UnitKey) {
        if self.playback.on_unit_ended(key) == UnitEnd::Drained
            && self.presenter.status() == Status::Speaking
        {
            self.presenter.set_status(Status::Listening);
        }
    }

    fn on_speech(&mut self, notice: SpeechNotice) {
        match notice {
            SpeechNotice::Started(id) if self.utterance == Some(id) => {
                self.presenter.set_status(Status::Speaking);
            }
            SpeechNotice::Ended(id) if self.utterance == Some(id) => {
                self.utterance = None;
                self.presenter.set_status(Status::Listening);
            }
            other => debug!(?other, "stale speech notice ignored"),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
