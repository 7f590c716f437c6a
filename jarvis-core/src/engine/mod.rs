//! `AssistantEngine`: handle onto the coordination loop.
//!
//! ## Lifecycle
//!
//! ```text
//! event_queue()                      → (EventSender, EventQueue)
//!     └─► build collaborators with EventSender clones
//!         └─► AssistantEngine::spawn() → coordination loop on the runtime
//!             ├─► wake() / listen()    → mic acquired, link opening
//!             ├─► shutdown()           → back to IDLE (idempotent)
//!             └─► terminate().await    → shutdown + loop exits
//! ```
//!
//! Every method only enqueues a [`Control`]; state changes are observed
//! through [`AssistantEngine::snapshot`] or [`AssistantEngine::subscribe`].
//!
//! ## Threading
//!
//! The handle is `Send + Sync`. Wrap it in `Arc` to share between the
//! operator input task and event forwarders.

pub mod events;
pub mod orchestrator;
pub mod presenter;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    audio::AudioInput,
    codec::{CAPTURE_FRAME_SAMPLES, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE},
    error::{JarvisError, Result},
    ipc::events::{Feedback, PresentationEvent, PresentationSnapshot, Status},
    playback::PlaybackSink,
    speech::{Captioner, FallbackSpeech},
    transport::LiveTransport,
};

use self::{
    events::{Control, EventQueue, EventSender},
    orchestrator::Orchestrator,
    presenter::Presenter,
};

/// Broadcast channel capacity: 256 presentation events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `AssistantEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rate of outbound capture frames (Hz). Audio captured at other rates
    /// is resampled. Default: 16000.
    pub input_sample_rate: u32,
    /// Samples per outbound frame. Default: 4096.
    pub frame_samples: usize,
    /// Rate assumed for inbound speech chunks whose tag carries none.
    /// Default: 24000.
    pub output_sample_rate: u32,
    /// Presentation event buffer per subscriber. Default: 256.
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            frame_samples: CAPTURE_FRAME_SAMPLES,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            broadcast_capacity: BROADCAST_CAP,
        }
    }
}

/// The capabilities the engine drives. All are owned by the loop.
pub struct Collaborators {
    pub input: Arc<dyn AudioInput>,
    pub transport: Arc<dyn LiveTransport>,
    pub sink: Box<dyn PlaybackSink>,
    pub speech: Box<dyn FallbackSpeech>,
    pub captions: Box<dyn Captioner>,
}

/// The top-level engine handle.
pub struct AssistantEngine {
    events: EventSender,
    presenter: Presenter,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AssistantEngine {
    /// Start the coordination loop on the current Tokio runtime.
    ///
    /// `events` must be the sender paired with `queue`; collaborators that
    /// report back (playback sink, fallback speech, captioner) should hold
    /// clones of it.
    pub fn spawn(
        config: EngineConfig,
        collaborators: Collaborators,
        events: EventSender,
        queue: EventQueue,
    ) -> Self {
        let presenter = Presenter::new(config.broadcast_capacity);
        let orchestrator =
            Orchestrator::new(config, collaborators, presenter.clone(), events.clone());
        let task = tokio::spawn(orchestrator.run(queue));
        info!("assistant engine started");

        Self {
            events,
            presenter,
            task: Mutex::new(Some(task)),
        }
    }

    /// Acquire the microphone and open the live session.
    ///
    /// # Errors
    /// `JarvisError::Session` if the engine loop has stopped.
    pub fn wake(&self) -> Result<()> {
        self.control(Control::Wake)
    }

    /// Re-focus: wake if asleep, otherwise return to listening.
    pub fn listen(&self) -> Result<()> {
        self.control(Control::ManualListen)
    }

    /// Close the session and return to `IDLE`. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        self.control(Control::Shutdown)
    }

    /// Send a typed query over the open session.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.control(Control::SendText(text.into()))
    }

    pub fn set_feedback(&self, index: usize, feedback: Feedback) -> Result<()> {
        self.control(Control::Feedback { index, feedback })
    }

    pub fn status(&self) -> Status {
        self.presenter.status()
    }

    pub fn snapshot(&self) -> PresentationSnapshot {
        self.presenter.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.presenter.subscribe()
    }

    /// Shut down and wait for the loop to exit.
    pub async fn terminate(&self) {
        if self.events.control(Control::Terminate) {
            info!("terminating assistant engine");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("coordination loop ended abnormally: {e}");
            }
        }
    }

    fn control(&self, control: Control) -> Result<()> {
        if self.events.control(control) {
            Ok(())
        } else {
            Err(JarvisError::Session("engine loop has stopped".into()))
        }
    }
}
