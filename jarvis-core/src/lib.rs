//! # jarvis-core
//!
//! Real-time voice session engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → MicStream → SPSC RingBuffer → capture loop(spawn_blocking)
//!                                                 │ 16 kHz PCM16 frames
//!                                                 ▼
//!                                             LiveLink ⇄ remote session
//!                                                 │ LinkEvents
//!                                                 ▼
//!            EventQueue ─▶ Orchestrator ─▶ PlaybackScheduler ─▶ PlaybackSink
//!                              │          TurnAggregator
//!                              ▼
//!                 broadcast::Sender<PresentationEvent>
//! ```
//!
//! Device callbacks never block; everything else funnels through one
//! event queue drained by a single coordination loop.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod codec;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod speech;
pub mod transport;
pub mod turn;

// Convenience re-exports for downstream crates
pub use audio::{AudioInput, MicStream};
pub use engine::{
    events::{event_queue, EventSender},
    AssistantEngine, Collaborators, EngineConfig,
};
pub use error::JarvisError;
pub use ipc::events::{Feedback, Message, PresentationEvent, PresentationSnapshot, Role, Status};
pub use playback::PlaybackSink;
pub use speech::{Captioner, FallbackSpeech, NoCaptions};
pub use transport::{LiveConfig, LiveLink, LiveTransport};

#[cfg(feature = "audio-cpal")]
pub use audio::{CpalMicrophone, CpalPlayback};

#[cfg(feature = "live-ws")]
pub use transport::WebSocketTransport;
