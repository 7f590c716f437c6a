//! Duplex live-session capability.
//!
//! The engine only sees [`LiveTransport`] (open a link) and [`LiveLink`]
//! (send, close). Inbound traffic arrives as [`LinkEvent`]s pushed into the
//! engine's event queue through [`LinkEvents`], tagged with the link id so
//! late events from a torn-down link are recognised and dropped.
//!
//! The exact wire schema lives in [`protocol`]; [`websocket`] is the default
//! adapter.

pub mod protocol;

#[cfg(feature = "live-ws")]
pub mod websocket;

#[cfg(feature = "live-ws")]
pub use websocket::WebSocketTransport;

use std::sync::Arc;

use crate::{codec::EncodedChunk, engine::events::LinkEvents, error::Result};

/// Client → remote traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// One captured microphone frame.
    Audio(EncodedChunk),
    /// A typed user query sent as a complete turn.
    Text(String),
}

/// Remote → client traffic, one logical event each.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The remote accepted the session; outbound traffic may flow.
    Open,
    AssistantAudio(EncodedChunk),
    AssistantTranscript(String),
    UserTranscript(String),
    TurnComplete,
    /// The remote heard the user speak over playback.
    Interrupted,
    /// Runtime failure reported by (or on the way to) the remote.
    Error(String),
    Closed,
}

/// An open (or opening) duplex session.
///
/// Both methods are non-blocking and safe to call from any thread.
pub trait LiveLink: Send + Sync {
    /// Queue `message` for sending. Fire-and-forget: there is no
    /// acknowledgement and no retry.
    ///
    /// # Errors
    /// `JarvisError::LinkClosed` once the link is closed, or when the
    /// outbound queue is full (the message is dropped).
    fn send(&self, message: Outbound) -> Result<()>;

    /// Begin closing. Idempotent; a `LinkEvent::Closed` follows.
    fn close(&self);
}

/// Factory for [`LiveLink`]s.
pub trait LiveTransport: Send + Sync {
    /// Start opening a session. Must return without waiting for the
    /// remote; the handshake outcome arrives later as `LinkEvent::Open`
    /// or `LinkEvent::Error`.
    fn connect(&self, events: LinkEvents) -> Result<Arc<dyn LiveLink>>;
}

/// Live session settings.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Websocket endpoint, without the key query parameter.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Prebuilt voice used for synthesized replies.
    pub voice: String,
    /// Persona instruction sent with the session setup.
    pub system_instruction: String,
    /// Ask the remote to stream transcripts of both parties.
    pub transcription: bool,
    /// Let the remote ground answers with web search.
    pub web_search: bool,
    /// Outbound queue depth; frames beyond it are dropped.
    pub outbound_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            api_key: String::new(),
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".into(),
            voice: "Charon".into(),
            system_instruction: "You are JARVIS, a composed British butler-style AI assistant. \
                Speak briefly and precisely, address the user as 'sir' or 'ma'am', \
                and use web search for anything time-sensitive."
                .into(),
            transcription: true,
            web_search: true,
            outbound_capacity: 64,
        }
    }
}
