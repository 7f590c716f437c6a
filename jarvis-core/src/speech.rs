//! Local fallback voice and interim captioning capabilities.
//!
//! Both are black boxes to the engine. Fallback speech reports its
//! lifecycle with `SpeechNotice`s; captioning delivers interim text with
//! `EventSender::caption`. Caption text is display-only and never reaches
//! the turn aggregator.

use tracing::debug;

use crate::engine::events::UtteranceId;

/// "Speak this text" when the remote produced text but no audio.
pub trait FallbackSpeech: Send {
    /// Start speaking `text`, replacing any utterance still in progress.
    ///
    /// Implementations send `SpeechNotice::Started(utterance)` when audio
    /// begins and `SpeechNotice::Ended(utterance)` when it finishes.
    fn speak(&mut self, utterance: UtteranceId, text: &str);

    /// Stop whatever is being spoken. Must be a no-op when idle.
    fn cancel(&mut self);
}

/// Local speech-to-text used for live caption display.
pub trait Captioner: Send {
    fn start(&mut self);
    fn stop(&mut self);

    fn restart(&mut self) {
        self.stop();
        self.start();
    }
}

/// Captioner for hosts without a local recognizer.
#[derive(Debug, Default)]
pub struct NoCaptions;

impl Captioner for NoCaptions {
    fn start(&mut self) {
        debug!("captioning unavailable on this host");
    }

    fn stop(&mut self) {}
}
