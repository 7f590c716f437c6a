//! Local fallback voice backed by a text-to-speech program (`say`, `espeak-ng`).

use jarvis_core::{
    engine::events::{EventSender, SpeechNotice, UtteranceId},
    FallbackSpeech,
};
use tokio::{process::Command, sync::oneshot};
use tracing::{debug, warn};

pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    events: EventSender,
    /// Cancels the utterance in progress, if any.
    active: Option<oneshot::Sender<()>>,
}

impl CommandSpeech {
    pub fn new(program: String, args: Vec<String>, events: EventSender) -> Self {
        Self {
            program,
            args,
            events,
            active: None,
        }
    }

    /// Program arguments for one utterance. `--` ends option parsing so a
    /// reply starting with `-` is spoken rather than parsed as a flag.
    fn argv<'a>(&'a self, text: &'a str) -> Vec<&'a str> {
        self.args
            .iter()
            .map(String::as_str)
            .chain(["--", text])
            .collect()
    }
}

impl FallbackSpeech for CommandSpeech {
    fn speak(&mut self, utterance: UtteranceId, text: &str) {
        self.cancel();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("fallback speech needs an async runtime");
            return;
        };
        let mut child = match Command::new(&self.program)
            .args(self.argv(text))
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program, "fallback speech unavailable: {e}");
                self.events.speech(SpeechNotice::Ended(utterance));
                return;
            }
        };

        self.events.speech(SpeechNotice::Started(utterance));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.active = Some(cancel_tx);
        let events = self.events.clone();

        runtime.spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(s) if !s.success() => warn!(utterance, "speech program exited with {s}"),
                        Err(e) => warn!(utterance, "waiting for speech program: {e}"),
                        _ => {}
                    }
                    events.speech(SpeechNotice::Ended(utterance));
                }
                _ = cancel_rx => {
                    if let Err(e) = child.kill().await {
                        debug!(utterance, "speech program already gone: {e}");
                    }
                }
            }
        });
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.active.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_follows_end_of_options_marker() {
        let (events, _queue) = jarvis_core::event_queue();
        let speech = CommandSpeech::new("espeak-ng".into(), vec!["-v".into(), "en-gb".into()], events);
        assert_eq!(
            speech.argv("-5 degrees outside, sir"),
            vec!["-v", "en-gb", "--", "-5 degrees outside, sir"]
        );
    }
}
