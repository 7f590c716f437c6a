//! Per-turn transcript accumulation.
//!
//! Deltas for both parties are appended until the remote signals
//! turn-complete; [`TurnAggregator::complete`] then emits the finalized
//! messages and resets in one `&mut self` call, so no delta of the next
//! turn can land before the buffers are cleared.

use crate::ipc::events::{Message, Role};

/// Accumulated text for the turn in progress.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnBuffer {
    pub user: String,
    pub assistant: String,
}

/// Result of closing a turn.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnOutcome {
    pub user: Option<Message>,
    pub assistant: Option<Message>,
    /// Assistant text that reached us without any audio this turn; the
    /// caller speaks it with the local fallback voice.
    pub fallback_speech: Option<String>,
}

impl TurnOutcome {
    /// Finalized messages in log order (user first).
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.user.iter().chain(self.assistant.iter())
    }
}

#[derive(Debug, Default)]
pub struct TurnAggregator {
    buffer: TurnBuffer,
    audio_received: bool,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_assistant(&mut self, delta: &str) {
        self.buffer.assistant.push_str(delta);
    }

    /// Append a user delta. Returns `true` when it carries visible text,
    /// i.e. the user is mid-utterance.
    pub fn push_user(&mut self, delta: &str) -> bool {
        self.buffer.user.push_str(delta);
        !delta.trim().is_empty()
    }

    /// Record that a playback unit was scheduled during this turn.
    pub fn mark_audio_received(&mut self) {
        self.audio_received = true;
    }

    pub fn audio_received(&self) -> bool {
        self.audio_received
    }

    pub fn buffer(&self) -> &TurnBuffer {
        &self.buffer
    }

    /// Close the turn at `timestamp` (epoch ms) and reset for the next one.
    pub fn complete(&mut self, timestamp: i64) -> TurnOutcome {
        let buffer = std::mem::take(&mut self.buffer);
        let audio_received = std::mem::replace(&mut self.audio_received, false);

        let user =
            (!buffer.user.is_empty()).then(|| Message::new(Role::User, buffer.user, timestamp));

        let mut outcome = TurnOutcome {
            user,
            ..TurnOutcome::default()
        };
        if !buffer.assistant.is_empty() {
            if !audio_received {
                outcome.fallback_speech = Some(buffer.assistant.clone());
            }
            outcome.assistant = Some(Message::new(Role::Assistant, buffer.assistant, timestamp));
        }
        outcome
    }

    /// Drop the turn in progress without emitting anything.
    pub fn reset(&mut self) {
        self.buffer = TurnBuffer::default();
        self.audio_received = false;
    }
}
