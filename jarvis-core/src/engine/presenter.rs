//! Presentation state: the snapshot read by commands and the change stream
//! broadcast to subscribers.
//!
//! Only the coordination loop writes. Readers take the lock briefly to
//! clone; no lock is held across an await.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ipc::events::{Feedback, Message, PresentationEvent, PresentationSnapshot, Status};

#[derive(Clone)]
pub struct Presenter {
    state: Arc<Mutex<PresentationSnapshot>>,
    events: broadcast::Sender<PresentationEvent>,
}

impl Presenter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(Mutex::new(PresentationSnapshot::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> PresentationSnapshot {
        self.state.lock().clone()
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    pub fn awake(&self) -> bool {
        self.state.lock().awake
    }

    /// Write the status. Broadcasts only when it actually changes.
    pub fn set_status(&self, status: Status) {
        let previous = std::mem::replace(&mut self.state.lock().status, status);
        if previous != status {
            info!(from = ?previous, to = ?status, "status changed");
            self.broadcast(PresentationEvent::Status { status });
        }
    }

    pub fn set_awake(&self, awake: bool) {
        let previous = std::mem::replace(&mut self.state.lock().awake, awake);
        if previous != awake {
            self.broadcast(PresentationEvent::Awake { awake });
        }
    }

    /// Append a finalized message to the log.
    pub fn push_message(&self, message: Message) {
        let index = {
            let mut state = self.state.lock();
            state.messages.push(message.clone());
            state.messages.len() - 1
        };
        debug!(index, role = ?message.role, "message appended");
        self.broadcast(PresentationEvent::Message { index, message });
    }

    /// Attach feedback to an existing message. Unknown indices are ignored.
    pub fn set_feedback(&self, index: usize, feedback: Feedback) {
        {
            let mut state = self.state.lock();
            let Some(message) = state.messages.get_mut(index) else {
                warn!(index, "feedback for unknown message ignored");
                return;
            };
            message.feedback = Some(feedback);
        }
        self.broadcast(PresentationEvent::Feedback { index, feedback });
    }

    pub fn set_caption(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut state = self.state.lock();
            if state.caption == text {
                return;
            }
            state.caption.clone_from(&text);
        }
        self.broadcast(PresentationEvent::Caption { text });
    }

    pub fn clear_caption(&self) {
        self.set_caption(String::new());
    }

    /// Record a failure code for display.
    pub fn set_error(&self, code: &str) {
        self.state.lock().last_error = Some(code.to_owned());
        self.broadcast(PresentationEvent::Error {
            code: code.to_owned(),
        });
    }

    /// Drop the recorded failure code. Broadcasts only if one was set.
    pub fn clear_error(&self) {
        if self.state.lock().last_error.take().is_some() {
            self.broadcast(PresentationEvent::ErrorCleared);
        }
    }

    fn broadcast(&self, event: PresentationEvent) {
        // No subscribers is fine; the snapshot remains authoritative.
        let _ = self.events.send(event);
    }
}
