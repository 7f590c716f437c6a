//! The single-consumer event queue drained by the coordination loop.
//!
//! Every entry point (operator controls, inbound link traffic, playback
//! completions, fallback-speech notifications, interim captions) is a
//! producer into one unbounded queue. Producers never block; the loop
//! applies events strictly in arrival order.

use tokio::sync::mpsc;

use crate::{
    ipc::events::Feedback,
    playback::UnitKey,
    transport::LinkEvent,
};

/// Identifies one live link; never reused within a process.
pub type LinkId = u64;

/// Identifies one fallback speech utterance.
pub type UtteranceId = u64;

/// Operator / presentation actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Wake,
    ManualListen,
    Shutdown,
    SendText(String),
    Feedback { index: usize, feedback: Feedback },
    /// Shut down and leave the loop.
    Terminate,
}

/// Lifecycle notifications from the fallback speech capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechNotice {
    Started(UtteranceId),
    Ended(UtteranceId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Control(Control),
    Link { link: LinkId, event: LinkEvent },
    UnitEnded(UnitKey),
    Speech(SpeechNotice),
    Caption(String),
}

/// Cloneable producer handle into the engine queue.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<EngineEvent>);

/// Consumer half, owned by the coordination loop.
pub type EventQueue = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the engine queue. Build collaborators with clones of the sender,
/// then hand the queue to the engine.
pub fn event_queue() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

impl EventSender {
    /// Returns `false` once the engine loop has gone away.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.0.send(event).is_ok()
    }

    pub fn control(&self, control: Control) -> bool {
        self.send(EngineEvent::Control(control))
    }

    /// Natural completion of a scheduled playback unit.
    pub fn unit_ended(&self, key: UnitKey) -> bool {
        self.send(EngineEvent::UnitEnded(key))
    }

    pub fn speech(&self, notice: SpeechNotice) -> bool {
        self.send(EngineEvent::Speech(notice))
    }

    /// Interim (non-final) caption text for display.
    pub fn caption(&self, text: impl Into<String>) -> bool {
        self.send(EngineEvent::Caption(text.into()))
    }

    pub fn for_link(&self, link: LinkId) -> LinkEvents {
        LinkEvents {
            link,
            tx: self.clone(),
        }
    }
}

/// Producer handle given to a transport for one link.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    link: LinkId,
    tx: EventSender,
}

impl LinkEvents {
    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn emit(&self, event: LinkEvent) -> bool {
        self.tx.send(EngineEvent::Link {
            link: self.link,
            event,
        })
    }
}
