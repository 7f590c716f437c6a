//! Types read by the presentation layer.
//!
//! | Item | Access |
//! |------|--------|
//! | [`Status`] | snapshot + `PresentationEvent::Status` |
//! | [`Message`] log | snapshot + `PresentationEvent::Message` |
//! | interim caption | snapshot + `PresentationEvent::Caption` |
//! | last error code | snapshot + `PresentationEvent::Error` |

use serde::{Deserialize, Serialize};

/// Error code surfaced when wake fails to acquire the microphone or session.
pub const SYSTEM_FAILURE: &str = "SYSTEM_FAILURE";
/// Error code surfaced when the remote reports a runtime error.
pub const LINK_INTERRUPTED: &str = "LINK_INTERRUPTED";

/// Conversational state shown by the orb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

/// One finalized conversation entry. Only `feedback` changes after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp,
            feedback: None,
        }
    }
}

/// Everything presentation can read at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSnapshot {
    pub status: Status,
    pub awake: bool,
    pub messages: Vec<Message>,
    pub caption: String,
    pub last_error: Option<String>,
}

impl Default for PresentationSnapshot {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            awake: false,
            messages: Vec::new(),
            caption: String::new(),
            last_error: None,
        }
    }
}

/// Incremental change broadcast to presentation subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PresentationEvent {
    Status { status: Status },
    Awake { awake: bool },
    Message { index: usize, message: Message },
    Feedback { index: usize, feedback: Feedback },
    Caption { text: String },
    Error { code: String },
    /// The last surfaced error no longer applies.
    ErrorCleared,
}
