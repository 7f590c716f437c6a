use thiserror::Error;

/// All errors produced by jarvis-core.
#[derive(Debug, Error)]
pub enum JarvisError {
    /// Microphone permission/device failure or session open failure during wake.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// Inbound PCM payload whose length is not a whole number of frames.
    #[error("malformed audio: {len} bytes is not a whole number of {channels}-channel PCM16 frames")]
    MalformedAudio { len: usize, channels: u16 },

    /// Runtime error reported by the remote session.
    #[error("session error: {0}")]
    Session(String),

    #[error("live link is closed")]
    LinkClosed,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, JarvisError>;
