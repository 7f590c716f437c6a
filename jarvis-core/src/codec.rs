//! PCM16 codec and text-safe transport encoding.
//!
//! ```text
//! f32 [-1, 1)  ──to_pcm16──►  i16 LE bytes  ──encode_for_transport──►  base64 text
//! ```
//!
//! All functions are stateless and allocation-per-call; they run on the
//! capture thread (outbound) and the coordination loop (inbound), never on
//! a device callback.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{JarvisError, Result};

/// Scale between normalised float samples and signed 16-bit PCM.
pub const PCM16_SCALE: f32 = 32768.0;

/// Outbound microphone audio rate (Hz).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Inbound synthesized speech rate (Hz).
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Samples per outbound capture frame.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// Sample encoding carried by an [`EncodedChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    /// Signed 16-bit little-endian PCM.
    Pcm16,
}

/// Describes the audio inside an [`EncodedChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkTag {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl ChunkTag {
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Pcm16,
        }
    }

    /// MIME form used on the wire, e.g. `audio/pcm;rate=16000`.
    ///
    /// Mono is implied when no `channels` parameter is present.
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!(
                "audio/pcm;rate={};channels={}",
                self.sample_rate, self.channels
            )
        }
    }

    /// Parse a `audio/pcm[;rate=N][;channels=N]` MIME string.
    ///
    /// Missing parameters fall back to `default_rate` and mono.
    pub fn from_mime(mime: &str, default_rate: u32) -> Option<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next()?;
        if !essence.eq_ignore_ascii_case("audio/pcm") && !essence.eq_ignore_ascii_case("audio/l16")
        {
            return None;
        }
        let mut tag = Self::pcm16(default_rate, 1);
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim() {
                "rate" => tag.sample_rate = value.trim().parse().ok()?,
                "channels" => tag.channels = value.trim().parse().ok()?,
                _ => {}
            }
        }
        Some(tag)
    }
}

/// A transport-ready audio payload: base64 text plus its format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: String,
    pub tag: ChunkTag,
}

impl EncodedChunk {
    /// Encode float samples as a tagged, transport-safe chunk.
    pub fn from_samples(samples: &[f32], tag: ChunkTag) -> Self {
        Self {
            data: encode_for_transport(&to_pcm16(samples)),
            tag,
        }
    }

    /// Decode back to per-channel float samples.
    ///
    /// # Errors
    /// `JarvisError::MalformedAudio` when the payload is not valid base64 or
    /// its byte length is not a whole number of frames.
    pub fn decode(&self) -> Result<Vec<Vec<f32>>> {
        let bytes = decode_from_transport(&self.data)?;
        from_pcm16(&bytes, self.tag.channels)
    }
}

/// Scale each sample by 32768 and pack as little-endian `i16`.
///
/// Out-of-range products saturate at the `i16` bounds (`as` cast semantics);
/// no other clamping is applied.
pub fn to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample * PCM16_SCALE) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Inverse of [`to_pcm16`], de-interleaving into one `Vec` per channel.
///
/// # Errors
/// `JarvisError::MalformedAudio` if `bytes.len()` is not a multiple of
/// `2 × channels` (or `channels` is zero).
pub fn from_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<Vec<f32>>> {
    let frame_width = 2 * channels as usize;
    if frame_width == 0 || bytes.len() % frame_width != 0 {
        return Err(JarvisError::MalformedAudio {
            len: bytes.len(),
            channels,
        });
    }

    let frames = bytes.len() / frame_width;
    let mut out = vec![Vec::with_capacity(frames); channels as usize];
    for frame in bytes.chunks_exact(frame_width) {
        for (channel, pair) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            out[channel].push(value as f32 / PCM16_SCALE);
        }
    }
    Ok(out)
}

/// Binary → text (standard base64 with padding).
pub fn encode_for_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Text → binary; exact inverse of [`encode_for_transport`].
pub fn decode_from_transport(text: &str) -> Result<Vec<u8>> {
    STANDARD.decode(text.trim()).map_err(|_| JarvisError::MalformedAudio {
        len: text.len(),
        channels: 0,
    })
}
