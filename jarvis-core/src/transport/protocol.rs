//! JSON wire mapping for the bidirectional live-generation socket.
//!
//! Outbound: `setup` (once), `realtimeInput.mediaChunks` (per capture frame),
//! `clientContent` (typed queries). Inbound: `setupComplete` and
//! `serverContent` messages, which may bundle several logical events; they
//! are flattened in the order transcript → turn-complete → audio →
//! interrupted.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    codec::{ChunkTag, EncodedChunk, OUTPUT_SAMPLE_RATE},
    error::{JarvisError, Result},
    transport::{LinkEvent, LiveConfig, Outbound},
};

/// First message on a fresh socket.
pub fn setup_message(config: &LiveConfig) -> Value {
    let mut setup = json!({
        "model": config.model,
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.voice } }
            }
        },
        "systemInstruction": { "parts": [{ "text": config.system_instruction }] },
    });
    if config.transcription {
        setup["inputAudioTranscription"] = json!({});
        setup["outputAudioTranscription"] = json!({});
    }
    if config.web_search {
        setup["tools"] = json!([{ "googleSearch": {} }]);
    }
    json!({ "setup": setup })
}

pub fn encode_outbound(message: &Outbound) -> Value {
    match message {
        Outbound::Audio(chunk) => json!({
            "realtimeInput": {
                "mediaChunks": [{ "mimeType": chunk.tag.mime_type(), "data": chunk.data }]
            }
        }),
        Outbound::Text(text) => json!({
            "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                "turnComplete": true
            }
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    go_away: Option<Value>,
    error: Option<ServerError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    output_transcription: Option<Transcription>,
    input_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    message: String,
}

/// Flatten one inbound frame into logical events, in processing order.
///
/// # Errors
/// `JarvisError::Protocol` when the frame is not a JSON object.
pub fn decode_inbound(frame: &str) -> Result<Vec<LinkEvent>> {
    let msg: ServerMessage =
        serde_json::from_str(frame).map_err(|e| JarvisError::Protocol(e.to_string()))?;
    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(LinkEvent::Open);
    }

    if let Some(content) = msg.server_content {
        if let Some(t) = content.output_transcription {
            events.push(LinkEvent::AssistantTranscript(t.text));
        } else if let Some(t) = content.input_transcription {
            events.push(LinkEvent::UserTranscript(t.text));
        }
        if content.turn_complete {
            events.push(LinkEvent::TurnComplete);
        }
        if let Some(turn) = content.model_turn {
            for inline in turn.parts.into_iter().filter_map(|p| p.inline_data) {
                let tag = if inline.mime_type.is_empty() {
                    Some(ChunkTag::pcm16(OUTPUT_SAMPLE_RATE, 1))
                } else {
                    ChunkTag::from_mime(&inline.mime_type, OUTPUT_SAMPLE_RATE)
                };
                let Some(tag) = tag else {
                    tracing::debug!(mime = %inline.mime_type, "ignoring non-PCM inline data");
                    continue;
                };
                events.push(LinkEvent::AssistantAudio(EncodedChunk {
                    data: inline.data,
                    tag,
                }));
            }
        }
        if content.interrupted {
            events.push(LinkEvent::Interrupted);
        }
    }

    if let Some(err) = msg.error {
        events.push(LinkEvent::Error(err.message));
    }
    if msg.go_away.is_some() {
        tracing::info!("remote announced imminent disconnect");
    }

    Ok(events)
}
