//! JSON codec for the backend's socket events
//!
//! The backend speaks Socket.IO-style events: an event name plus a JSON
//! object. Frames arrive either split (`decode(name, payload)`) or packed as
//! a `["name", {...}]` array (`decode_frame`).

use super::TransportEvent;
use crate::messages::{AudioFormat, AudioPayload, Chunk, Emotion, SessionToken};
use crate::{CompanionError, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const EVENT_CHUNK: &str = "message_chunk";
pub const EVENT_COMPLETE: &str = "streaming_complete";
pub const EVENT_RESPONSE: &str = "message_response";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_SEND: &str = "send_message";

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    audio_data: Option<String>,
    #[serde(default)]
    audio_format: Option<String>,
    chunk_index: u64,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    total_chunks: Option<u64>,
    #[serde(default)]
    full_text: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    audio_data: Option<String>,
    #[serde(default)]
    audio_format: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Turns raw socket events into [`TransportEvent`]s
#[derive(Debug, Clone)]
pub struct WireDecoder {
    first_index: u64,
}

impl WireDecoder {
    /// `first_index` is the index streamed chunks start from. A
    /// `message_response` is a whole reply in one frame; its own
    /// `chunk_index` (0 on the wire) is ignored and the chunk is placed at
    /// `first_index` so the open session plays it.
    pub fn new(first_index: u64) -> Self {
        Self { first_index }
    }

    /// Decode one named event. `active` stands in for a missing `session_id`.
    /// Unknown events decode to nothing.
    pub fn decode(
        &self,
        event: &str,
        payload: &str,
        active: Option<&SessionToken>,
    ) -> Result<Vec<TransportEvent>> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| CompanionError::ProtocolError(format!("Invalid {} payload: {}", event, e)))?;
        self.decode_value(event, value, active)
    }

    /// Decode a packed `["event", {...}]` frame
    pub fn decode_frame(&self, frame: &str, active: Option<&SessionToken>) -> Result<Vec<TransportEvent>> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| CompanionError::ProtocolError(format!("Invalid frame: {}", e)))?;

        let Value::Array(mut parts) = value else {
            return Err(CompanionError::ProtocolError(
                "Frame must be a [event, payload] array".to_string(),
            ));
        };
        if parts.is_empty() {
            return Err(CompanionError::ProtocolError("Empty frame".to_string()));
        }

        let payload = if parts.len() > 1 { parts.remove(1) } else { Value::Null };
        let Value::String(event) = parts.remove(0) else {
            return Err(CompanionError::ProtocolError(
                "Frame event name must be a string".to_string(),
            ));
        };

        self.decode_value(&event, payload, active)
    }

    fn decode_value(
        &self,
        event: &str,
        value: Value,
        active: Option<&SessionToken>,
    ) -> Result<Vec<TransportEvent>> {
        match event {
            EVENT_CHUNK => {
                let payload: ChunkPayload = parse(event, value)?;
                let token = resolve_token(payload.session_id.as_deref(), active)?;
                let mut chunk = Chunk::text(payload.chunk_index, payload.text);
                if let Some(emotion) = parse_emotion(payload.emotion.as_deref()) {
                    chunk = chunk.with_emotion(emotion);
                }
                if let Some(audio) = decode_audio(
                    payload.audio_data.as_deref(),
                    payload.audio_format.as_deref(),
                    payload.chunk_index,
                ) {
                    chunk = chunk.with_audio(audio);
                }
                Ok(vec![TransportEvent::ChunkReceived { token, chunk }])
            }
            EVENT_COMPLETE => {
                let payload: CompletePayload = parse(event, value)?;
                let token = resolve_token(payload.session_id.as_deref(), active)?;
                Ok(vec![TransportEvent::StreamCompleted {
                    token,
                    full_text: payload.full_text,
                    total_chunks: payload.total_chunks,
                }])
            }
            EVENT_RESPONSE => {
                let payload: ResponsePayload = parse(event, value)?;
                let token = resolve_token(payload.session_id.as_deref(), active)?;
                let mut chunk = Chunk::text(self.first_index, payload.text.clone());
                if let Some(emotion) = parse_emotion(payload.emotion.as_deref()) {
                    chunk = chunk.with_emotion(emotion);
                }
                if let Some(audio) = decode_audio(
                    payload.audio_data.as_deref(),
                    payload.audio_format.as_deref(),
                    self.first_index,
                ) {
                    chunk = chunk.with_audio(audio);
                }
                Ok(vec![
                    TransportEvent::ChunkReceived {
                        token: token.clone(),
                        chunk,
                    },
                    TransportEvent::StreamCompleted {
                        token,
                        full_text: payload.text,
                        total_chunks: Some(1),
                    },
                ])
            }
            EVENT_ERROR => {
                let payload: ErrorPayload = parse(event, value)?;
                let token = resolve_token(payload.session_id.as_deref(), active)?;
                let description = if payload.message.is_empty() {
                    "unknown backend error".to_string()
                } else {
                    payload.message
                };
                Ok(vec![TransportEvent::StreamError { token, description }])
            }
            other => {
                debug!("Ignoring socket event '{}'", other);
                Ok(Vec::new())
            }
        }
    }
}

impl Default for WireDecoder {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Build the packed `send_message` frame for a new user turn
pub fn encode_send_message(token: &SessionToken, text: &str, personality: Option<&str>) -> Result<String> {
    let mut payload = serde_json::json!({
        "message": text,
        "session_id": token.to_string(),
    });
    if let Some(personality) = personality {
        payload["personality"] = Value::String(personality.to_string());
    }

    serde_json::to_string(&serde_json::json!([EVENT_SEND, payload]))
        .map_err(|e| CompanionError::ProtocolError(format!("Failed to encode send_message: {}", e)))
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| CompanionError::ProtocolError(format!("Malformed {} payload: {}", event, e)))
}

fn resolve_token(session_id: Option<&str>, active: Option<&SessionToken>) -> Result<SessionToken> {
    match session_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.parse(),
        None => active
            .cloned()
            .ok_or_else(|| CompanionError::ProtocolError("Event has no session and none is active".to_string())),
    }
}

fn parse_emotion(tag: Option<&str>) -> Option<Emotion> {
    tag.map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(Emotion::from_tag)
}

/// A chunk whose audio cannot be read still carries its text
fn decode_audio(data: Option<&str>, format: Option<&str>, index: u64) -> Option<AudioPayload> {
    let data = data.filter(|d| !d.is_empty())?;

    let format = match AudioFormat::from_tag(format.unwrap_or("")) {
        Ok(format) => format,
        Err(e) => {
            warn!("Chunk {} audio dropped: {}", index, e);
            return None;
        }
    };

    match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(bytes) => Some(AudioPayload::new(bytes, format)),
        Err(e) => {
            warn!("Chunk {} audio dropped: invalid base64: {}", index, e);
            None
        }
    }
}
