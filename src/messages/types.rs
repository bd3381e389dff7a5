use crate::{CompanionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Opaque identity of one assistant turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionToken {
    type Err = CompanionError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CompanionError::ProtocolError(format!("Invalid session token '{}': {}", s, e)))
    }
}

/// Mood tag attached to a chunk, mapped to an avatar expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Surprised,
    /// Tag the client has no dedicated expression for
    Other(String),
}

impl Emotion {
    /// Parse a wire tag. Unknown tags are kept verbatim.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "neutral" => Emotion::Neutral,
            "happy" | "joy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "surprised" | "surprise" => Emotion::Surprised,
            other => Emotion::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
            Emotion::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Encoding of an audio payload as announced by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioFormat {
    /// RIFF/WAVE container
    Wav,
    /// Headerless little-endian 16-bit PCM
    Pcm16 { sample_rate: u32, channels: u16 },
}

impl AudioFormat {
    /// Parse a wire format tag such as `wav` or `pcm16@24000` / `pcm16@24000x2`
    pub fn from_tag(tag: &str) -> Result<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() || tag == "wav" || tag == "audio/wav" {
            return Ok(AudioFormat::Wav);
        }

        if let Some(spec) = tag.strip_prefix("pcm16") {
            let spec = spec.trim_start_matches('@');
            if spec.is_empty() {
                return Ok(AudioFormat::Pcm16 {
                    sample_rate: 24000,
                    channels: 1,
                });
            }
            let (rate, channels) = match spec.split_once('x') {
                Some((rate, channels)) => (rate, channels),
                None => (spec, "1"),
            };
            let sample_rate = rate
                .parse()
                .map_err(|_| CompanionError::ProtocolError(format!("Bad sample rate in '{}'", tag)))?;
            let channels = channels
                .parse()
                .map_err(|_| CompanionError::ProtocolError(format!("Bad channel count in '{}'", tag)))?;
            return Ok(AudioFormat::Pcm16 {
                sample_rate,
                channels,
            });
        }

        Err(CompanionError::ProtocolError(format!("Unsupported audio format: {}", tag)))
    }
}

/// Encoded audio as received from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl AudioPayload {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn wav(data: Vec<u8>) -> Self {
        Self::new(data, AudioFormat::Wav)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One indexed fragment of a streamed assistant response
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: u64,
    pub text: String,
    pub audio: Option<AudioPayload>,
    pub emotion: Option<Emotion>,
}

impl Chunk {
    /// Create a text-only chunk
    pub fn text(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            audio: None,
            emotion: None,
        }
    }

    /// Attach an audio payload. Empty payloads are dropped, an empty
    /// payload and a missing one are the same thing downstream.
    pub fn with_audio(mut self, audio: AudioPayload) -> Self {
        self.audio = if audio.is_empty() { None } else { Some(audio) };
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().map(|a| !a.is_empty()).unwrap_or(false)
    }
}

/// Decoded PCM ready for a sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A finalized conversation message handed to persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_tags() {
        assert_eq!(Emotion::from_tag("HAPPY"), Emotion::Happy);
        assert_eq!(Emotion::from_tag(""), Emotion::Neutral);
        assert_eq!(Emotion::from_tag("surprised"), Emotion::Surprised);
        assert_eq!(Emotion::from_tag("sleepy"), Emotion::Other("sleepy".into()));
        assert_eq!(Emotion::Other("sleepy".into()).as_tag(), "sleepy");
    }

    #[test]
    fn test_audio_format_tags() {
        assert_eq!(AudioFormat::from_tag("wav").unwrap(), AudioFormat::Wav);
        assert_eq!(
            AudioFormat::from_tag("pcm16@16000").unwrap(),
            AudioFormat::Pcm16 {
                sample_rate: 16000,
                channels: 1
            }
        );
        assert_eq!(
            AudioFormat::from_tag("pcm16@48000x2").unwrap(),
            AudioFormat::Pcm16 {
                sample_rate: 48000,
                channels: 2
            }
        );
        assert!(AudioFormat::from_tag("mp3").is_err());
        assert!(AudioFormat::from_tag("pcm16@fast").is_err());
    }

    #[test]
    fn test_empty_audio_is_no_audio() {
        let chunk = Chunk::text(1, "hi").with_audio(AudioPayload::wav(Vec::new()));
        assert!(chunk.audio.is_none());
        assert!(!chunk.has_audio());

        let chunk = Chunk::text(1, "hi").with_audio(AudioPayload::wav(vec![1, 2, 3]));
        assert!(chunk.has_audio());
    }

    #[test]
    fn test_session_token_roundtrip_through_string() {
        let token = SessionToken::new();
        let parsed: SessionToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
        assert!("not-a-token".parse::<SessionToken>().is_err());
    }

    #[test]
    fn test_audio_duration() {
        let audio = AudioData::new(vec![0.0; 32000], 16000, 2);
        assert!((audio.duration_seconds() - 1.0).abs() < 0.001);
        assert_eq!(AudioData::new(vec![0.0; 10], 0, 1).duration_seconds(), 0.0);
    }
}
