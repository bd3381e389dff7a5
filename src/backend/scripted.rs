//! In-process stand-in for the companion server
//!
//! Answers each `send_message` the way the real server streams: the reply is
//! split into speakable chunks, each chunk is mood-tagged and voiced, and the
//! `message_chunk` frames go out in shuffled order with random delays. The
//! `streaming_complete` frame, carrying the chunk total, can land anywhere in
//! between, just as the real server sends it before synthesis has finished.

use super::emotion::analyze_emotion;
use super::splitter::TextSplitter;
use crate::audio::encode_wav;
use crate::integration::config::{BackendConfig, CompanionConfig};
use crate::messages::{Emotion, SessionToken};
use crate::transport::wire::{EVENT_CHUNK, EVENT_COMPLETE, EVENT_ERROR, EVENT_SEND};
use crate::transport::{encode_send_message, InboundSender, TransportLink};
use crate::{CompanionError, Result};
use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Misbehaviour to inject into a reply, by chunk position (0-based)
#[derive(Debug, Clone, Default)]
pub struct ScriptFaults {
    /// Send these chunks with audio that does not decode
    pub corrupt_audio: HashSet<usize>,
    /// Send these chunks without audio
    pub text_only: HashSet<usize>,
    /// Never send these chunks
    pub withhold: HashSet<usize>,
    /// Send an `error` frame after this many chunks instead of finishing
    pub fail_after: Option<usize>,
    /// Leave `total_chunks` out of the completion frame
    pub hide_total: bool,
}

pub struct ScriptedBackend {
    config: BackendConfig,
    first_index: u64,
    splitter: TextSplitter,
    inbound: InboundSender,
    replies: Mutex<VecDeque<String>>,
    faults: Mutex<ScriptFaults>,
    turns: Mutex<HashMap<SessionToken, Arc<AtomicBool>>>,
    seed_offset: AtomicU64,
}

impl ScriptedBackend {
    pub fn new(config: &CompanionConfig, inbound: InboundSender) -> Self {
        Self {
            config: config.backend.clone(),
            first_index: config.stream.first_index,
            splitter: TextSplitter::new(config.backend.chunk_size),
            inbound,
            replies: Mutex::new(VecDeque::new()),
            faults: Mutex::new(ScriptFaults::default()),
            turns: Mutex::new(HashMap::new()),
            seed_offset: AtomicU64::new(0),
        }
    }

    /// Queue the reply for the next turn; unscripted turns get an echo
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn with_faults(self, faults: ScriptFaults) -> Self {
        *self.faults.lock() = faults;
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(reply.into());
    }

    pub fn set_faults(&self, faults: ScriptFaults) {
        *self.faults.lock() = faults;
    }

    fn next_reply(&self, user_text: &str) -> String {
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| default_reply(user_text))
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            // Each turn gets its own stream so replies don't repeat the same order
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.seed_offset.fetch_add(1, Ordering::Relaxed))),
            None => StdRng::from_entropy(),
        }
    }

    /// Build every frame of a reply, in delivery order
    fn script(&self, session_id: &str, reply: &str, rng: &mut StdRng) -> Result<Vec<String>> {
        let faults = self.faults.lock().clone();
        let pieces = self.splitter.split(reply);
        let total = pieces.len();

        let mut frames = Vec::with_capacity(total + 1);
        for (position, text) in pieces.iter().enumerate() {
            if faults.withhold.contains(&position) {
                debug!("Withholding chunk {}", position);
                continue;
            }

            let emotion = analyze_emotion(text);
            let audio = if faults.text_only.contains(&position) {
                Value::Null
            } else if faults.corrupt_audio.contains(&position) {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b"RIFF\0\0broken"))
            } else {
                let samples = synthesize_voice(text, &emotion, &self.config);
                let wav = encode_wav(&samples, self.config.sample_rate, 1)?;
                Value::String(base64::engine::general_purpose::STANDARD.encode(wav))
            };

            frames.push(frame(
                EVENT_CHUNK,
                json!({
                    "text": text,
                    "emotion": emotion.as_tag(),
                    "audio_data": audio,
                    "chunk_index": self.first_index + position as u64,
                    "session_id": session_id,
                }),
            )?);
        }

        frames.shuffle(rng);

        if let Some(after) = faults.fail_after {
            frames.truncate(after);
            frames.push(frame(
                EVENT_ERROR,
                json!({ "message": "speech synthesis failed", "session_id": session_id }),
            )?);
            return Ok(frames);
        }

        let total_chunks = if faults.hide_total {
            Value::Null
        } else {
            json!(total)
        };
        let completion = frame(
            EVENT_COMPLETE,
            json!({
                "session_id": session_id,
                "total_chunks": total_chunks,
                "full_text": reply,
            }),
        )?;
        // With an announced total the completion may overtake the chunks
        let at = if faults.hide_total {
            frames.len()
        } else {
            rng.gen_range(0..=frames.len())
        };
        frames.insert(at, completion);

        Ok(frames)
    }
}

impl TransportLink for ScriptedBackend {
    fn dispatch_turn(&self, token: &SessionToken, text: &str) -> Result<()> {
        // Round-trip through the wire format, as a server would see it
        let outbound = encode_send_message(token, text, None)?;
        let (session_id, message) = read_send_message(&outbound)?;

        let reply = self.next_reply(&message);
        let mut rng = self.rng();
        let frames = self.script(&session_id, &reply, &mut rng)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        self.turns.lock().insert(token.clone(), Arc::clone(&cancelled));

        let inbound = self.inbound.clone();
        let max_jitter = self.config.max_jitter_ms;
        info!("Scripted reply for {}: {} frames", session_id, frames.len());

        thread::Builder::new()
            .name("scripted-backend".into())
            .spawn(move || {
                for frame in frames {
                    if max_jitter > 0 {
                        thread::sleep(Duration::from_millis(rng.gen_range(0..=max_jitter)));
                    }
                    if cancelled.load(Ordering::SeqCst) {
                        debug!("Turn {} cancelled, stop streaming", session_id);
                        return;
                    }
                    if inbound.frame(frame).is_err() {
                        warn!("Driver gone, dropping scripted reply");
                        return;
                    }
                }
            })
            .map_err(|e| CompanionError::TransportError(format!("Failed to spawn backend: {}", e)))?;

        Ok(())
    }

    fn cancel_turn(&self, token: &SessionToken) {
        if let Some(flag) = self.turns.lock().remove(token) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn frame(event: &str, payload: Value) -> Result<String> {
    serde_json::to_string(&json!([event, payload]))
        .map_err(|e| CompanionError::ProtocolError(format!("Failed to encode {}: {}", event, e)))
}

fn read_send_message(frame: &str) -> Result<(String, String)> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| CompanionError::ProtocolError(format!("Bad outbound frame: {}", e)))?;
    if value[0] != EVENT_SEND {
        return Err(CompanionError::ProtocolError(format!(
            "Expected {}, got {}",
            EVENT_SEND, value[0]
        )));
    }

    let field = |name: &str| {
        value[1][name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CompanionError::ProtocolError(format!("send_message without {}", name)))
    };
    Ok((field("session_id")?, field("message")?))
}

fn default_reply(user_text: &str) -> String {
    format!(
        "「{}」って言ったね。ありがとう、すごく嬉しいよ！もっとお話ししようね。",
        user_text.trim()
    )
}

/// A hummed tone with one amplitude pulse per character, pitched by mood
pub fn synthesize_voice(text: &str, emotion: &Emotion, config: &BackendConfig) -> Vec<f32> {
    let chars = text.chars().count().max(1);
    let per_char = (config.sample_rate as f32 * config.seconds_per_char).max(1.0) as usize;
    let pitch = match emotion {
        Emotion::Happy => 262.0,
        Emotion::Sad => 196.0,
        Emotion::Surprised => 330.0,
        _ => 220.0,
    };

    let rate = config.sample_rate as f32;
    (0..chars * per_char)
        .map(|n| {
            let syllable = (n % per_char) as f32 / per_char as f32;
            let envelope = (PI * syllable).sin();
            0.4 * envelope * (2.0 * PI * pitch * n as f32 / rate).sin()
        })
        .collect()
}
