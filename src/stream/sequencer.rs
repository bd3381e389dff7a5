//! Strictly ordered, strictly serial playback of buffered chunks
//!
//! The sequencer owns the "next expected index" of the active session and at
//! most one playing unit. `advance` is the only place chunks leave the
//! buffer; `complete` is the only place a playing unit ends. Both run under
//! the sequencer lock, and the buffer lock is only ever taken inside it.

use super::buffer::ChunkBuffer;
use crate::audio::{
    decode_payload, AudioSink, PlaybackClip, PlaybackCompletion, PlaybackMonitor, PlaybackOutcome,
    PlaybackReport,
};
use crate::messages::{Chunk, Emotion, SessionToken};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of one chunk's audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Pending,
    Playing,
    Finished,
    Failed,
}

/// Runtime view of the audio item derived from a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackUnit {
    pub index: u64,
    pub emotion: Option<Emotion>,
    pub state: PlaybackState,
}

/// What a sequencer step did, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// Chunk left the buffer in index order
    Consumed {
        index: u64,
        text: String,
        emotion: Option<Emotion>,
        has_audio: bool,
    },
    /// Unit entered `Playing`
    Started { index: u64, emotion: Option<Emotion> },
    /// Unit played to the end
    Finished { index: u64 },
    /// Unit could not be decoded or played and was skipped
    Failed { index: u64, error: String },
    /// Indices `from..to` never arrived and were stepped over
    Skipped { from: u64, to: u64 },
}

#[derive(Debug)]
struct SequencerState {
    token: Option<SessionToken>,
    next_index: u64,
    playing: Option<PlaybackUnit>,
}

pub struct AudioSequencer {
    buffer: Arc<ChunkBuffer>,
    sink: Arc<dyn AudioSink>,
    monitor: PlaybackMonitor,
    report_tx: Sender<PlaybackReport>,
    state: Mutex<SequencerState>,
}

impl AudioSequencer {
    pub fn new(
        buffer: Arc<ChunkBuffer>,
        sink: Arc<dyn AudioSink>,
        monitor: PlaybackMonitor,
        report_tx: Sender<PlaybackReport>,
    ) -> Self {
        Self {
            buffer,
            sink,
            monitor,
            report_tx,
            state: Mutex::new(SequencerState {
                token: None,
                next_index: 0,
                playing: None,
            }),
        }
    }

    /// Bind the sequencer to `token`, silencing whatever was playing
    pub fn reset(&self, token: &SessionToken, first_index: u64) {
        let mut state = self.state.lock();
        self.silence(&mut state);
        state.token = Some(token.clone());
        state.next_index = first_index;
    }

    /// Stop playback and forget the session; later calls for it no-op
    pub fn halt(&self) {
        let mut state = self.state.lock();
        self.silence(&mut state);
        state.token = None;
    }

    /// Start as many units as possible without overlapping.
    ///
    /// Text-only chunks are consumed immediately; the first audio chunk that
    /// starts playing ends the step. Calling this while a unit is playing has
    /// no effect.
    pub fn advance(&self, token: &SessionToken) -> Vec<SequencerEvent> {
        let mut state = self.state.lock();
        if state.token.as_ref() != Some(token) {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.drain_ready(&mut state, token, &mut events);
        events
    }

    /// Apply a completion report and keep going
    pub fn complete(&self, report: &PlaybackReport) -> Vec<SequencerEvent> {
        let mut state = self.state.lock();
        if state.token.as_ref() != Some(&report.token) {
            debug!("Ignoring playback report for inactive session {}", report.token);
            return Vec::new();
        }

        let is_current = matches!(
            &state.playing,
            Some(unit) if unit.index == report.index && unit.state == PlaybackState::Playing
        );
        if !is_current {
            debug!("Ignoring stale playback report for chunk {}", report.index);
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(mut unit) = state.playing.take() {
            match &report.outcome {
                PlaybackOutcome::Finished => {
                    unit.state = PlaybackState::Finished;
                    debug!("Chunk {} finished playing", unit.index);
                    events.push(SequencerEvent::Finished { index: unit.index });
                }
                PlaybackOutcome::Failed(reason) => {
                    unit.state = PlaybackState::Failed;
                    warn!("Playback of chunk {} failed: {}", unit.index, reason);
                    events.push(SequencerEvent::Failed {
                        index: unit.index,
                        error: reason.clone(),
                    });
                }
            }
        }
        self.monitor.clear();

        self.drain_ready(&mut state, &report.token, &mut events);
        events
    }

    /// Jump over indices that never arrived, to the lowest buffered one.
    /// Only meaningful once the stream is known to be over.
    pub fn skip_gap(&self, token: &SessionToken) -> Vec<SequencerEvent> {
        let mut state = self.state.lock();
        if state.token.as_ref() != Some(token) || state.playing.is_some() {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(lowest) = self.buffer.lowest_pending_index(token) {
            if lowest > state.next_index {
                warn!(
                    "Skipping missing chunks {}..{} for session {}",
                    state.next_index, lowest, token
                );
                events.push(SequencerEvent::Skipped {
                    from: state.next_index,
                    to: lowest,
                });
                state.next_index = lowest;
            }
        }

        self.drain_ready(&mut state, token, &mut events);
        events
    }

    /// Nothing is playing for `token`
    pub fn is_idle(&self, token: &SessionToken) -> bool {
        let state = self.state.lock();
        state.token.as_ref() != Some(token) || state.playing.is_none()
    }

    pub fn next_index(&self) -> u64 {
        self.state.lock().next_index
    }

    /// Unit currently in `Playing`, if any
    pub fn current_unit(&self) -> Option<PlaybackUnit> {
        self.state.lock().playing.clone()
    }

    pub fn monitor(&self) -> &PlaybackMonitor {
        &self.monitor
    }

    fn silence(&self, state: &mut SequencerState) {
        if let Some(unit) = state.playing.take() {
            info!("Stopping playback of chunk {}", unit.index);
        }
        self.sink.stop();
        self.monitor.clear();
    }

    fn drain_ready(
        &self,
        state: &mut SequencerState,
        token: &SessionToken,
        events: &mut Vec<SequencerEvent>,
    ) {
        while state.playing.is_none() {
            let Some(chunk) = self.buffer.take_next(token, state.next_index) else {
                break;
            };
            state.next_index = chunk.index.saturating_add(1);

            events.push(SequencerEvent::Consumed {
                index: chunk.index,
                text: chunk.text.clone(),
                emotion: chunk.emotion.clone(),
                has_audio: chunk.has_audio(),
            });

            if chunk.has_audio() {
                self.start_unit(state, token, chunk, events);
            } else {
                debug!("Chunk {} has no audio, passing through", chunk.index);
            }
        }
    }

    fn start_unit(
        &self,
        state: &mut SequencerState,
        token: &SessionToken,
        chunk: Chunk,
        events: &mut Vec<SequencerEvent>,
    ) {
        let mut unit = PlaybackUnit {
            index: chunk.index,
            emotion: chunk.emotion,
            state: PlaybackState::Pending,
        };

        let Some(payload) = chunk.audio else {
            return;
        };

        let audio = match decode_payload(&payload) {
            Ok(audio) => Arc::new(audio),
            Err(e) => {
                unit.state = PlaybackState::Failed;
                warn!("Skipping chunk {}: {}", unit.index, e);
                events.push(SequencerEvent::Failed {
                    index: unit.index,
                    error: e.to_string(),
                });
                return;
            }
        };

        let clip = PlaybackClip::new(token.clone(), unit.index, audio);
        let completion = PlaybackCompletion::new(token.clone(), unit.index, self.report_tx.clone());
        self.monitor.set(clip.cursor.clone());

        if let Err(e) = self.sink.play(clip, completion) {
            self.monitor.clear();
            unit.state = PlaybackState::Failed;
            warn!("Sink refused chunk {}: {}", unit.index, e);
            events.push(SequencerEvent::Failed {
                index: unit.index,
                error: e.to_string(),
            });
            return;
        }

        unit.state = PlaybackState::Playing;
        debug!("Chunk {} playing", unit.index);
        events.push(SequencerEvent::Started {
            index: unit.index,
            emotion: unit.emotion.clone(),
        });
        state.playing = Some(unit);
    }
}
