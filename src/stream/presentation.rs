//! Avatar-facing view of playback
//!
//! Turns sequencer transitions into expression, caption and lip-sync events
//! for the UI collaborator. The event channel is expected to be unbounded.
//! Expression, caption and close events are always delivered; amplitude
//! samples are skipped while the UI has `amplitude_backlog` events queued.

use super::sequencer::SequencerEvent;
use crate::audio::{AmplitudeMeter, PlaybackMonitor};
use crate::integration::config::PresentationConfig;
use crate::messages::Emotion;
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const AMPLITUDE_EPSILON: f32 = 0.01;

/// How a session ended, as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed { transcript: String },
    Cancelled { partial_transcript: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    ExpressionChanged(Emotion),
    /// Caption text of the current turn so far
    CaptionUpdated(String),
    /// Mouth level in 0.0..=1.0
    AmplitudeSample(f32),
    SessionClosed(SessionOutcome),
}

pub struct PresentationSync {
    tx: Sender<PresentationEvent>,
    monitor: PlaybackMonitor,
    meter: AmplitudeMeter,
    amplitude_window_ms: u64,
    amplitude_backlog: usize,
    revert_grace: Duration,
    expression: Emotion,
    caption: String,
    amplitude: f32,
    /// Text of the audio chunk waiting for its unit to start
    pending_caption: Option<(u64, String)>,
    revert_at: Option<Instant>,
}

impl PresentationSync {
    pub fn new(
        tx: Sender<PresentationEvent>,
        monitor: PlaybackMonitor,
        config: &PresentationConfig,
    ) -> Self {
        Self {
            tx,
            monitor,
            meter: AmplitudeMeter::new(config.amplitude_gain, config.attack, config.release),
            amplitude_window_ms: config.amplitude_window_ms,
            amplitude_backlog: config.amplitude_backlog,
            revert_grace: Duration::from_millis(config.revert_grace_ms),
            expression: Emotion::Neutral,
            caption: String::new(),
            amplitude: 0.0,
            pending_caption: None,
            revert_at: None,
        }
    }

    /// A new turn starts: drop any pending revert and start a fresh caption
    pub fn session_started(&mut self) {
        if self.revert_at.take().is_some() {
            debug!("New session cancels pending presentation revert");
        }
        self.caption.clear();
        self.pending_caption = None;
    }

    /// Feed the sequencer's transitions, in the order they happened
    pub fn observe(&mut self, events: &[SequencerEvent]) {
        for event in events {
            match event {
                SequencerEvent::Consumed {
                    index,
                    text,
                    emotion,
                    has_audio,
                } => {
                    if *has_audio {
                        // Held back until the voice starts
                        self.pending_caption = Some((*index, text.clone()));
                    } else {
                        if let Some(emotion) = emotion {
                            self.set_expression(emotion.clone());
                        }
                        self.append_caption(text);
                    }
                }
                SequencerEvent::Started { index, emotion } => {
                    if let Some(emotion) = emotion {
                        self.set_expression(emotion.clone());
                    }
                    self.release_caption(*index);
                }
                SequencerEvent::Failed { index, .. } => {
                    self.release_caption(*index);
                }
                SequencerEvent::Finished { .. } | SequencerEvent::Skipped { .. } => {}
            }
        }
    }

    /// Announce the end of a session and schedule the revert to neutral
    pub fn session_closed(&mut self, outcome: SessionOutcome, now: Instant) {
        self.pending_caption = None;
        self.emit(PresentationEvent::SessionClosed(outcome));
        self.revert_at = Some(now + self.revert_grace);
    }

    /// Periodic step: sample the playing signal and apply a due revert
    pub fn tick(&mut self, now: Instant) {
        if matches!(self.revert_at, Some(at) if now >= at) {
            self.revert_at = None;
            self.revert();
            return;
        }
        self.sample_amplitude();
    }

    /// Read the audible clip's level; never touches sequencing state
    pub fn sample_amplitude(&mut self) -> f32 {
        let rms = self.monitor.rms(self.amplitude_window_ms);
        let level = self.meter.update(rms);

        let changed = (level - self.amplitude).abs() >= AMPLITUDE_EPSILON
            || (level == 0.0 && self.amplitude != 0.0);
        if changed {
            if self.tx.len() >= self.amplitude_backlog {
                trace!("UI is {} events behind, skipping amplitude sample", self.tx.len());
            } else {
                self.amplitude = level;
                self.emit(PresentationEvent::AmplitudeSample(level));
            }
        }
        level
    }

    pub fn expression(&self) -> &Emotion {
        &self.expression
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn revert_pending(&self) -> bool {
        self.revert_at.is_some()
    }

    fn revert(&mut self) {
        debug!("Reverting presentation to idle");
        self.set_expression(Emotion::Neutral);
        if !self.caption.is_empty() {
            self.caption.clear();
            self.emit(PresentationEvent::CaptionUpdated(String::new()));
        }
        self.meter.reset();
        if self.amplitude != 0.0 {
            self.amplitude = 0.0;
            self.emit(PresentationEvent::AmplitudeSample(0.0));
        }
    }

    fn set_expression(&mut self, emotion: Emotion) {
        if self.expression != emotion {
            self.expression = emotion.clone();
            self.emit(PresentationEvent::ExpressionChanged(emotion));
        }
    }

    fn release_caption(&mut self, index: u64) {
        if let Some((pending, text)) = self.pending_caption.take() {
            if pending == index {
                self.append_caption(&text);
            } else {
                self.pending_caption = Some((pending, text));
            }
        }
    }

    fn append_caption(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.caption.push_str(text);
        self.emit(PresentationEvent::CaptionUpdated(self.caption.clone()));
    }

    fn emit(&self, event: PresentationEvent) {
        if self.tx.send(event).is_err() {
            trace!("Presentation receiver gone");
        }
    }
}
