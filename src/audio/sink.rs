//! Playback seam between the sequencer and whatever produces sound
//!
//! A sink starts a clip asynchronously and resolves the clip's
//! [`PlaybackCompletion`] when playback ends. The completion posts a
//! [`PlaybackReport`] back to the driver loop, which hands it to the
//! sequencer; nothing ever polls a sink for "done".

use super::meter::PlaybackCursor;
use crate::messages::{AudioData, SessionToken};
use crate::Result;
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::warn;

/// How a clip's playback ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Completion notice posted by a sink
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub token: SessionToken,
    pub index: u64,
    pub outcome: PlaybackOutcome,
}

/// A decoded unit handed to a sink
#[derive(Debug, Clone)]
pub struct PlaybackClip {
    pub token: SessionToken,
    pub index: u64,
    pub audio: Arc<AudioData>,
    /// Sinks advance this as samples reach the output
    pub cursor: PlaybackCursor,
}

impl PlaybackClip {
    pub fn new(token: SessionToken, index: u64, audio: Arc<AudioData>) -> Self {
        let cursor = PlaybackCursor::new(Arc::clone(&audio));
        Self {
            token,
            index,
            audio,
            cursor,
        }
    }
}

/// One-shot completion handle for a started clip
///
/// Dropping a handle that was never resolved reports a failure, so a sink
/// that loses track of a clip cannot stall the sequence.
#[derive(Debug)]
pub struct PlaybackCompletion {
    token: SessionToken,
    index: u64,
    tx: Sender<PlaybackReport>,
    resolved: bool,
}

impl PlaybackCompletion {
    pub fn new(token: SessionToken, index: u64, tx: Sender<PlaybackReport>) -> Self {
        Self {
            token,
            index,
            tx,
            resolved: false,
        }
    }

    /// Playback reached the end of the clip
    pub fn finish(mut self) {
        self.resolve(PlaybackOutcome::Finished);
    }

    /// Playback broke off
    pub fn fail(mut self, reason: impl Into<String>) {
        self.resolve(PlaybackOutcome::Failed(reason.into()));
    }

    /// Resolve without reporting, for clips silenced by `AudioSink::stop`
    pub fn abandon(mut self) {
        self.resolved = true;
    }

    fn resolve(&mut self, outcome: PlaybackOutcome) {
        if self.resolved {
            return;
        }
        self.resolved = true;

        let report = PlaybackReport {
            token: self.token.clone(),
            index: self.index,
            outcome,
        };
        if self.tx.send(report).is_err() {
            warn!("Playback report for chunk {} dropped: driver is gone", self.index);
        }
    }
}

impl Drop for PlaybackCompletion {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolve(PlaybackOutcome::Failed("completion dropped without report".into()));
        }
    }
}

/// Audio output used by the sequencer
pub trait AudioSink: Send + Sync {
    /// Start playing `clip` and return without waiting for it to end.
    /// `completion` must be resolved once playback ends.
    fn play(&self, clip: PlaybackClip, completion: PlaybackCompletion) -> Result<()>;

    /// Silence the current clip as soon as possible
    fn stop(&self);
}
