//! Playback position tracking and lip-sync amplitude
//!
//! The sink moves a [`PlaybackCursor`] through the clip it is playing; the
//! presentation layer only ever reads the cursor's signal, so sampling the
//! amplitude can never disturb sequencing.

use crate::messages::AudioData;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared read position into a clip, in interleaved samples
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    audio: Arc<AudioData>,
    position: Arc<AtomicUsize>,
}

impl PlaybackCursor {
    pub fn new(audio: Arc<AudioData>) -> Self {
        Self {
            audio,
            position: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Move forward by `samples`, clamped to the clip length.
    /// Returns the new position.
    pub fn advance(&self, samples: usize) -> usize {
        let total = self.total();
        let mut current = self.position.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(samples).min(total);
            match self
                .position
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn set_position(&self, position: usize) {
        self.position.store(position.min(self.total()), Ordering::Release);
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.audio.samples.len()
    }

    pub fn is_at_end(&self) -> bool {
        self.position() >= self.total()
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// RMS of the `window` samples leading up to the cursor
    pub fn rms_window(&self, window: usize) -> f32 {
        let end = self.position().min(self.total());
        let start = end.saturating_sub(window);
        if start >= end {
            return 0.0;
        }

        let slice = &self.audio.samples[start..end];
        let sum_sq: f32 = slice.iter().map(|s| s * s).sum();
        (sum_sq / slice.len() as f32).sqrt()
    }
}

/// Slot holding the cursor of the clip that is currently audible
#[derive(Debug, Clone, Default)]
pub struct PlaybackMonitor {
    current: Arc<RwLock<Option<PlaybackCursor>>>,
}

impl PlaybackMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cursor: PlaybackCursor) {
        *self.current.write() = Some(cursor);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    pub fn current(&self) -> Option<PlaybackCursor> {
        self.current.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Raw RMS over the trailing `window_ms` of the audible clip, 0.0 when silent
    pub fn rms(&self, window_ms: u64) -> f32 {
        let guard = self.current.read();
        let Some(cursor) = guard.as_ref() else {
            return 0.0;
        };

        let audio = cursor.audio();
        let window = (audio.sample_rate as u64 * audio.channels as u64 * window_ms / 1000) as usize;
        cursor.rms_window(window.max(1))
    }
}

/// Attack/release smoother mapping raw RMS to a 0.0–1.0 mouth level
#[derive(Debug, Clone)]
pub struct AmplitudeMeter {
    gain: f32,
    attack: f32,
    release: f32,
    level: f32,
}

impl AmplitudeMeter {
    pub fn new(gain: f32, attack: f32, release: f32) -> Self {
        Self {
            gain: gain.max(0.0),
            attack: attack.clamp(0.0, 1.0),
            release: release.clamp(0.0, 1.0),
            level: 0.0,
        }
    }

    /// Feed one raw RMS reading, returns the smoothed level
    pub fn update(&mut self, rms: f32) -> f32 {
        let target = (rms * self.gain).clamp(0.0, 1.0);
        let coeff = if target > self.level {
            self.attack
        } else {
            self.release
        };
        self.level += (target - self.level) * coeff;
        if self.level < 1e-3 {
            self.level = 0.0;
        }
        self.level = self.level.clamp(0.0, 1.0);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
