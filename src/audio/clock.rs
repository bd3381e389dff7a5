//! Software sink that plays clips against the wall clock
//!
//! Nothing reaches a speaker; each clip's cursor advances in real time (or
//! scaled by `speed`) on its own thread and the completion fires when the
//! cursor reaches the end. Used for headless runs and tests.

use super::sink::{AudioSink, PlaybackClip, PlaybackCompletion};
use crate::{CompanionError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

pub struct ClockSink {
    block: Duration,
    speed: f32,
    generation: Arc<AtomicU64>,
}

impl ClockSink {
    /// Create a sink that advances in `block` steps at `speed` times real time
    pub fn new(block: Duration, speed: f32) -> Self {
        Self {
            block: block.max(Duration::from_millis(1)),
            speed: if speed > 0.0 { speed } else { 1.0 },
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Real-time playback with 20 ms blocks
    pub fn realtime() -> Self {
        Self::new(Duration::from_millis(20), 1.0)
    }
}

impl Default for ClockSink {
    fn default() -> Self {
        Self::realtime()
    }
}

impl AudioSink for ClockSink {
    fn play(&self, clip: PlaybackClip, completion: PlaybackCompletion) -> Result<()> {
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);

        let audio = &clip.audio;
        let frames_per_block = (audio.sample_rate as u128 * self.block.as_millis() / 1000).max(1) as usize;
        let samples_per_block = frames_per_block * audio.channels.max(1) as usize;
        let pause = self.block.div_f32(self.speed);

        debug!(
            "Clock playback of chunk {}: {:.2}s at {}x",
            clip.index,
            audio.duration_seconds(),
            self.speed
        );

        thread::Builder::new()
            .name(format!("clock-sink-{}", clip.index))
            .spawn(move || {
                while !clip.cursor.is_at_end() {
                    thread::sleep(pause);
                    if generation.load(Ordering::SeqCst) != started_in {
                        trace!("Chunk {} stopped mid-clip", clip.index);
                        completion.abandon();
                        return;
                    }
                    clip.cursor.advance(samples_per_block);
                }
                completion.finish();
            })
            .map_err(|e| CompanionError::PlaybackError(format!("Failed to spawn playback thread: {}", e)))?;

        Ok(())
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
