//! Runtime configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes.

use crate::{CompanionError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What happens to the streamed text of a turn cut short by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelTranscriptPolicy {
    /// Persist the text consumed so far as a truncated assistant turn
    #[default]
    Retain,
    /// Persist nothing for the cancelled turn
    Discard,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Index of the first chunk of every turn
    pub first_index: u64,

    /// Max buffered chunks per session; unbounded when absent
    pub high_water_mark: Option<usize>,

    /// How long a finalizing session waits for announced chunks
    pub finalize_timeout_ms: u64,

    pub cancel_transcript: CancelTranscriptPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            first_index: 1,
            high_water_mark: None,
            finalize_timeout_ms: 3000,
            cancel_transcript: CancelTranscriptPolicy::Retain,
        }
    }
}

impl StreamConfig {
    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Delay before falling back to the idle pose after a turn ends
    pub revert_grace_ms: u64,

    /// Period of the amplitude sampler
    pub amplitude_interval_ms: u64,

    /// Trailing window the RMS is computed over
    pub amplitude_window_ms: u64,

    pub amplitude_gain: f32,
    pub attack: f32,
    pub release: f32,

    /// Queued UI events past which amplitude samples are skipped
    pub amplitude_backlog: usize,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            revert_grace_ms: 800,
            amplitude_interval_ms: 33,
            amplitude_window_ms: 50,
            amplitude_gain: 4.0,
            attack: 0.6,
            release: 0.2,
            amplitude_backlog: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Step of the software clock sink
    pub block_ms: u64,

    /// Playback speed of the software clock sink
    pub speed: f32,

    /// Play through the default output device (needs the `audio-io` feature)
    pub use_device: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            block_ms: 20,
            speed: 1.0,
            use_device: false,
        }
    }
}

/// Settings of the simulated backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Target characters per chunk
    pub chunk_size: usize,

    /// Sample rate of synthesized speech
    pub sample_rate: u32,

    /// Upper bound of the random per-chunk delivery delay
    pub max_jitter_ms: u64,

    /// Seconds of synthesized audio per character
    pub seconds_per_char: f32,

    /// Fixed RNG seed for reproducible delivery order
    pub seed: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            sample_rate: 24000,
            max_jitter_ms: 120,
            seconds_per_char: 0.06,
            seed: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub stream: StreamConfig,
    pub presentation: PresentationConfig,
    pub playback: PlaybackConfig,
    pub backend: BackendConfig,

    /// Capacity of the bounded event channels
    pub channel_capacity: usize,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            presentation: PresentationConfig::default(),
            playback: PlaybackConfig::default(),
            backend: BackendConfig::default(),
            channel_capacity: 64,
        }
    }
}

impl CompanionConfig {
    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CompanionError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            CompanionError::ConfigError(msg) => {
                CompanionError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CompanionConfig =
            toml::from_str(content).map_err(|e| CompanionError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_first_index(mut self, first_index: u64) -> Self {
        self.stream.first_index = first_index;
        self
    }

    pub fn with_high_water_mark(mut self, limit: usize) -> Self {
        self.stream.high_water_mark = Some(limit);
        self
    }

    pub fn with_finalize_timeout(mut self, timeout: Duration) -> Self {
        self.stream.finalize_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_cancel_transcript(mut self, policy: CancelTranscriptPolicy) -> Self {
        self.stream.cancel_transcript = policy;
        self
    }

    pub fn with_revert_grace(mut self, grace: Duration) -> Self {
        self.presentation.revert_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Run the clock sink faster than real time
    pub fn with_playback_speed(mut self, speed: f32) -> Self {
        self.playback.speed = speed;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.first_index == u64::MAX {
            return Err(CompanionError::ConfigError(
                "stream.first_index leaves no room for a chunk".to_string(),
            ));
        }

        if self.stream.high_water_mark == Some(0) {
            return Err(CompanionError::ConfigError(
                "stream.high_water_mark must be at least 1".to_string(),
            ));
        }

        if self.presentation.amplitude_interval_ms == 0 {
            return Err(CompanionError::ConfigError(
                "presentation.amplitude_interval_ms must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("attack", self.presentation.attack),
            ("release", self.presentation.release),
        ] {
            if !(0.0..=1.0).contains(&value) || value == 0.0 {
                return Err(CompanionError::ConfigError(format!(
                    "presentation.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.presentation.amplitude_backlog == 0 {
            return Err(CompanionError::ConfigError(
                "presentation.amplitude_backlog must be greater than 0".to_string(),
            ));
        }

        if self.presentation.amplitude_gain < 0.0 {
            return Err(CompanionError::ConfigError(
                "presentation.amplitude_gain must not be negative".to_string(),
            ));
        }

        if self.playback.speed <= 0.0 || self.playback.block_ms == 0 {
            return Err(CompanionError::ConfigError(
                "playback.speed and playback.block_ms must be greater than 0".to_string(),
            ));
        }

        if self.backend.chunk_size == 0 || self.backend.sample_rate == 0 {
            return Err(CompanionError::ConfigError(
                "backend.chunk_size and backend.sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(CompanionError::ConfigError(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
