//! Turn latency tracking
//!
//! Each session carries a [`Stopwatch`]; when it closes its numbers are folded
//! into a [`TurnMetrics`] record and the coordinator's [`TimingTracker`]s.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window of durations
#[derive(Debug)]
pub struct TimingTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl TimingTracker {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Elapsed time since session start, with named marks
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    splits: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            splits: Vec::new(),
        }
    }

    /// Record a split; only the first split with a given label is kept
    pub fn split(&mut self, label: impl Into<String>) {
        let label = label.into();
        if self.split_of(&label).is_none() {
            self.splits.push((label, self.start.elapsed()));
        }
    }

    pub fn split_of(&self, label: &str) -> Option<Duration> {
        self.splits
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, at)| *at)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn splits(&self) -> &[(String, Duration)] {
        &self.splits
    }
}

/// Per-turn numbers logged when a session closes
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnMetrics {
    /// Dispatch to first chunk from the backend (ms)
    pub first_chunk_ms: Option<u64>,

    /// Dispatch to first audible unit (ms)
    pub first_audio_ms: Option<u64>,

    /// Dispatch to close (ms)
    pub total_ms: u64,

    pub chunks_played: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: u64,
}

impl TurnMetrics {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(first) = self.first_chunk_ms {
            parts.push(format!("first chunk: {}ms", first));
        }
        if let Some(audio) = self.first_audio_ms {
            parts.push(format!("first audio: {}ms", audio));
        }
        parts.push(format!("total: {}ms", self.total_ms));
        parts.push(format!("played: {}", self.chunks_played));

        if self.chunks_failed > 0 {
            parts.push(format!("failed: {}", self.chunks_failed));
        }
        if self.chunks_skipped > 0 {
            parts.push(format!("missing: {}", self.chunks_skipped));
        }

        parts.join(" | ")
    }
}
