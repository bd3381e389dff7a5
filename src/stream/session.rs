//! Context of one streamed assistant turn

use crate::messages::SessionToken;
use crate::utils::perf::{Stopwatch, TurnMetrics};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Chunks are still streaming in
    Active,
    /// Completion received; draining what is buffered
    Finalizing,
    Closed,
}

/// Per-turn state owned by the coordinator
#[derive(Debug)]
pub struct Session {
    pub token: SessionToken,
    pub state: SessionState,
    transcript: String,
    completion_text: Option<String>,
    expected_total: Option<u64>,
    consumed: u64,
    finalize_deadline: Option<Instant>,
    stopwatch: Stopwatch,
    metrics: TurnMetrics,
}

impl Session {
    pub fn new(token: SessionToken) -> Self {
        Self {
            token,
            state: SessionState::Active,
            transcript: String::new(),
            completion_text: None,
            expected_total: None,
            consumed: 0,
            finalize_deadline: None,
            stopwatch: Stopwatch::start(),
            metrics: TurnMetrics::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed
    }

    /// Append a consumed chunk's text in index order
    pub fn append_text(&mut self, text: &str) {
        self.transcript.push_str(text);
        self.consumed += 1;
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Chunks consumed in order so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Enter `Finalizing`; returns false if the session was not `Active`
    pub fn begin_finalizing(
        &mut self,
        full_text: String,
        total: Option<u64>,
        timeout: Duration,
    ) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        self.state = SessionState::Finalizing;
        self.completion_text = Some(full_text);
        self.expected_total = total;
        self.finalize_deadline = Some(Instant::now() + timeout);
        true
    }

    /// Every announced chunk has been consumed, or no total was announced
    pub fn all_announced_consumed(&self) -> bool {
        match self.expected_total {
            Some(total) => self.consumed >= total,
            None => true,
        }
    }

    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }

    pub fn deadline_passed(&self, now: Instant) -> bool {
        matches!(self.finalize_deadline, Some(deadline) if now >= deadline)
    }

    /// Text persisted for the assistant turn: the backend's full text when it
    /// sent one, otherwise what streamed in
    pub fn final_transcript(&self) -> String {
        match &self.completion_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => self.transcript.clone(),
        }
    }

    pub fn mark_first_chunk(&mut self) {
        if self.metrics.first_chunk_ms.is_none() {
            self.stopwatch.split("first_chunk");
            self.metrics.first_chunk_ms =
                self.stopwatch.split_of("first_chunk").map(|d| d.as_millis() as u64);
        }
    }

    pub fn mark_audio_started(&mut self) {
        if self.metrics.first_audio_ms.is_none() {
            self.stopwatch.split("first_audio");
            self.metrics.first_audio_ms =
                self.stopwatch.split_of("first_audio").map(|d| d.as_millis() as u64);
        }
    }

    pub fn record_played(&mut self) {
        self.metrics.chunks_played += 1;
    }

    pub fn record_failed(&mut self) {
        self.metrics.chunks_failed += 1;
    }

    pub fn record_skipped(&mut self, count: u64) {
        self.metrics.chunks_skipped += count;
    }

    /// Close and return the turn's metrics
    pub fn close(&mut self) -> TurnMetrics {
        self.state = SessionState::Closed;
        self.metrics.total_ms = self.stopwatch.elapsed_ms();
        self.metrics.clone()
    }
}
