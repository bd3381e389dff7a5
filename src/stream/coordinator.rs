//! One user turn in, one assistant turn out
//!
//! The coordinator is owned by a single driver thread. It validates every
//! transport event against the open session, feeds the buffer, steps the
//! sequencer and decides when a session is over.

use super::buffer::ChunkBuffer;
use super::presentation::{PresentationEvent, PresentationSync, SessionOutcome};
use super::sequencer::{AudioSequencer, PlaybackUnit, SequencerEvent};
use super::session::{Session, SessionState};
use crate::audio::{AudioSink, PlaybackMonitor, PlaybackReport};
use crate::integration::config::{CancelTranscriptPolicy, CompanionConfig, StreamConfig};
use crate::messages::{Role, SessionToken, TurnSink};
use crate::transport::TransportEvent;
use crate::utils::perf::TimingTracker;
use chrono::Utc;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const LATENCY_WINDOW: usize = 20;

pub struct SessionCoordinator {
    config: StreamConfig,
    buffer: Arc<ChunkBuffer>,
    sequencer: AudioSequencer,
    presentation: PresentationSync,
    turns: Arc<dyn TurnSink>,
    session: Option<Session>,
    first_audio_latency: TimingTracker,
}

impl SessionCoordinator {
    pub fn new(
        config: &CompanionConfig,
        sink: Arc<dyn AudioSink>,
        turns: Arc<dyn TurnSink>,
        report_tx: Sender<PlaybackReport>,
        presentation_tx: Sender<PresentationEvent>,
    ) -> Self {
        let buffer = Arc::new(ChunkBuffer::with_high_water_mark(config.stream.high_water_mark));
        let monitor = PlaybackMonitor::new();
        let sequencer = AudioSequencer::new(Arc::clone(&buffer), sink, monitor.clone(), report_tx);
        let presentation = PresentationSync::new(presentation_tx, monitor, &config.presentation);

        Self {
            config: config.stream.clone(),
            buffer,
            sequencer,
            presentation,
            turns,
            session: None,
            first_audio_latency: TimingTracker::new(LATENCY_WINDOW),
        }
    }

    /// Open a session for a new user message, cutting off any open one
    pub fn begin_turn(&mut self, user_text: &str) -> SessionToken {
        if self.interrupt().is_some() {
            info!("New user turn supersedes the streaming reply");
        }

        let token = SessionToken::new();
        self.turns.append_turn(Role::User, user_text, Utc::now());

        self.buffer.reset(&token, self.config.first_index);
        self.sequencer.reset(&token, self.config.first_index);
        self.presentation.session_started();
        self.session = Some(Session::new(token.clone()));

        info!("Session {} started", token);
        token
    }

    /// Apply one event from the backend
    pub fn handle_transport(&mut self, event: TransportEvent) {
        let Some(token) = self.open_token() else {
            debug!("No open session, discarding {} for {}", kind(&event), event.token());
            return;
        };
        if event.token() != &token {
            debug!("Discarding {} for stale session {}", kind(&event), event.token());
            return;
        }

        match event {
            TransportEvent::ChunkReceived { chunk, .. } => {
                if chunk.index < self.sequencer.next_index() {
                    debug!("Chunk {} already played, discarding late copy", chunk.index);
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    session.mark_first_chunk();
                }

                debug!(
                    "Chunk {} received ({} chars, audio: {})",
                    chunk.index,
                    chunk.text.chars().count(),
                    chunk.has_audio()
                );
                if self.buffer.put(&token, chunk).is_accepted() {
                    let events = self.sequencer.advance(&token);
                    self.apply(&events);
                }
            }
            TransportEvent::StreamCompleted {
                full_text,
                total_chunks,
                ..
            } => {
                let timeout = self.config.finalize_timeout();
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if !session.begin_finalizing(full_text, total_chunks, timeout) {
                    debug!("Duplicate completion for session {}", token);
                    return;
                }
                info!(
                    "Session {} finalizing ({} chunks announced, {} buffered)",
                    token,
                    total_chunks.map_or_else(|| "no".to_string(), |n| n.to_string()),
                    self.buffer.pending_count()
                );
            }
            TransportEvent::StreamError { description, .. } => {
                self.fail(description);
                return;
            }
        }

        self.check_drained(Instant::now());
    }

    /// Apply a sink's completion report
    pub fn on_playback_report(&mut self, report: PlaybackReport) {
        let Some(token) = self.open_token() else {
            return;
        };
        if report.token != token {
            debug!("Playback report for stale session {}", report.token);
            return;
        }

        let events = self.sequencer.complete(&report);
        self.apply(&events);
        self.check_drained(Instant::now());
    }

    /// Cancel the open session, if any. Returns its token.
    pub fn interrupt(&mut self) -> Option<SessionToken> {
        let token = self.open_token()?;
        self.sequencer.halt();
        let dropped = self.buffer.invalidate();

        let session = self.session.as_mut()?;
        let partial = session.transcript().to_string();
        let metrics = session.close();
        info!(
            "Session {} cancelled ({} chunks unplayed): {}",
            token,
            dropped,
            metrics.summary()
        );

        match self.config.cancel_transcript {
            CancelTranscriptPolicy::Retain if !partial.is_empty() => {
                self.turns.append_turn(Role::Assistant, &partial, Utc::now());
            }
            _ => {}
        }

        self.presentation.session_closed(
            SessionOutcome::Cancelled {
                partial_transcript: partial,
            },
            Instant::now(),
        );
        Some(token)
    }

    /// Periodic step: amplitude sampling, presentation revert and the
    /// finalize deadline
    pub fn tick(&mut self, now: Instant) {
        self.presentation.tick(now);
        self.check_drained(now);
    }

    pub fn sample_amplitude(&mut self) -> f32 {
        self.presentation.sample_amplitude()
    }

    /// State of the latest session; `None` before the first turn
    pub fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| s.state)
    }

    pub fn is_idle(&self) -> bool {
        self.open_token().is_none()
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.open_token()
    }

    /// Text of the latest session in index order
    pub fn transcript(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.transcript())
    }

    pub fn current_unit(&self) -> Option<PlaybackUnit> {
        self.sequencer.current_unit()
    }

    pub fn pending_count(&self) -> usize {
        self.buffer.pending_count()
    }

    /// Average dispatch-to-first-audio over recent turns
    pub fn average_first_audio(&self) -> Duration {
        self.first_audio_latency.average()
    }

    fn open_token(&self) -> Option<SessionToken> {
        self.session
            .as_ref()
            .filter(|s| s.is_open())
            .map(|s| s.token.clone())
    }

    fn apply(&mut self, events: &[SequencerEvent]) {
        if events.is_empty() {
            return;
        }

        if let Some(session) = self.session.as_mut() {
            for event in events {
                match event {
                    SequencerEvent::Consumed { text, .. } => session.append_text(text),
                    SequencerEvent::Started { .. } => session.mark_audio_started(),
                    SequencerEvent::Finished { .. } => session.record_played(),
                    SequencerEvent::Failed { .. } => session.record_failed(),
                    SequencerEvent::Skipped { from, to } => session.record_skipped(to - from),
                }
            }
        }
        self.presentation.observe(events);
    }

    /// Close a finalizing session once nothing more can play.
    ///
    /// With an announced total the session waits for the missing indices
    /// until the finalize deadline; without one the completion signal is the
    /// end marker and gaps are skipped right away.
    fn check_drained(&mut self, now: Instant) {
        loop {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            if session.state != SessionState::Finalizing {
                return;
            }
            let token = session.token.clone();
            if !self.sequencer.is_idle(&token) {
                return;
            }
            if !session.all_announced_consumed() && !session.deadline_passed(now) {
                return;
            }

            if self.buffer.pending_count() == 0 {
                self.complete(now);
                return;
            }

            let events = self.sequencer.skip_gap(&token);
            if events.is_empty() {
                warn!("Session {} cannot drain its buffer, closing", token);
                self.complete(now);
                return;
            }
            self.apply(&events);
        }
    }

    fn complete(&mut self, now: Instant) {
        self.sequencer.halt();
        self.buffer.invalidate();

        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(total) = session.expected_total() {
            let missing = total.saturating_sub(session.consumed());
            if missing > 0 {
                warn!("Session {} closed with {} announced chunks missing", session.token, missing);
            }
        }

        let transcript = session.final_transcript();
        let metrics = session.close();
        if let Some(first_audio) = metrics.first_audio_ms {
            self.first_audio_latency.record(Duration::from_millis(first_audio));
        }
        info!("Session {} completed: {}", session.token, metrics.summary());

        if transcript.is_empty() {
            debug!("Empty reply, nothing to persist");
        } else {
            self.turns.append_turn(Role::Assistant, &transcript, Utc::now());
        }

        self.presentation
            .session_closed(SessionOutcome::Completed { transcript }, now);
    }

    fn fail(&mut self, description: String) {
        self.sequencer.halt();
        let dropped = self.buffer.invalidate();

        if let Some(session) = self.session.as_mut() {
            let metrics = session.close();
            error!(
                "Session {} failed, {} chunks discarded: {} ({})",
                session.token,
                dropped,
                description,
                metrics.summary()
            );
        }

        self.presentation.session_closed(
            SessionOutcome::Failed { error: description },
            Instant::now(),
        );
    }
}

fn kind(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::ChunkReceived { .. } => "chunk",
        TransportEvent::StreamCompleted { .. } => "completion",
        TransportEvent::StreamError { .. } => "error",
    }
}
