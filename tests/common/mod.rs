//! Shared fixtures for integration tests

#![allow(dead_code)]

use companion::audio::{encode_wav, AudioSink, PlaybackClip, PlaybackCompletion, PlaybackReport};
use companion::integration::CompanionConfig;
use companion::messages::{AudioPayload, Chunk, SessionToken, TurnStore};
use companion::stream::{PresentationEvent, SessionCoordinator, SessionOutcome};
use companion::transport::TransportEvent;
use companion::Result;
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;

/// Sink that holds every clip until the test releases it
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<(SessionToken, u64)>>,
    held: Mutex<Vec<PlaybackCompletion>>,
}

impl RecordingSink {
    /// Every clip handed to the sink, in start order
    pub fn played(&self) -> Vec<(SessionToken, u64)> {
        self.played.lock().clone()
    }

    pub fn played_indices(&self, token: &SessionToken) -> Vec<u64> {
        self.played
            .lock()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, i)| *i)
            .collect()
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    fn take_held(&self) -> Vec<PlaybackCompletion> {
        self.held.lock().drain(..).collect()
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, clip: PlaybackClip, completion: PlaybackCompletion) -> Result<()> {
        self.played.lock().push((clip.token.clone(), clip.index));
        self.held.lock().push(completion);
        Ok(())
    }

    fn stop(&self) {
        for completion in self.take_held() {
            completion.abandon();
        }
    }
}

/// A coordinator wired to a recording sink and in-memory turns
pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub sink: Arc<RecordingSink>,
    pub turns: TurnStore,
    pub reports: Receiver<PlaybackReport>,
    pub presentation: Receiver<PresentationEvent>,
}

impl Harness {
    pub fn new(config: CompanionConfig) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let turns = TurnStore::new();
        let (report_tx, reports) = unbounded();
        let (presentation_tx, presentation) = unbounded();
        let coordinator = SessionCoordinator::new(
            &config,
            sink.clone(),
            Arc::new(turns.clone()),
            report_tx,
            presentation_tx,
        );

        Self {
            coordinator,
            sink,
            turns,
            reports,
            presentation,
        }
    }

    pub fn deliver(&mut self, event: TransportEvent) {
        self.coordinator.handle_transport(event);
        self.pump_reports();
    }

    /// Finish the clip that is playing, if any. Returns false when idle.
    pub fn finish_one(&mut self) -> bool {
        let held = self.sink.take_held();
        if held.is_empty() {
            return false;
        }
        for completion in held {
            completion.finish();
        }
        self.pump_reports();
        true
    }

    /// Have the device fail the clip that is playing. Returns false when idle.
    pub fn fail_one(&mut self, reason: &str) -> bool {
        let held = self.sink.take_held();
        if held.is_empty() {
            return false;
        }
        for completion in held {
            completion.fail(reason);
        }
        self.pump_reports();
        true
    }

    /// Let every clip play to the end
    pub fn play_out(&mut self) {
        while self.finish_one() {}
    }

    pub fn pump_reports(&mut self) {
        while let Ok(report) = self.reports.try_recv() {
            self.coordinator.on_playback_report(report);
        }
    }

    pub fn closed_outcomes(&self) -> Vec<SessionOutcome> {
        self.presentation
            .try_iter()
            .filter_map(|event| match event {
                PresentationEvent::SessionClosed(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }
}

/// Default settings with chunks numbered from 0
pub fn zero_based() -> CompanionConfig {
    CompanionConfig::default().with_first_index(0)
}

pub fn wav_bytes(frames: usize) -> Vec<u8> {
    encode_wav(&vec![0.25; frames], 16000, 1).unwrap()
}

pub fn text_chunk(token: &SessionToken, index: u64, text: &str) -> TransportEvent {
    TransportEvent::ChunkReceived {
        token: token.clone(),
        chunk: Chunk::text(index, text),
    }
}

pub fn voiced_chunk(token: &SessionToken, index: u64, text: &str) -> TransportEvent {
    TransportEvent::ChunkReceived {
        token: token.clone(),
        chunk: Chunk::text(index, text).with_audio(AudioPayload::wav(wav_bytes(400))),
    }
}

pub fn corrupt_chunk(token: &SessionToken, index: u64, text: &str) -> TransportEvent {
    TransportEvent::ChunkReceived {
        token: token.clone(),
        chunk: Chunk::text(index, text).with_audio(AudioPayload::wav(b"not a wav file".to_vec())),
    }
}

pub fn completed(token: &SessionToken, total: Option<u64>) -> TransportEvent {
    TransportEvent::StreamCompleted {
        token: token.clone(),
        full_text: String::new(),
        total_chunks: total,
    }
}
