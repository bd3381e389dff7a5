//! End-to-end runs of the driver thread against the scripted backend

use base64::Engine;
use companion::backend::{ScriptFaults, ScriptedBackend};
use companion::integration::{BackendConfig, CompanionConfig, CompanionHandle, OrchestratorBuilder};
use companion::messages::{Role, SessionToken};
use companion::stream::{PresentationEvent, SessionOutcome};
use companion::transport::TransportLink;
use companion::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn fast_config(seed: u64) -> CompanionConfig {
    let mut config = CompanionConfig::default()
        .with_playback_speed(40.0)
        .with_finalize_timeout(Duration::from_millis(300))
        .with_backend(BackendConfig {
            chunk_size: 12,
            max_jitter_ms: 0,
            seconds_per_char: 0.02,
            seed: Some(seed),
            ..BackendConfig::default()
        });
    config.channel_capacity = 512;
    config
}

fn wait_closed(handle: &CompanionHandle) -> (SessionOutcome, Vec<PresentationEvent>) {
    let events = handle.presentation_receiver();
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(Duration::from_secs(10))
            .expect("session never closed");
        if let PresentationEvent::SessionClosed(outcome) = event {
            return (outcome, seen);
        }
        seen.push(event);
    }
}

#[test]
fn test_scripted_reply_plays_to_completion() {
    let reply = "Hello there. This is fine! See you soon.";
    let config = fast_config(7);
    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config.clone())
        .build()
        .unwrap();
    let backend =
        Arc::new(ScriptedBackend::new(&config, handle.inbound_sender()).with_reply(reply));
    let driver = orchestrator.start(backend).unwrap();

    handle.begin_turn("hi").unwrap();
    let (outcome, events) = wait_closed(&handle);

    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            transcript: reply.to_string()
        }
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, PresentationEvent::CaptionUpdated(c) if c.starts_with("Hello"))));

    handle.shutdown().unwrap();
    driver.join().unwrap();

    let history = handle.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text, reply);
}

#[test]
fn test_withheld_chunk_without_total_still_closes() {
    let config = fast_config(11);
    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config.clone())
        .build()
        .unwrap();
    let backend = Arc::new(
        ScriptedBackend::new(&config, handle.inbound_sender())
            .with_reply("One two. Three four. Five six. Seven eight.")
            .with_faults(ScriptFaults {
                withhold: HashSet::from([1]),
                corrupt_audio: HashSet::from([2]),
                hide_total: true,
                ..ScriptFaults::default()
            }),
    );
    let driver = orchestrator.start(backend).unwrap();

    handle.begin_turn("count").unwrap();
    let (outcome, _) = wait_closed(&handle);
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    handle.shutdown().unwrap();
    driver.join().unwrap();
}

#[test]
fn test_backend_error_fails_the_turn() {
    let config = fast_config(3);
    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config.clone())
        .build()
        .unwrap();
    let backend = Arc::new(
        ScriptedBackend::new(&config, handle.inbound_sender())
            .with_reply("First bit. Second bit. Third bit.")
            .with_faults(ScriptFaults {
                fail_after: Some(1),
                ..ScriptFaults::default()
            }),
    );
    let driver = orchestrator.start(backend).unwrap();

    handle.begin_turn("break").unwrap();
    let (outcome, _) = wait_closed(&handle);
    assert!(matches!(outcome, SessionOutcome::Failed { .. }));

    handle.shutdown().unwrap();
    driver.join().unwrap();
    assert!(handle
        .history()
        .iter()
        .all(|turn| turn.role == Role::User));
}

/// Hands each dispatched token to the test, which then plays the server
struct ManualLink {
    tokens: Sender<SessionToken>,
}

impl TransportLink for ManualLink {
    fn dispatch_turn(&self, token: &SessionToken, _text: &str) -> Result<()> {
        let _ = self.tokens.send(token.clone());
        Ok(())
    }
}

fn manual_setup() -> (CompanionHandle, Receiver<SessionToken>, std::thread::JoinHandle<()>) {
    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(fast_config(0))
        .build()
        .unwrap();
    let (tokens_tx, tokens) = unbounded();
    let driver = orchestrator
        .start(Arc::new(ManualLink { tokens: tokens_tx }))
        .unwrap();
    (handle, tokens, driver)
}

fn chunk_frame(token: &SessionToken, index: u64, text: &str, audio: Option<&[u8]>) -> String {
    let audio = audio.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
    serde_json::json!([
        "message_chunk",
        {
            "session_id": token.to_string(),
            "chunk_index": index,
            "text": text,
            "emotion": "neutral",
            "audio_data": audio,
        }
    ])
    .to_string()
}

#[test]
fn test_raw_frames_out_of_order() {
    let (handle, tokens, driver) = manual_setup();
    handle.begin_turn("frames").unwrap();
    let token = tokens.recv_timeout(Duration::from_secs(2)).unwrap();

    // Chunks are numbered from 1 and the completion may overtake them
    let wav = companion::audio::encode_wav(&[0.2; 1600], 16000, 1).unwrap();
    let inbound = handle.inbound_sender();
    inbound
        .frame(
            serde_json::json!([
                "streaming_complete",
                {
                    "session_id": token.to_string(),
                    "total_chunks": 3,
                    "full_text": "one two three",
                }
            ])
            .to_string(),
        )
        .unwrap();
    inbound.frame(chunk_frame(&token, 3, "three", Some(&wav))).unwrap();
    inbound.frame("garbage that is not json").unwrap();
    inbound.frame(chunk_frame(&token, 1, "one ", Some(&wav))).unwrap();
    inbound.frame(chunk_frame(&token, 2, "two ", None)).unwrap();

    let (outcome, events) = wait_closed(&handle);
    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            transcript: "one two three".into()
        }
    );
    assert!(events.contains(&PresentationEvent::CaptionUpdated("one two three".into())));

    handle.shutdown().unwrap();
    driver.join().unwrap();
}

#[test]
fn test_interrupt_cancels_streaming_reply() {
    let (handle, tokens, driver) = manual_setup();
    handle.begin_turn("long answer please").unwrap();
    let token = tokens.recv_timeout(Duration::from_secs(2)).unwrap();

    // Long enough that it is still playing when the interrupt lands
    let wav = companion::audio::encode_wav(&vec![0.2; 16000 * 60], 16000, 1).unwrap();
    let inbound = handle.inbound_sender();
    inbound.frame(chunk_frame(&token, 1, "so ", Some(&wav))).unwrap();
    inbound.frame(chunk_frame(&token, 2, "anyway", Some(&wav))).unwrap();

    let events = handle.presentation_receiver();
    loop {
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        if event == PresentationEvent::CaptionUpdated("so ".into()) {
            break;
        }
    }
    handle.interrupt().unwrap();

    let (outcome, _) = wait_closed(&handle);
    assert_eq!(
        outcome,
        SessionOutcome::Cancelled {
            partial_transcript: "so ".into()
        }
    );

    // Chunks for the cancelled turn are ignored from here on
    inbound.frame(chunk_frame(&token, 3, "late", None)).unwrap();
    handle.shutdown().unwrap();
    driver.join().unwrap();

    let assistant: Vec<_> = handle
        .history()
        .into_iter()
        .filter(|t| t.role == Role::Assistant)
        .map(|t| t.text)
        .collect();
    assert_eq!(assistant, vec!["so ".to_string()]);
}
